use std::{future::Future, sync::Arc};

use weave_di::{Component, ComponentConfig, ComponentId, Container, Dependencies, DynError};

fn main() {
    let container = Container::new();
    container.provide("url", String::from("postgres://localhost/app")).unwrap();
    container.register_component::<Database>("database", None).unwrap();
    container
        .register_component::<Users>(
            "users",
            Some(ComponentConfig::new().with("page_size", 50)),
        )
        .unwrap();

    let users = futures::executor::block_on(container.get::<Users>("users")).unwrap();

    println!("{:?}", container);
    println!("users on {} with {} per page", users.database.url, users.page_size)
}

struct Database {
    url: Arc<String>,
}
impl Component for Database {
    fn dependencies() -> Vec<ComponentId> {
        vec!["url".into()]
    }

    fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
        Ok(Database {
            url: dependencies.next()?,
        })
    }
}

struct Users {
    database: Arc<Database>,
    page_size: u32,
}
impl Component for Users {
    fn dependencies() -> Vec<ComponentId> {
        vec!["database".into()]
    }

    fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
        Ok(Users {
            database: dependencies.next()?,
            page_size: 20,
        })
    }

    fn post_construct<'a>(
        &'a mut self,
        config: Option<&'a ComponentConfig>,
    ) -> impl Future<Output = Result<(), DynError>> + Send + 'a {
        async move {
            let page_size = config.map(|config| config.get("page_size")).transpose()?;
            if let Some(page_size) = page_size.flatten() {
                self.page_size = page_size;
            }
            Ok::<_, DynError>(())
        }
    }
}
