use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures::executor::block_on;
use serde::Deserialize;
use weave_di::{
    Component, ComponentConfig, ComponentId, Container, Dependencies, DynError, FnProvider,
    GraphError, Instance, ResolveError, WeakContainer, CONTAINER_ID,
};

/// Construction order shared by all registered components
#[derive(Default)]
struct Log(Mutex<Vec<&'static str>>);
impl Log {
    fn push(&self, id: &'static str) {
        self.0.lock().unwrap().push(id);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// Registers a component which records its construction and keeps its dependencies
fn register(
    container: &Container,
    log: &Arc<Log>,
    id: &'static str,
    dependencies: &[&'static str],
) {
    let log = log.clone();
    container
        .register(
            id,
            FnProvider::new(dependencies.to_vec(), move |deps: Dependencies| {
                let log = log.clone();
                async move {
                    log.push(id);
                    Ok::<_, DynError>(Named {
                        id,
                        dependencies: deps.instances().cloned().collect(),
                    })
                }
            }),
        )
        .unwrap();
}

struct Named {
    id: &'static str,
    dependencies: Vec<Instance>,
}
impl Named {
    fn dependency(&self, index: usize) -> Arc<Named> {
        self.dependencies[index].downcast::<Named>().unwrap()
    }
}

#[test]
fn builds_the_whole_graph_leaves_first() {
    let container = Container::new();
    let log = Arc::new(Log::default());
    register(&container, &log, "a", &["a1", "b1", "c1"]);
    register(&container, &log, "a1", &["a2", "b2", "c2"]);
    register(&container, &log, "b1", &[]);
    register(&container, &log, "c1", &["d2", "e2", "f2"]);
    for leaf in ["a2", "b2", "c2", "d2", "e2", "f2"] {
        register(&container, &log, leaf, &[]);
    }

    let a = block_on(container.get::<Named>("a")).unwrap();

    assert_eq!(
        log.entries(),
        ["a2", "b2", "c2", "a1", "b1", "d2", "e2", "f2", "c1", "a"]
    );
    assert_eq!(a.id, "a");
    assert_eq!(a.dependency(0).id, "a1");
    assert_eq!(a.dependency(1).id, "b1");
    assert_eq!(a.dependency(2).id, "c1");
    assert_eq!(
        a.dependency(2)
            .dependencies
            .iter()
            .map(|dep| dep.downcast::<Named>().unwrap().id)
            .collect::<Vec<_>>(),
        ["d2", "e2", "f2"]
    );

    for id in ["a", "a1", "b1", "c1", "a2", "b2", "c2", "d2", "e2", "f2"] {
        assert!(container.is_initialized(id), "{id} should be initialized");
    }
}

#[test]
fn reports_cycles_with_their_chain() {
    let container = Container::new();
    let log = Arc::new(Log::default());
    register(&container, &log, "a", &["b"]);
    register(&container, &log, "b", &["a"]);

    let err = block_on(container.resolve("a")).unwrap_err();
    let ResolveError::Graph(GraphError::CyclicDependency { required, chain }) = &err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(*required, "a");
    assert_eq!(*chain, [ComponentId::from("a"), ComponentId::from("b")]);
    assert_eq!(err.to_string(), "Cyclic dependency found: a -> b -> a");
    assert!(log.entries().is_empty());
}

#[test]
fn reports_cycles_deep_in_the_graph() {
    let container = Container::new();
    let log = Arc::new(Log::default());
    register(&container, &log, "a", &["a1"]);
    register(&container, &log, "a1", &["b1", "c1"]);
    register(&container, &log, "b1", &[]);
    register(&container, &log, "c1", &["c2"]);
    register(&container, &log, "c2", &["a1"]);

    let err = block_on(container.resolve("a")).unwrap_err();
    assert_eq!(err.to_string(), "Cyclic dependency found: a1 -> c1 -> c2 -> a1");
    assert!(!container.is_initialized("b1"));
}

#[test]
fn reports_unsatisfied_dependencies() {
    let container = Container::new();
    let log = Arc::new(Log::default());
    register(&container, &log, "service", &["repository"]);
    register(&container, &log, "repository", &["pool"]);

    let err = block_on(container.resolve("service")).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unsatisfied dependency 'pool' for component 'repository'"
    );

    // Registering the missing piece before anything was resolved fixes the graph
    let container = Container::new();
    register(&container, &log, "service", &["repository"]);
    register(&container, &log, "repository", &["pool"]);
    register(&container, &log, "pool", &[]);
    assert!(block_on(container.resolve("service")).is_ok());
}

struct Connection {
    pool: Arc<String>,
}
impl Component for Connection {
    fn dependencies() -> Vec<ComponentId> {
        vec!["pool".into()]
    }

    fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
        Ok(Connection {
            pool: dependencies.next()?,
        })
    }
}

#[test]
fn factories_create_distinct_instances_sharing_dependencies() {
    let container = Container::new();
    container.provide("pool", String::from("pool")).unwrap();

    let factory = block_on(container.create_factory::<Connection>()).unwrap();
    let first = factory.create().unwrap();
    let second = factory.create_shared().unwrap();

    assert!(!std::ptr::eq(&first, second.as_ref()));
    assert!(Arc::ptr_eq(&first.pool, &second.pool));

    let pool = block_on(container.get::<String>("pool")).unwrap();
    assert!(Arc::ptr_eq(&first.pool, &pool));
}

#[test]
fn external_components_are_not_cached() {
    let container = Container::new();
    container.provide("pool", String::from("pool")).unwrap();

    let first = block_on(container.construct_external::<Connection>(None)).unwrap();
    let second = block_on(container.construct_external::<Connection>(None)).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.pool, &second.pool));
}

#[derive(Deserialize, Debug, PartialEq)]
struct ServerSettings {
    host: String,
    port: u16,
}

struct Server {
    settings: Option<ServerSettings>,
    container: WeakContainer,
}
impl Component for Server {
    fn dependencies() -> Vec<ComponentId> {
        vec![ComponentId::container()]
    }

    fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
        Ok(Server {
            settings: None,
            container: dependencies.next()?,
        })
    }

    fn post_construct<'a>(
        &'a mut self,
        config: Option<&'a ComponentConfig>,
    ) -> impl Future<Output = Result<(), DynError>> + Send + 'a {
        async move {
            if let Some(config) = config {
                self.settings = Some(config.deserialize()?);
            }
            Ok::<_, DynError>(())
        }
    }
}

#[test]
fn configured_component_receives_merged_config() {
    let container = Container::new();
    container
        .register_component::<Server>(
            "server",
            Some(ComponentConfig::new().with("host", "localhost").with("port", 80)),
        )
        .unwrap();
    container
        .configure("server", ComponentConfig::new().with("port", 8080), true)
        .unwrap();

    let server = block_on(container.get::<Server>("server")).unwrap();
    assert_eq!(
        server.settings,
        Some(ServerSettings {
            host: String::from("localhost"),
            port: 8080,
        })
    );
    let container = server.container.upgrade().unwrap();
    assert!(container.is_initialized("server"));
}

#[test]
fn invalid_config_fails_the_provider() {
    let container = Container::new();
    container
        .register_component::<Server>(
            "server",
            Some(ComponentConfig::new().with("port", "eighty")),
        )
        .unwrap();

    let err = block_on(container.resolve("server")).unwrap_err();
    assert!(matches!(
        err,
        ResolveError::ProviderFailed { ref component, .. } if *component == "server"
    ));
    assert!(!container.is_initialized("server"));
}

#[test]
fn container_resolves_itself() {
    let container = Container::new();
    container.provide("answer", 42_u32).unwrap();

    let handle = block_on(container.get::<Container>(CONTAINER_ID)).unwrap();
    assert_eq!(*block_on(handle.get::<u32>("answer")).unwrap(), 42);
}

#[test]
fn concurrent_resolutions_share_one_instance() {
    let container = Container::new();
    let log = Arc::new(Log::default());
    register(&container, &log, "shared", &[]);
    register(&container, &log, "left", &["shared"]);
    register(&container, &log, "right", &["shared"]);

    let (left, right) = block_on(futures::future::join(
        container.get::<Named>("left"),
        container.get::<Named>("right"),
    ));

    let (left, right) = (left.unwrap(), right.unwrap());
    assert!(left.dependencies[0].ptr_eq(&right.dependencies[0]));
    assert_eq!(
        log.entries().iter().filter(|id| **id == "shared").count(),
        1
    );
}

/// Suspends once before completing
#[derive(Default)]
struct YieldOnce(bool);
impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0 {
            return Poll::Ready(());
        }
        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

struct Migrations {
    applied: bool,
}
impl Component for Migrations {
    fn dependencies() -> Vec<ComponentId> {
        Vec::new()
    }

    fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(Migrations { applied: false })
    }

    fn post_construct<'a>(
        &'a mut self,
        _: Option<&'a ComponentConfig>,
    ) -> impl Future<Output = Result<(), DynError>> + Send + 'a {
        async move {
            YieldOnce::default().await;
            self.applied = true;
            Ok::<_, DynError>(())
        }
    }
}

struct Repository {
    migrations: Arc<Migrations>,
}
impl Component for Repository {
    fn dependencies() -> Vec<ComponentId> {
        vec!["migrations".into()]
    }

    fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
        let migrations: Arc<Migrations> = dependencies.next()?;
        if !migrations.applied {
            return Err("migrations not applied".into());
        }
        Ok(Repository { migrations })
    }
}

#[test]
fn dependencies_finish_post_construction_before_dependents_are_built() {
    let container = Container::new();
    container
        .register_component::<Migrations>("migrations", None)
        .unwrap();
    container
        .register_component::<Repository>("repository", None)
        .unwrap();

    let repository = block_on(container.get::<Repository>("repository")).unwrap();
    assert!(repository.migrations.applied);
}
