use std::{
    future::Future,
    marker::PhantomData,
    sync::{Mutex, PoisonError},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    config::{self, ComponentConfig},
    factory::Factory,
    resolver::Dependencies,
    types::{ComponentId, DynError, Injectable, Instance, TypeInfo},
};

/// A component which can be constructed by the container
///
/// The dependency list is static and ordered, [Component::construct] receives
/// the resolved dependencies in exactly that order.
pub trait Component: Injectable + Sized {
    /// Returns the identifiers of all components this one requires
    fn dependencies() -> Vec<ComponentId>;

    /// Constructs a new instance from its already constructed dependencies
    fn construct(dependencies: Dependencies) -> Result<Self, DynError>;

    /// Runs after construction with the configuration of the component
    ///
    /// The component is only handed out once this completes.
    fn post_construct<'a>(
        &'a mut self,
        config: Option<&'a ComponentConfig>,
    ) -> impl Future<Output = Result<(), DynError>> + Send + 'a {
        let _ = config;
        async { Ok(()) }
    }
}

/// Construction strategy of a component, allowing for dynamic dispatch
pub trait Provider: Send + Sync {
    /// Returns the typeinfo of the provided instances
    fn supplies(&self) -> TypeInfo;

    /// Returns the ordered list of dependencies
    fn dependencies(&self) -> Vec<ComponentId>;

    /// Constructs a new instance, receiving one instance per dependency
    fn provide(&self, dependencies: Dependencies) -> BoxFuture<'static, Result<Instance, DynError>>;

    /// Merges a configuration into the current one
    fn merge_config(&self, config: ComponentConfig) {
        let _ = config;
    }

    /// Replaces the current configuration
    fn set_config(&self, config: ComponentConfig) {
        let _ = config;
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn supplies(&self) -> TypeInfo {
        (**self).supplies()
    }

    fn dependencies(&self) -> Vec<ComponentId> {
        (**self).dependencies()
    }

    fn provide(
        &self,
        dependencies: Dependencies,
    ) -> BoxFuture<'static, Result<Instance, DynError>> {
        (**self).provide(dependencies)
    }

    fn merge_config(&self, config: ComponentConfig) {
        (**self).merge_config(config)
    }

    fn set_config(&self, config: ComponentConfig) {
        (**self).set_config(config)
    }
}

/// Default provider of a [Component]
pub struct ComponentProvider<C> {
    config: Mutex<Option<ComponentConfig>>,
    _component: PhantomData<fn() -> C>,
}
impl<C: Component> Default for ComponentProvider<C> {
    fn default() -> Self {
        Self::new(None)
    }
}
impl<C: Component> ComponentProvider<C> {
    pub fn new(config: Option<ComponentConfig>) -> Self {
        ComponentProvider {
            config: Mutex::new(config),
            _component: PhantomData,
        }
    }

    /// Current configuration
    pub fn config(&self) -> Option<ComponentConfig> {
        self.current_config().clone()
    }

    fn current_config(&self) -> std::sync::MutexGuard<'_, Option<ComponentConfig>> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
impl<C: Component> Provider for ComponentProvider<C> {
    fn supplies(&self) -> TypeInfo {
        TypeInfo::of::<C>()
    }

    fn dependencies(&self) -> Vec<ComponentId> {
        C::dependencies()
    }

    fn provide(
        &self,
        dependencies: Dependencies,
    ) -> BoxFuture<'static, Result<Instance, DynError>> {
        let config = self.config();
        async move {
            let mut component = C::construct(dependencies)?;
            component.post_construct(config.as_ref()).await?;
            Ok::<_, DynError>(Instance::new(component))
        }
        .boxed()
    }

    fn merge_config(&self, config: ComponentConfig) {
        config::apply(&mut self.current_config(), config, true);
    }

    fn set_config(&self, config: ComponentConfig) {
        config::apply(&mut self.current_config(), config, false);
    }
}

/// Provides a [Factory] of a component instead of the component itself
pub struct FactoryProvider<C> {
    _component: PhantomData<fn() -> C>,
}
impl<C: Component> Default for FactoryProvider<C> {
    fn default() -> Self {
        Self::new()
    }
}
impl<C: Component> FactoryProvider<C> {
    pub fn new() -> Self {
        FactoryProvider {
            _component: PhantomData,
        }
    }
}
impl<C: Component> Provider for FactoryProvider<C> {
    fn supplies(&self) -> TypeInfo {
        TypeInfo::of::<Factory<C>>()
    }

    fn dependencies(&self) -> Vec<ComponentId> {
        C::dependencies()
    }

    fn provide(
        &self,
        dependencies: Dependencies,
    ) -> BoxFuture<'static, Result<Instance, DynError>> {
        let factory = Factory::<C>::new(dependencies);
        async move { Ok::<_, DynError>(Instance::new(factory)) }.boxed()
    }
}

/// Provider backed by an async closure
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use weave_di::{provider::FnProvider, DynError};
///
/// let greeter = FnProvider::new(["name"], |mut deps| async move {
///     let name: Arc<String> = deps.next()?;
///     Ok::<_, DynError>(format!("Hello {name}"))
/// });
/// ```
pub struct FnProvider<F, T> {
    dependencies: Vec<ComponentId>,
    construct: F,
    _product: PhantomData<fn() -> T>,
}
impl<F, Fut, T> FnProvider<F, T>
where
    F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    T: Injectable,
{
    pub fn new<Id: Into<ComponentId>>(
        dependencies: impl IntoIterator<Item = Id>,
        construct: F,
    ) -> Self {
        FnProvider {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            construct,
            _product: PhantomData,
        }
    }
}
impl<F, Fut, T> Provider for FnProvider<F, T>
where
    F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    T: Injectable,
{
    fn supplies(&self) -> TypeInfo {
        TypeInfo::of::<T>()
    }

    fn dependencies(&self) -> Vec<ComponentId> {
        self.dependencies.clone()
    }

    fn provide(
        &self,
        dependencies: Dependencies,
    ) -> BoxFuture<'static, Result<Instance, DynError>> {
        (self.construct)(dependencies).map(|result| result.map(Instance::new)).boxed()
    }
}
