use std::{
    any::type_name,
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{
    config::ComponentConfig,
    dependency_graph::{DependencySource, GraphArena},
    errors::{ConfigureError, InjectError, RegisterError, ResolveError},
    factory::Factory,
    initiator::{self, Pending, Root},
    provider::{Component, ComponentProvider, FactoryProvider, Provider},
    resolver::{downcast_failed, Resolver},
    types::{ComponentId, Injectable, Instance, TypeInfo},
};

/// Dependency injection container
///
/// Holds the registered providers and every constructed instance. Cloning is cheap,
/// all clones share the same registry and instances.
///
/// All providers should be registered before the first component is resolved,
/// registering afterwards fails with [RegisterError::RegistryFrozen].
///
/// Components depending on [crate::types::CONTAINER_ID] receive a [WeakContainer].
/// A component keeping a strong [Container] keeps its own container alive, use
/// [Container::clear] to tear such a container down.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use weave_di::{Component, ComponentId, Container, Dependencies, DynError};
///
/// struct Repository {
///     url: Arc<String>,
/// }
/// impl Component for Repository {
///     fn dependencies() -> Vec<ComponentId> {
///         vec!["url".into()]
///     }
///
///     fn construct(mut dependencies: Dependencies) -> Result<Self, DynError> {
///         Ok(Repository { url: dependencies.next()? })
///     }
/// }
///
/// let container = Container::new();
/// container.provide("url", String::from("postgres://localhost")).unwrap();
/// container.register_component::<Repository>("repository", None).unwrap();
///
/// let repository = futures::executor::block_on(container.get::<Repository>("repository"))
///     .unwrap();
/// assert_eq!(repository.url.as_str(), "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct Container(Arc<ContainerInner>);
struct ContainerInner {
    state: Mutex<State>,
}

/// Handle to a [Container] which does not keep it alive
#[derive(Clone)]
pub struct WeakContainer(Weak<ContainerInner>);
impl WeakContainer {
    /// Returns the container, unless it was dropped
    pub fn upgrade(&self) -> Option<Container> {
        self.0.upgrade().map(Container)
    }
}
impl Debug for WeakContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

pub(crate) struct State {
    pub(crate) registry: Registry,
    pub(crate) graphs: GraphArena,
    /// Components currently being constructed, each by exactly one resolution
    pub(crate) in_flight: HashMap<ComponentId, Pending>,
    /// Set once the first graph was built
    pub(crate) frozen: bool,
}

pub(crate) struct Registry {
    pub(crate) providers: HashMap<ComponentId, Arc<dyn Provider>>,
    pub(crate) instances: HashMap<ComponentId, Instance>,
}
impl DependencySource for Registry {
    fn dependencies_of(&self, id: &ComponentId) -> Option<Vec<ComponentId>> {
        self.providers.get(id).map(|provider| provider.dependencies())
    }

    fn is_initialized(&self, id: &ComponentId) -> bool {
        id.is_container() || self.instances.contains_key(id)
    }

    fn is_registered(&self, id: &ComponentId) -> bool {
        self.providers.contains_key(id)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        let mut ids: Vec<&ComponentId> = state
            .registry
            .providers
            .keys()
            .chain(state.registry.instances.keys())
            .collect();
        ids.sort();
        ids.dedup();

        let mut map = f.debug_struct("Container");
        for id in ids {
            let val = if state.registry.instances.contains_key(id) {
                "initialized"
            } else {
                "registered"
            };
            map.field(id.as_str(), &val);
        }
        map.finish()
    }
}

impl Container {
    pub fn new() -> Self {
        let mut graphs = GraphArena::new();
        graphs.insert_leaf(ComponentId::container());

        Container(Arc::new(ContainerInner {
            state: Mutex::new(State {
                registry: Registry {
                    providers: HashMap::new(),
                    instances: HashMap::new(),
                },
                graphs,
                in_flight: HashMap::new(),
                frozen: false,
            }),
        }))
    }

    /// Handle which does not keep the container alive
    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer(Arc::downgrade(&self.0))
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        // State is only mutated in single steps, a panic can not leave it half written
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the provider of a component, replacing an existing one
    pub fn register(
        &self,
        id: impl Into<ComponentId>,
        provider: impl Provider + 'static,
    ) -> Result<(), RegisterError> {
        let id = check_registrable(id.into())?;

        let mut state = self.state();
        if state.frozen {
            return Err(RegisterError::RegistryFrozen(id));
        }

        tracing::debug!("Registering '{}' supplying {}", id, provider.supplies());
        state.registry.providers.insert(id, Arc::new(provider));
        Ok(())
    }

    /// Registers a [Component] using the default [ComponentProvider]
    pub fn register_component<C: Component>(
        &self,
        id: impl Into<ComponentId>,
        config: Option<ComponentConfig>,
    ) -> Result<(), RegisterError> {
        self.register(id, ComponentProvider::<C>::new(config))
    }

    /// Sets the configuration handed to the post construction step of a component
    ///
    /// With `merge` the configuration is merged into the existing one, otherwise it replaces it.
    /// Only affects instances constructed afterwards.
    pub fn configure(
        &self,
        id: &str,
        config: ComponentConfig,
        merge: bool,
    ) -> Result<(), ConfigureError> {
        let state = self.state();
        let Some(provider) = state.registry.providers.get(id) else {
            return Err(ConfigureError::NotProvided(id.into()));
        };

        if merge {
            provider.merge_config(config);
        } else {
            provider.set_config(config);
        }
        Ok(())
    }

    /// Provides an already constructed instance of a component
    pub fn provide<T: Injectable>(
        &self,
        id: impl Into<ComponentId>,
        value: T,
    ) -> Result<(), RegisterError> {
        self.provide_instance(id, Instance::new(value))
    }

    /// Provides an already constructed instance, replacing a cached one
    ///
    /// A construction of the same component running meanwhile keeps the provided instance.
    pub fn provide_instance(
        &self,
        id: impl Into<ComponentId>,
        instance: Instance,
    ) -> Result<(), RegisterError> {
        let id = check_registrable(id.into())?;

        tracing::debug!("Providing instance of {} as '{}'", instance.info, id);
        self.state().registry.instances.insert(id, instance);
        Ok(())
    }

    /// Whether an instance of the component exists
    pub fn is_initialized(&self, id: &str) -> bool {
        id == crate::types::CONTAINER_ID || self.state().registry.instances.contains_key(id)
    }

    /// Whether a provider is registered for the component
    pub fn is_provided(&self, id: &str) -> bool {
        self.state().registry.providers.contains_key(id)
    }

    /// Drops every cached instance, including provided ones
    ///
    /// Registered components are constructed again when resolved next.
    pub fn clear(&self) {
        let instances = std::mem::take(&mut self.state().registry.instances);
        tracing::debug!("Dropping {} instances", instances.len());
        // Dropped without holding the state, instances may use the container on drop
        drop(instances);
    }

    /// Returns the instance of a component, constructing it and its dependencies if needed
    ///
    /// Concurrent resolutions share components, each one is constructed at most once.
    /// Components may resolve others while they are constructed, as long as those do not
    /// depend on the component under construction.
    pub async fn resolve(&self, id: impl Into<ComponentId>) -> Result<Instance, ResolveError> {
        let id = id.into();
        if let Some(instance) = self.cached(&id) {
            return Ok(instance);
        }

        initiator::initiate(self, id, Root::Managed).await
    }

    /// Resolves a component and downcasts it
    pub async fn get<T: Injectable>(
        &self,
        id: impl Into<ComponentId>,
    ) -> Result<Arc<T>, ResolveError> {
        let instance = self.resolve(id).await?;
        downcast(&instance)
    }

    /// Constructs a new instance of a registered component
    ///
    /// Dependencies are resolved as usual, the new instance is returned without being cached.
    pub async fn resolve_new(&self, id: impl Into<ComponentId>) -> Result<Instance, ResolveError> {
        let id = id.into();
        if id.is_container() {
            return Ok(Instance::new(self.clone()));
        }

        initiator::initiate(self, id, Root::Fresh).await
    }

    /// Constructs an unregistered component
    ///
    /// Its dependencies are resolved and cached as usual, the component itself is not.
    pub async fn construct_external<C: Component>(
        &self,
        config: Option<ComponentConfig>,
    ) -> Result<Arc<C>, ResolveError> {
        let instance = self
            .construct_external_using(ComponentProvider::<C>::new(config))
            .await?;
        downcast(&instance)
    }

    /// Constructs an unregistered component using the given provider
    pub async fn construct_external_using(
        &self,
        provider: impl Provider + 'static,
    ) -> Result<Instance, ResolveError> {
        let id = external_id(provider.supplies());
        initiator::initiate(self, id, Root::Detached(Box::new(provider))).await
    }

    /// Creates a [Factory] for a component, which is not registered
    pub async fn create_factory<C: Component>(&self) -> Result<Factory<C>, ResolveError> {
        let instance = self
            .construct_external_using(FactoryProvider::<C>::new())
            .await?;
        let factory = downcast::<Factory<C>>(&instance)?;
        Ok(Factory::clone(&factory))
    }

    fn cached(&self, id: &ComponentId) -> Option<Instance> {
        if id.is_container() {
            return Some(Instance::new(self.clone()));
        }
        self.state().registry.instances.get(id).cloned()
    }
}

fn check_registrable(id: ComponentId) -> Result<ComponentId, RegisterError> {
    if id.is_container() {
        return Err(RegisterError::ReservedIdentifier(id));
    }
    if id.as_str().is_empty() {
        return Err(RegisterError::EmptyIdentifier);
    }
    Ok(id)
}

/// Identifier of an unregistered component, only used in logs and errors
fn external_id(supplies: TypeInfo) -> ComponentId {
    ComponentId::from(format!("<{}>", supplies.type_name))
}

fn downcast<T: Injectable>(instance: &Instance) -> Result<Arc<T>, ResolveError> {
    instance
        .downcast::<T>()
        .map_err(|actual_type| ResolveError::DowncastFailed {
            required_type: type_name::<T>(),
            actual_type,
        })
}

/// Components may depend on the container itself through [crate::types::CONTAINER_ID]
impl Resolver for WeakContainer {
    fn resolve(dependency: &ComponentId, instance: &Instance) -> Result<Self, InjectError> {
        if let Ok(container) = instance.downcast::<Container>() {
            return Ok(container.downgrade());
        }
        instance
            .downcast::<WeakContainer>()
            .map(|weak| WeakContainer::clone(&weak))
            .map_err(|actual_type| downcast_failed::<WeakContainer>(dependency, actual_type))
    }
}

/// Upgrades the injected [WeakContainer]
///
/// Cached components keeping the strong handle keep the container alive until [Container::clear].
impl Resolver for Container {
    fn resolve(dependency: &ComponentId, instance: &Instance) -> Result<Self, InjectError> {
        WeakContainer::resolve(dependency, instance)?
            .upgrade()
            .ok_or(InjectError::ContainerDropped)
    }
}
