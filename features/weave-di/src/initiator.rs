use std::sync::Arc;

use futures::{
    channel::oneshot,
    future::{FutureExt, Shared},
};

use crate::{
    container::{Container, Registry, State},
    dependency_graph::{DependencySource, Node, NodeIndex, PostOrder},
    errors::{GraphError, ResolveError},
    provider::Provider,
    resolver::Dependencies,
    types::{ComponentId, Instance},
};

/// Completes once a component in construction was cached or its construction failed
pub(crate) type Pending = Shared<oneshot::Receiver<()>>;

/// How the root of a resolution is constructed
pub(crate) enum Root {
    /// Registered component, cached once constructed
    Managed,
    /// Registered component, constructed again and not cached
    Fresh,
    /// Unregistered component constructed by the given provider, never cached
    Detached(Box<dyn Provider>),
}

/// Everything needed to construct a node, taken out of the state
struct Prepared {
    id: ComponentId,
    dependencies: Dependencies,
    provider: Arc<dyn Provider>,
}

/// Marks a component as being constructed until dropped
struct InFlight {
    container: Container,
    id: ComponentId,
    _done: oneshot::Sender<()>,
}
impl Drop for InFlight {
    fn drop(&mut self) {
        self.container.state().in_flight.remove(&self.id);
    }
}

enum Claim {
    Wait(Pending),
    Construct(InFlight, Prepared),
}

/// Builds the graph of `id` and constructs every missing instance in post order
pub(crate) async fn initiate(
    container: &Container,
    id: ComponentId,
    root: Root,
) -> Result<Instance, ResolveError> {
    let root_index = build_graph(container, &id, &root)?;

    let result = construct_all(container, root_index, &root).await;

    if let Root::Detached(_) = root {
        container.state().graphs.release(root_index);
    }
    if let Err(err) = &result {
        tracing::error!("Failed to resolve '{}': {}", id, err);
    }
    result
}

fn build_graph(
    container: &Container,
    id: &ComponentId,
    root: &Root,
) -> Result<NodeIndex, ResolveError> {
    let mut guard = container.state();
    let state = &mut *guard;
    state.frozen = true;

    match root {
        Root::Managed | Root::Fresh => {
            if !state.registry.is_registered(id) {
                return Err(ResolveError::NotProvided(id.clone()));
            }
            Ok(state.graphs.build(id, &state.registry)?)
        }
        Root::Detached(provider) => {
            Ok(state
                .graphs
                .build_detached(id, provider.dependencies(), &state.registry)?)
        }
    }
}

async fn construct_all(
    container: &Container,
    root_index: NodeIndex,
    root: &Root,
) -> Result<Instance, ResolveError> {
    let mut order = PostOrder::new(root_index);

    while let Some(index) = next_node(container, &mut order, root_index) {
        if index != root_index {
            construct_managed(container, index).await?;
            continue;
        }

        return match root {
            Root::Managed => construct_managed(container, index).await,
            Root::Fresh => {
                let prepared = {
                    let state = container.state();
                    prepare(container, &state, index)?
                };
                construct(prepared.id, &*prepared.provider, prepared.dependencies).await
            }
            Root::Detached(provider) => {
                let (id, dependencies) = {
                    let state = container.state();
                    let node = state.graphs.node(index);
                    (node.id().clone(), collect_dependencies(container, &state, node)?)
                };
                construct(id, &**provider, dependencies).await
            }
        };
    }

    // The root is always yielded last, it either returned or failed above
    Err(ResolveError::NotProvided(
        container.state().graphs.node(root_index).id().clone(),
    ))
}

/// Advances the traversal by one node
fn next_node(
    container: &Container,
    order: &mut PostOrder,
    root_index: NodeIndex,
) -> Option<NodeIndex> {
    let state = container.state();
    let root_node = state.graphs.node(root_index);

    // The root is always descended into, even when an instance exists already
    order.advance(&state.graphs, |node| {
        std::ptr::eq(node, root_node) || !state.registry.is_initialized(node.id())
    })
}

/// Returns the cached instance of a node, constructing and caching it if needed
///
/// A node constructed by a concurrent resolution is awaited instead of constructed twice.
async fn construct_managed(
    container: &Container,
    index: NodeIndex,
) -> Result<Instance, ResolveError> {
    loop {
        let claim = {
            let mut guard = container.state();
            let state = &mut *guard;
            let id = state.graphs.node(index).id();

            if let Some(instance) = instance_of(container, &state.registry, id) {
                return Ok(instance);
            }

            match state.in_flight.get(id) {
                Some(pending) => Claim::Wait(pending.clone()),
                None => {
                    let prepared = prepare(container, state, index)?;
                    let (done, pending) = oneshot::channel();
                    state.in_flight.insert(prepared.id.clone(), pending.shared());
                    let marker = InFlight {
                        container: container.clone(),
                        id: prepared.id.clone(),
                        _done: done,
                    };
                    Claim::Construct(marker, prepared)
                }
            }
        };

        match claim {
            Claim::Wait(pending) => {
                tracing::trace!("Waiting for concurrent construction");
                // Cancelled once the marker is dropped, either way the cache decides
                let _ = pending.await;
            }
            Claim::Construct(marker, prepared) => {
                let constructed =
                    construct(prepared.id, &*prepared.provider, prepared.dependencies).await?;

                // Instances provided meanwhile win
                let instance = container
                    .state()
                    .registry
                    .instances
                    .entry(marker.id.clone())
                    .or_insert(constructed)
                    .clone();
                return Ok(instance);
            }
        }
    }
}

async fn construct(
    id: ComponentId,
    provider: &dyn Provider,
    dependencies: Dependencies,
) -> Result<Instance, ResolveError> {
    let instance = provider
        .provide(dependencies)
        .await
        .map_err(|error| ResolveError::ProviderFailed {
            component: id.clone(),
            error: Arc::new(error),
        })?;

    tracing::debug!("Constructed instance of '{}' ({})", id, instance.info);
    Ok(instance)
}

fn prepare(
    container: &Container,
    state: &State,
    index: NodeIndex,
) -> Result<Prepared, ResolveError> {
    let node = state.graphs.node(index);
    let dependencies = collect_dependencies(container, state, node)?;
    let provider = state
        .registry
        .providers
        .get(node.id())
        .cloned()
        .ok_or_else(|| ResolveError::NotProvided(node.id().clone()))?;

    Ok(Prepared {
        id: node.id().clone(),
        dependencies,
        provider,
    })
}

/// Collects the instances of all children, in declaration order
fn collect_dependencies(
    container: &Container,
    state: &State,
    node: &Node,
) -> Result<Dependencies, ResolveError> {
    let resolved = node
        .children()
        .iter()
        .map(|&child| {
            let id = state.graphs.node(child).id();
            instance_of(container, &state.registry, id)
                .map(|instance| (id.clone(), instance))
                .ok_or_else(|| {
                    ResolveError::Graph(GraphError::UnsatisfiedDependency {
                        dependency: id.clone(),
                        required_by: node.id().clone(),
                    })
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Dependencies::new(resolved))
}

/// Components receive a weak handle of the container, so caching them creates no cycle
fn instance_of(container: &Container, registry: &Registry, id: &ComponentId) -> Option<Instance> {
    if id.is_container() {
        return Some(Instance::new(container.downgrade()));
    }
    registry.instances.get(id).cloned()
}
