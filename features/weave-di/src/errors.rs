use std::sync::Arc;

use thiserror::Error;

use crate::types::{ComponentId, DynError};

/// Issues found while building a dependency graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A declared dependency is neither registered nor initialized
    #[error("Unsatisfied dependency '{dependency}' for component '{required_by}'")]
    UnsatisfiedDependency {
        dependency: ComponentId,
        required_by: ComponentId,
    },
    /// Adopting a dependency would close a cycle
    ///
    /// `chain` starts at the first occurrence of `required` and ends with the closest requester.
    #[error("Cyclic dependency found: {}", display_cycle(.required, .chain))]
    CyclicDependency {
        required: ComponentId,
        chain: Vec<ComponentId>,
    },
}

fn display_cycle(required: &ComponentId, chain: &[ComponentId]) -> String {
    let mut path: Vec<&str> = chain.iter().map(ComponentId::as_str).collect();
    path.push(required.as_str());
    path.join(" -> ")
}

/// Errors when registering providers or instances
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    #[error("'{0}' is the container itself and can not be overridden")]
    ReservedIdentifier(ComponentId),
    #[error("A component identifier can not be empty")]
    EmptyIdentifier,
    /// Registration after resolution began would invalidate memoized graphs
    #[error("Can not register '{0}' - resolution has already begun")]
    RegistryFrozen(ComponentId),
}

/// Errors when configuring a component
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigureError {
    #[error("Cannot configure component '{0}' because it is not provided")]
    NotProvided(ComponentId),
}

/// Errors when resolving or constructing components
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// There are issues with the dependency graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The root component has no provider
    #[error("No provider defined for '{0}' component")]
    NotProvided(ComponentId),

    /// A Provider failed to construct its component
    #[error("Provider for '{component}' failed - error: {error}")]
    ProviderFailed {
        component: ComponentId,
        error: Arc<DynError>,
    },

    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
}

/// Errors when taking injected dependencies out of [crate::resolver::Dependencies]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectError {
    /// More dependencies were requested than were declared
    #[error("Dependency #{index} was requested but only {declared} were declared")]
    Exhausted { index: usize, declared: usize },

    #[error(
        "Failed to downcast '{component}', required: '{required_type}' actual: '{actual_type}'"
    )]
    DowncastFailed {
        component: ComponentId,
        required_type: &'static str,
        actual_type: &'static str,
    },

    #[error("The container was dropped")]
    ContainerDropped,
}

/// Errors when reading a component configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("A component configuration must be a JSON object")]
    NotAnObject,
    #[error("Config entry '{key}' is invalid: {source}")]
    Invalid {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
