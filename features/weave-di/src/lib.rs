//! Dependency injection container for async Rust
//!
//! Components are registered under a [ComponentId] together with a [Provider], which declares
//! the ordered identifiers of the components it depends on. Resolving a component builds its
//! dependency graph, rejects cycles and unsatisfied dependencies, and constructs every missing
//! instance bottom up. Each instance is constructed once and shared afterwards.
//!
//! The container itself is available to components under [CONTAINER_ID].

pub mod config;
pub mod container;
pub mod dependency_graph;
pub mod errors;
pub mod factory;
mod initiator;
pub mod provider;
pub mod resolver;
pub mod types;

pub use config::ComponentConfig;
pub use container::{Container, WeakContainer};
pub use errors::{ConfigError, ConfigureError, GraphError, InjectError, RegisterError, ResolveError};
pub use factory::Factory;
pub use provider::{Component, ComponentProvider, FactoryProvider, FnProvider, Provider};
pub use resolver::{Dependencies, Resolver};
pub use types::{ComponentId, DynError, Injectable, Instance, TypeInfo, CONTAINER_ID};
