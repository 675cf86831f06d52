use std::{any::type_name, sync::Arc};

use crate::{
    errors::InjectError,
    types::{ComponentId, Injectable, Instance},
};

pub mod arc;

/// Allows custom behaviour when taking a dependency out of [Dependencies]
pub trait Resolver: Sized {
    fn resolve(dependency: &ComponentId, instance: &Instance) -> Result<Self, InjectError>;
}

impl Resolver for Instance {
    fn resolve(_: &ComponentId, instance: &Instance) -> Result<Self, InjectError> {
        Ok(instance.clone())
    }
}

/// The already constructed dependencies of a component
///
/// Holds one instance per declared dependency, in declaration order.
/// [Dependencies::next] walks them front to back, so a constructor can take
/// its arguments in the order it declared them.
#[derive(Clone, Default)]
pub struct Dependencies {
    resolved: Vec<(ComponentId, Instance)>,
    cursor: usize,
}

impl Dependencies {
    pub fn new(resolved: Vec<(ComponentId, Instance)>) -> Self {
        Dependencies {
            resolved,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.resolved.iter().map(|(id, _)| id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.resolved.iter().map(|(_, instance)| instance)
    }

    /// Takes the next dependency in declaration order
    pub fn next<R: Resolver>(&mut self) -> Result<R, InjectError> {
        let index = self.cursor;
        let resolved = self.resolve_at(index)?;
        self.cursor += 1;
        Ok(resolved)
    }

    /// Dependency at `index` without moving the cursor
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>, InjectError> {
        self.resolve_at(index)
    }

    /// Rewinds [Dependencies::next] to the first dependency
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn resolve_at<R: Resolver>(&self, index: usize) -> Result<R, InjectError> {
        let (id, instance) = self.resolved.get(index).ok_or(InjectError::Exhausted {
            index,
            declared: self.resolved.len(),
        })?;
        R::resolve(id, instance)
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (id, instance) in &self.resolved {
            map.entry(id, &instance.info.type_name);
        }
        map.finish()
    }
}

pub(crate) fn downcast_failed<T>(
    dependency: &ComponentId,
    actual_type: &'static str,
) -> InjectError {
    InjectError::DowncastFailed {
        component: dependency.clone(),
        required_type: type_name::<T>(),
        actual_type,
    }
}
