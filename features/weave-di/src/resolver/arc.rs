use std::sync::Arc;

use crate::{
    errors::InjectError,
    resolver::{downcast_failed, Resolver},
    types::{ComponentId, Injectable, Instance},
};

impl<T: Injectable> Resolver for Arc<T> {
    fn resolve(dependency: &ComponentId, instance: &Instance) -> Result<Self, InjectError> {
        instance
            .downcast::<T>()
            .map_err(|actual_type| downcast_failed::<T>(dependency, actual_type))
    }
}
