use std::{fmt::Debug, marker::PhantomData, sync::Arc};

use crate::{
    provider::Component,
    resolver::Dependencies,
    types::{DynError, TypeInfo},
};

/// Creates new instances of a component on every call
///
/// The dependencies are resolved once, when the factory is created, and are shared
/// with the rest of the container. The created instances are not managed by the
/// container and the post construction step does not run for them.
pub struct Factory<C> {
    dependencies: Dependencies,
    _component: PhantomData<fn() -> C>,
}
impl<C> Clone for Factory<C> {
    fn clone(&self) -> Self {
        Factory {
            dependencies: self.dependencies.clone(),
            _component: PhantomData,
        }
    }
}
impl<C: 'static> Debug for Factory<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("creates", &TypeInfo::of::<C>().type_name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl<C: Component> Factory<C> {
    pub(crate) fn new(dependencies: Dependencies) -> Self {
        Factory {
            dependencies,
            _component: PhantomData,
        }
    }

    /// Constructs a new instance
    pub fn create(&self) -> Result<C, DynError> {
        C::construct(self.dependencies.clone())
    }

    pub fn create_shared(&self) -> Result<Arc<C>, DynError> {
        self.create().map(Arc::new)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }
}
