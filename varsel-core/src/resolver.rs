//! Service resolution for handlers.
//!
//! A save operation can carry an optional [`Resolver`]; handlers registered
//! with a service parameter look their dependency up through it at
//! invocation time. The resolver is also where per-save instance trigger
//! sets live: the invoker asks it for a `TriggerSet` of the matching
//! entity/context pair on every raise.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves services by type at handler invocation time.
///
/// Implement this to bridge an application's dependency injection container;
/// [`ServiceMap`] is the plain built-in implementation.
pub trait Resolver: Send + Sync {
    /// Looks up the service registered for `service`, if any.
    ///
    /// The returned value must downcast to the requested concrete type.
    fn resolve(&self, service: TypeId) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// A fixed type-to-instance map.
///
/// Built up front, then passed into saves as `Arc<dyn Resolver>`:
///
/// ```rust,ignore
/// let mut services = ServiceMap::new();
/// services.insert(Arc::new(Mailer::new(smtp)));
/// let resolver: Arc<dyn Resolver> = Arc::new(services);
/// ```
#[derive(Default)]
pub struct ServiceMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service instance, replacing any previous one of the same
    /// type.
    pub fn insert<S: Send + Sync + 'static>(&mut self, service: Arc<S>) -> &mut Self {
        self.entries.insert(TypeId::of::<S>(), service);
        self
    }

    /// Looks up a service by its concrete type.
    pub fn get<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.entries
            .get(&TypeId::of::<S>())
            .cloned()
            .and_then(|any| Arc::downcast::<S>(any).ok())
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Resolver for ServiceMap {
    fn resolve(&self, service: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries.get(&service).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mailer {
        from: &'static str,
    }

    #[test]
    fn resolves_registered_service() {
        let mut map = ServiceMap::new();
        map.insert(Arc::new(Mailer { from: "ops" }));

        let mailer = map.get::<Mailer>().unwrap();
        assert_eq!(mailer.from, "ops");
        assert!(map.resolve(TypeId::of::<Mailer>()).is_some());
    }

    #[test]
    fn missing_service_is_none() {
        let map = ServiceMap::new();
        assert!(map.get::<Mailer>().is_none());
        assert!(map.is_empty());
    }
}
