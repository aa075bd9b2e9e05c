//! Handler registries.
//!
//! A [`Registry`] owns the canonical trigger sets: one [`TriggerSet`] per
//! entity/context pair, one per entity for the global scope, and one
//! [`AspectSet`] per aspect type. All lookups are get-or-create, so the set
//! handed out for a pair is always the same instance and handlers registered
//! through it are visible to every invoker already built.
//!
//! The registry also caches one invoker per entity/context pair. Requesting
//! a typed set installs a deferred constructor for the pair; the invoker
//! itself is built on first use during a save and reused afterwards. Both
//! maps are guarded by short-lived locks, never held while handlers run.

use crate::invoker::{ContextInvoker, TriggerInvoker};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use varsel_core::{AspectLookup, AspectSet, Context, Entity, Session, TriggerSet};

type AnyArc = Arc<dyn Any + Send + Sync>;

enum InvokerSlot {
    Pending(Box<dyn Fn(&Registry) -> AnyArc + Send + Sync>),
    Ready(AnyArc),
}

/// The canonical home of trigger handlers and invokers.
///
/// Most applications use the process-wide [`Registry::global`]; tests and
/// embedded setups create their own with [`Registry::new`]. Registration and
/// saves may run concurrently from any thread.
pub struct Registry {
    typed: RwLock<HashMap<(TypeId, TypeId), AnyArc>>,
    globals: RwLock<HashMap<TypeId, AnyArc>>,
    aspects: RwLock<HashMap<TypeId, AnyArc>>,
    invokers: RwLock<HashMap<(TypeId, TypeId), InvokerSlot>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            typed: RwLock::new(HashMap::new()),
            globals: RwLock::new(HashMap::new()),
            aspects: RwLock::new(HashMap::new()),
            invokers: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide default registry.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// The trigger set for entities of type `T` saved through contexts of
    /// type `C`.
    ///
    /// Also registers the `T`/`C` pair for dispatch, like
    /// [`Registry::register`] does.
    pub fn triggers<T: Entity, C: Session>(&self) -> Arc<TriggerSet<T, C>> {
        self.ensure_invoker::<T, C>();
        self.typed_set::<T, C>()
    }

    /// The context-independent trigger set for entities of type `T`.
    ///
    /// Global handlers receive their context as `Arc<dyn Context>`. They
    /// fire for every registered pair involving `T`; registering only global
    /// handlers does not by itself make `T` dispatchable in any context.
    pub fn global_triggers<T: Entity>(&self) -> Arc<TriggerSet<T, dyn Context>> {
        let key = TypeId::of::<T>();
        if let Some(set) = self.globals.read().get(&key) {
            return downcast_set::<T, dyn Context>(set.clone());
        }
        let mut map = self.globals.write();
        let set = map
            .entry(key)
            .or_insert_with(|| {
                debug!(entity = std::any::type_name::<T>(), "created global trigger set");
                Arc::new(TriggerSet::<T, dyn Context>::new())
            })
            .clone();
        downcast_set::<T, dyn Context>(set)
    }

    /// The handler set for the aspect `A`.
    ///
    /// Entities whose lineage declares `A` raise into this set, whatever
    /// their concrete type.
    pub fn aspect<A: ?Sized + 'static>(&self) -> Arc<AspectSet<A>> {
        let set = self.aspect_set(TypeId::of::<A>(), &|| Arc::new(AspectSet::<A>::new()));
        set.downcast::<AspectSet<A>>()
            .ok()
            .expect("type mismatch in aspect set registry")
    }

    /// Registers the `T`/`C` pair for dispatch without touching handlers.
    ///
    /// Saves route each pending entity to the invoker registered for its
    /// type; an unregistered entity type fails the save. Calling this twice
    /// for the same pair is a no-op.
    pub fn register<T: Entity, C: Session>(&self) {
        self.ensure_invoker::<T, C>();
    }

    pub(crate) fn typed_set<T: Entity, C: Session>(&self) -> Arc<TriggerSet<T, C>> {
        let key = (TypeId::of::<T>(), TypeId::of::<C>());
        if let Some(set) = self.typed.read().get(&key) {
            return downcast_set::<T, C>(set.clone());
        }
        let mut map = self.typed.write();
        let set = map
            .entry(key)
            .or_insert_with(|| {
                debug!(
                    entity = std::any::type_name::<T>(),
                    context = std::any::type_name::<C>(),
                    "created trigger set"
                );
                Arc::new(TriggerSet::<T, C>::new())
            })
            .clone();
        downcast_set::<T, C>(set)
    }

    fn ensure_invoker<T: Entity, C: Session>(&self) {
        let key = (TypeId::of::<C>(), TypeId::of::<T>());
        if self.invokers.read().contains_key(&key) {
            return;
        }
        let mut map = self.invokers.write();
        map.entry(key).or_insert_with(|| {
            debug!(
                entity = std::any::type_name::<T>(),
                context = std::any::type_name::<C>(),
                "registered trigger pair"
            );
            InvokerSlot::Pending(Box::new(|registry: &Registry| {
                let invoker: Arc<dyn ContextInvoker<C>> =
                    Arc::new(TriggerInvoker::<T, C>::build(registry));
                Arc::new(invoker) as AnyArc
            }))
        });
    }

    /// The invoker for entities of the given type within context `C`,
    /// building it on first use.
    pub(crate) fn invoker_for<C: Session>(
        &self,
        entity: TypeId,
    ) -> Option<Arc<dyn ContextInvoker<C>>> {
        let key = (TypeId::of::<C>(), entity);
        {
            let map = self.invokers.read();
            match map.get(&key) {
                Some(InvokerSlot::Ready(any)) => {
                    return any.downcast_ref::<Arc<dyn ContextInvoker<C>>>().cloned();
                }
                Some(InvokerSlot::Pending(_)) => {}
                None => return None,
            }
        }
        let mut map = self.invokers.write();
        if let Some(slot) = map.get_mut(&key) {
            if let InvokerSlot::Pending(build) = slot {
                // Builder only touches the set maps, never this one.
                let built = build(self);
                *slot = InvokerSlot::Ready(built);
            }
        }
        match map.get(&key) {
            Some(InvokerSlot::Ready(any)) => {
                any.downcast_ref::<Arc<dyn ContextInvoker<C>>>().cloned()
            }
            _ => None,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl AspectLookup for Registry {
    fn aspect_set(&self, aspect: TypeId, make: &dyn Fn() -> AnyArc) -> AnyArc {
        if let Some(set) = self.aspects.read().get(&aspect) {
            return set.clone();
        }
        self.aspects
            .write()
            .entry(aspect)
            .or_insert_with(make)
            .clone()
    }
}

fn downcast_set<T: Entity, C: Context + ?Sized>(any: AnyArc) -> Arc<TriggerSet<T, C>> {
    any.downcast::<TriggerSet<T, C>>()
        .ok()
        .expect("type mismatch in trigger set registry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use varsel_core::{PendingChange, PendingState, PersistError};

    struct Account;

    impl Entity for Account {}

    struct Store;

    impl Context for Store {}

    impl Session for Store {
        fn pending(&self) -> Vec<PendingChange> {
            Vec::new()
        }

        fn set_state(&self, _entity: &varsel_core::EntityRef, _state: PendingState) {}

        fn original_values(
            &self,
            _entity: &varsel_core::EntityRef,
        ) -> Option<Arc<dyn Any + Send + Sync>> {
            None
        }

        fn persist(&self, _accept_changes: bool) -> Result<usize, PersistError> {
            Ok(0)
        }
    }

    #[test]
    fn typed_set_is_canonical() {
        let registry = Registry::new();
        let first = registry.triggers::<Account, Store>();
        first.inserting().add(|_| Ok(()));

        let second = registry.triggers::<Account, Store>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.inserting().len(), 1);
    }

    #[test]
    fn registration_builds_invoker_on_first_use() {
        let registry = Registry::new();
        assert!(
            registry
                .invoker_for::<Store>(TypeId::of::<Account>())
                .is_none()
        );

        registry.register::<Account, Store>();
        let first = registry.invoker_for::<Store>(TypeId::of::<Account>());
        assert!(first.is_some());

        let second = registry.invoker_for::<Store>(TypeId::of::<Account>());
        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
    }

    #[test]
    fn aspect_set_is_canonical() {
        trait Flagged {}

        let registry = Registry::new();
        let first = registry.aspect::<dyn Flagged>();
        let second = registry.aspect::<dyn Flagged>();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn racing_first_uses_share_one_invoker() {
        let registry = Arc::new(Registry::new());
        registry.register::<Account, Store>();

        let mut workers = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            workers.push(std::thread::spawn(move || {
                registry
                    .invoker_for::<Store>(TypeId::of::<Account>())
                    .expect("pair is registered")
            }));
        }
        let invokers: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        for other in &invokers[1..] {
            assert!(Arc::ptr_eq(&invokers[0], other));
        }
    }
}
