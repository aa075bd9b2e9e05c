//! Entity handles.
//!
//! Trigger handlers for different entity types live in different containers,
//! but a save operation walks one heterogeneous change set. The types here
//! bridge the two worlds:
//!
//! - [`Shared<T>`] is the typed handle: a cheaply cloneable, lock-guarded cell
//!   holding one entity instance.
//! - [`EntityRef`] is the erased handle the session and orchestrator move
//!   around; it remembers the concrete type and can be downcast back.
//!
//! Both sides point at the same cell, so a mutation made through a typed
//! handle in one trigger is visible through every other handle to the same
//! entity, including the one the session persists.

use crate::lineage::Lineage;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type that can participate in lifecycle triggers.
///
/// Implementations are usually empty. Override [`Entity::lineage`] to declare
/// the base views of the type, so that handlers registered against those
/// views also fire for this entity:
///
/// ```rust,ignore
/// struct Order { placed_by: String }
///
/// impl Entity for Order {
///     fn lineage(lineage: &mut Lineage<Self>) {
///         lineage.aspect::<dyn Auditable>(|o| o, |o| o);
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a trigger `Entity`",
    label = "missing `Entity` implementation",
    note = "Entities must be `Send + Sync + 'static`; the `lineage` method has an empty default."
)]
pub trait Entity: Send + Sync + 'static {
    /// Declares the aspect chain of this type, outermost base first.
    ///
    /// The default declares nothing: only directly-typed, global and
    /// instance handlers fire.
    fn lineage(lineage: &mut Lineage<Self>)
    where
        Self: Sized,
    {
        let _ = lineage;
    }
}

/// Identity of one tracked entity instance.
///
/// Derived from the address of the shared cell, so two handles compare equal
/// exactly when they alias the same instance. Valid for comparisons only
/// while at least one handle is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(usize);

/// A shared, lock-guarded cell holding one entity.
///
/// Cloning is cheap and yields another handle to the same cell. Triggers
/// receive handles like this and may read or mutate the entity through them;
/// guard scopes should be kept short since every handle contends on the same
/// lock.
pub struct Shared<T: Entity> {
    cell: Arc<RwLock<T>>,
}

impl<T: Entity> Shared<T> {
    /// Wraps a value in a fresh shared cell.
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(RwLock::new(value)),
        }
    }

    /// Acquires a read guard on the entity.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.read()
    }

    /// Acquires a write guard on the entity.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.write()
    }

    /// The instance identity of this cell.
    pub fn id(&self) -> EntityId {
        EntityId(Arc::as_ptr(&self.cell) as *const () as usize)
    }

    /// Type-erased handle to the same cell.
    pub fn handle(&self) -> EntityRef {
        EntityRef {
            cell: self.cell.clone(),
            entity_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T: Entity> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Entity> PartialEq for Shared<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<T: Entity> Eq for Shared<T> {}

impl<T: Entity> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.id())
            .finish()
    }
}

/// Type-erased handle to a tracked entity.
///
/// Sessions report pending changes in terms of `EntityRef` and the
/// orchestrator routes them to the matching typed trigger sets. The original
/// type is recoverable through [`EntityRef::downcast`].
pub struct EntityRef {
    cell: Arc<dyn Any + Send + Sync>,
    entity_type: TypeId,
    type_name: &'static str,
}

impl EntityRef {
    /// `TypeId` of the entity behind this handle.
    pub fn entity_type(&self) -> TypeId {
        self.entity_type
    }

    /// Name of the entity type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The instance identity of the underlying cell.
    ///
    /// Equal to the [`Shared::id`] of every typed handle to the same cell.
    pub fn id(&self) -> EntityId {
        EntityId(Arc::as_ptr(&self.cell) as *const () as usize)
    }

    /// Whether this handle holds a `T`.
    pub fn is<T: Entity>(&self) -> bool {
        self.entity_type == TypeId::of::<T>()
    }

    /// Recovers the typed handle, if this entity is a `T`.
    pub fn downcast<T: Entity>(&self) -> Option<Shared<T>> {
        Arc::downcast::<RwLock<T>>(self.cell.clone())
            .ok()
            .map(|cell| Shared { cell })
    }
}

impl Clone for EntityRef {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            entity_type: self.entity_type,
            type_name: self.type_name,
        }
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for EntityRef {}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("type", &self.type_name)
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        balance: i64,
    }

    impl Entity for Account {}

    struct Other;

    impl Entity for Other {}

    #[test]
    fn handles_alias_the_same_cell() {
        let shared = Shared::new(Account { balance: 10 });
        let handle = shared.handle();

        let recovered = handle.downcast::<Account>().unwrap();
        recovered.write().balance = 25;

        assert_eq!(shared.read().balance, 25);
        assert_eq!(shared.id(), handle.id());
        assert_eq!(recovered.id(), handle.id());
    }

    #[test]
    fn downcast_rejects_foreign_types() {
        let shared = Shared::new(Account { balance: 0 });
        let handle = shared.handle();

        assert!(handle.is::<Account>());
        assert!(!handle.is::<Other>());
        assert!(handle.downcast::<Other>().is_none());
    }

    #[test]
    fn identity_distinguishes_instances() {
        let a = Shared::new(Account { balance: 1 });
        let b = Shared::new(Account { balance: 1 });

        assert_ne!(a.id(), b.id());
        assert_ne!(a.handle(), b.handle());
        assert_eq!(a.handle(), a.clone().handle());
    }
}
