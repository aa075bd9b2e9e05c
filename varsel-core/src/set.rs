//! Typed trigger sets.
//!
//! A [`TriggerSet`] groups the nine handler containers of one entity/context
//! pair: three change kinds times three phases. Registries hand out one
//! canonical set per pair; resolvers can additionally carry per-save
//! instance sets of the same shape, which fire after the registry's.

use crate::container::EventContainer;
use crate::context::Context;
use crate::entity::Entity;
use crate::entry::{
    DeleteFailed, Deleted, Deleting, InsertFailed, Inserted, Inserting, UpdateFailed, Updated,
    Updating,
};

/// Handler containers for one entity/context pair, across all phases and
/// kinds.
pub struct TriggerSet<T: Entity, C: Context + ?Sized> {
    inserting: EventContainer<Inserting<T, C>>,
    updating: EventContainer<Updating<T, C>>,
    deleting: EventContainer<Deleting<T, C>>,
    inserted: EventContainer<Inserted<T, C>>,
    updated: EventContainer<Updated<T, C>>,
    deleted: EventContainer<Deleted<T, C>>,
    insert_failed: EventContainer<InsertFailed<T, C>>,
    update_failed: EventContainer<UpdateFailed<T, C>>,
    delete_failed: EventContainer<DeleteFailed<T, C>>,
}

impl<T: Entity, C: Context + ?Sized> TriggerSet<T, C> {
    /// Creates a set with all containers empty.
    pub fn new() -> Self {
        Self {
            inserting: EventContainer::new(),
            updating: EventContainer::new(),
            deleting: EventContainer::new(),
            inserted: EventContainer::new(),
            updated: EventContainer::new(),
            deleted: EventContainer::new(),
            insert_failed: EventContainer::new(),
            update_failed: EventContainer::new(),
            delete_failed: EventContainer::new(),
        }
    }

    /// Handlers that run before an insert is written.
    pub fn inserting(&self) -> &EventContainer<Inserting<T, C>> {
        &self.inserting
    }

    /// Handlers that run before an update is written.
    pub fn updating(&self) -> &EventContainer<Updating<T, C>> {
        &self.updating
    }

    /// Handlers that run before a delete is written.
    pub fn deleting(&self) -> &EventContainer<Deleting<T, C>> {
        &self.deleting
    }

    /// Handlers that run after an insert was written.
    pub fn inserted(&self) -> &EventContainer<Inserted<T, C>> {
        &self.inserted
    }

    /// Handlers that run after an update was written.
    pub fn updated(&self) -> &EventContainer<Updated<T, C>> {
        &self.updated
    }

    /// Handlers that run after a delete was written.
    pub fn deleted(&self) -> &EventContainer<Deleted<T, C>> {
        &self.deleted
    }

    /// Handlers that run when writing an insert failed.
    pub fn insert_failed(&self) -> &EventContainer<InsertFailed<T, C>> {
        &self.insert_failed
    }

    /// Handlers that run when writing an update failed.
    pub fn update_failed(&self) -> &EventContainer<UpdateFailed<T, C>> {
        &self.update_failed
    }

    /// Handlers that run when writing a delete failed.
    pub fn delete_failed(&self) -> &EventContainer<DeleteFailed<T, C>> {
        &self.delete_failed
    }

    /// Total registered handlers across all containers.
    pub fn handler_count(&self) -> usize {
        self.inserting.len()
            + self.updating.len()
            + self.deleting.len()
            + self.inserted.len()
            + self.updated.len()
            + self.deleted.len()
            + self.insert_failed.len()
            + self.update_failed.len()
            + self.delete_failed.len()
    }

    /// Whether every container is empty.
    pub fn is_empty(&self) -> bool {
        self.handler_count() == 0
    }
}

impl<T: Entity, C: Context + ?Sized> Default for TriggerSet<T, C> {
    fn default() -> Self {
        Self::new()
    }
}
