//! In-memory session for tests and examples.
//!
//! [`MemorySession`] is a small change tracker implementing [`Session`]:
//! stage inserts, updates, and deletes, then run a triggered save against it.
//! Update and delete slots snapshot the entity's values at staging time, so
//! entries see the pre-change originals even after handlers mutate the
//! entity. The next persist call can be primed to fail, with or without
//! attributed entities, for exercising failed-phase handlers.
//!
//! The session is deliberately naive about storage: a successful persist
//! just logs what would have been written and (with `accept_changes`) clears
//! the change records.

use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use varsel_core::{
    BoxError, ChangeKind, Context, Entity, EntityId, EntityRef, PendingChange, PendingState,
    PersistError, Session, Shared,
};

struct Slot {
    entity: EntityRef,
    kind: ChangeKind,
    excluded: bool,
    original: Option<Arc<dyn Any + Send + Sync>>,
}

struct PlannedFailure {
    error: BoxError,
    implicated: Vec<EntityRef>,
}

#[derive(Default)]
struct Inner {
    slots: Vec<Slot>,
    committed: Vec<(EntityId, ChangeKind)>,
    fail_next: Option<PlannedFailure>,
    persist_calls: usize,
}

/// An in-memory [`Session`] with scriptable persistence.
#[derive(Default)]
pub struct MemorySession {
    state: Mutex<Inner>,
}

impl MemorySession {
    /// An empty session with nothing staged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `entity` for insertion.
    ///
    /// Re-staging an already staged entity replaces its change record.
    pub fn stage_insert<T: Entity>(&self, entity: &Shared<T>) {
        self.stage(entity.handle(), ChangeKind::Insert, None);
    }

    /// Stages `entity` for update, snapshotting its current values as the
    /// originals.
    pub fn stage_update<T: Entity + Clone>(&self, entity: &Shared<T>) {
        let original: Arc<dyn Any + Send + Sync> = Arc::new(entity.read().clone());
        self.stage(entity.handle(), ChangeKind::Update, Some(original));
    }

    /// Stages `entity` for deletion, snapshotting its current values.
    pub fn stage_delete<T: Entity + Clone>(&self, entity: &Shared<T>) {
        let original: Arc<dyn Any + Send + Sync> = Arc::new(entity.read().clone());
        self.stage(entity.handle(), ChangeKind::Delete, Some(original));
    }

    fn stage(
        &self,
        entity: EntityRef,
        kind: ChangeKind,
        original: Option<Arc<dyn Any + Send + Sync>>,
    ) {
        let mut inner = self.state.lock();
        inner.slots.retain(|slot| slot.entity.id() != entity.id());
        inner.slots.push(Slot {
            entity,
            kind,
            excluded: false,
            original,
        });
    }

    /// Primes the next persist call to fail with `error`.
    ///
    /// `implicated` becomes the attributed entity list of the resulting
    /// [`PersistError`]; leave it empty to simulate a backend that cannot
    /// say which entry failed.
    pub fn fail_next_persist(&self, error: BoxError, implicated: Vec<EntityRef>) {
        self.state.lock().fail_next = Some(PlannedFailure { error, implicated });
    }

    /// Identity and kind of every written change, in persist order.
    pub fn committed(&self) -> Vec<(EntityId, ChangeKind)> {
        self.state.lock().committed.clone()
    }

    /// How many times persist has run.
    pub fn persist_calls(&self) -> usize {
        self.state.lock().persist_calls
    }
}

impl Context for MemorySession {}

impl Session for MemorySession {
    fn pending(&self) -> Vec<PendingChange> {
        self.state
            .lock()
            .slots
            .iter()
            .filter(|slot| !slot.excluded)
            .map(|slot| PendingChange {
                entity: slot.entity.clone(),
                kind: slot.kind,
            })
            .collect()
    }

    fn set_state(&self, entity: &EntityRef, state: PendingState) {
        let mut inner = self.state.lock();
        match state {
            PendingState::Detached => {
                inner.slots.retain(|slot| slot.entity.id() != entity.id());
            }
            PendingState::Unchanged => {
                if let Some(slot) = inner
                    .slots
                    .iter_mut()
                    .find(|slot| slot.entity.id() == entity.id())
                {
                    slot.excluded = true;
                }
            }
            PendingState::Modified => {
                if let Some(slot) = inner
                    .slots
                    .iter_mut()
                    .find(|slot| slot.entity.id() == entity.id())
                {
                    slot.kind = ChangeKind::Update;
                    slot.excluded = false;
                }
            }
        }
    }

    fn original_values(&self, entity: &EntityRef) -> Option<Arc<dyn Any + Send + Sync>> {
        self.state
            .lock()
            .slots
            .iter()
            .find(|slot| slot.entity.id() == entity.id())
            .and_then(|slot| slot.original.clone())
    }

    fn persist(&self, accept_changes: bool) -> Result<usize, PersistError> {
        let mut inner = self.state.lock();
        inner.persist_calls += 1;
        if let Some(failure) = inner.fail_next.take() {
            return Err(PersistError::new(failure.error).with_implicated(failure.implicated));
        }
        let written: Vec<(EntityId, ChangeKind)> = inner
            .slots
            .iter()
            .filter(|slot| !slot.excluded)
            .map(|slot| (slot.entity.id(), slot.kind))
            .collect();
        let count = written.len();
        inner.committed.extend(written);
        if accept_changes {
            inner.slots.clear();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Ticket {
        priority: u8,
    }

    impl Entity for Ticket {}

    #[test]
    fn staging_replaces_and_persist_clears() {
        let session = MemorySession::new();
        let ticket = Shared::new(Ticket { priority: 1 });

        session.stage_insert(&ticket);
        session.stage_update(&ticket);
        assert_eq!(session.pending().len(), 1);
        assert_eq!(session.pending()[0].kind, ChangeKind::Update);

        let count = session.persist(true).unwrap();
        assert_eq!(count, 1);
        assert!(session.pending().is_empty());
        assert_eq!(session.committed(), vec![(ticket.id(), ChangeKind::Update)]);
    }

    #[test]
    fn cancel_remaps_are_honored() {
        let session = MemorySession::new();
        let dropped = Shared::new(Ticket { priority: 1 });
        let kept = Shared::new(Ticket { priority: 2 });
        let revived = Shared::new(Ticket { priority: 3 });

        session.stage_insert(&dropped);
        session.stage_update(&kept);
        session.stage_delete(&revived);

        session.set_state(&dropped.handle(), PendingState::Detached);
        session.set_state(&kept.handle(), PendingState::Unchanged);
        session.set_state(&revived.handle(), PendingState::Modified);

        let pending = session.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity.id(), revived.id());
        assert_eq!(pending[0].kind, ChangeKind::Update);
    }

    #[test]
    fn originals_snapshot_staging_time_values() {
        let session = MemorySession::new();
        let ticket = Shared::new(Ticket { priority: 4 });

        session.stage_update(&ticket);
        ticket.write().priority = 9;

        let snapshot = session
            .original_values(&ticket.handle())
            .and_then(|any| any.downcast::<Ticket>().ok())
            .unwrap();
        assert_eq!(snapshot.priority, 4);
    }

    #[test]
    fn primed_failure_fires_once() {
        let session = MemorySession::new();
        let ticket = Shared::new(Ticket { priority: 1 });
        session.stage_insert(&ticket);
        session.fail_next_persist("disk full".into(), vec![ticket.handle()]);

        let err = session.persist(true).unwrap_err();
        assert_eq!(err.implicated().len(), 1);
        assert_eq!(session.persist_calls(), 1);

        assert_eq!(session.persist(true).unwrap(), 1);
        assert_eq!(session.persist_calls(), 2);
    }
}
