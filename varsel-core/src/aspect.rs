//! Aspect entries.
//!
//! An aspect is a broader view of an entity, usually a `dyn Trait`, declared
//! in the entity's [`Lineage`](crate::Lineage). Handlers registered against
//! an aspect fire for every entity type that declares it, before that
//! entity's own typed handlers.
//!
//! Aspect handlers cannot name the concrete entity type, so their entries
//! expose the entity through a callback surface ([`AspectBefore::with_entity`]
//! and friends) backed by an [`AspectAccess`]: a pair of erased closures
//! built from the projection functions the lineage declared. The context is
//! likewise erased to `Arc<dyn Context>`.
//!
//! Control flags live in the same shared [`EntryParts`] as the typed entry
//! of the entity, so an aspect handler cancelling a change is seen by every
//! narrower scope.

use crate::change::{ChangeKind, Delete, HasOriginal, Insert, KindMarker, Update};
use crate::container::EventContainer;
use crate::context::Context;
use crate::entity::{Entity, EntityRef, Shared};
use crate::entry::{EntryParts, EntryView};
use crate::error::SharedError;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Erased access to one entity through an aspect projection.
///
/// Built per raise from the typed handle, so the closures never need to
/// recover the concrete type at call time.
pub struct AspectAccess<A: ?Sized + 'static> {
    read: Arc<dyn Fn(&mut dyn FnMut(&A)) + Send + Sync>,
    write: Arc<dyn Fn(&mut dyn FnMut(&mut A)) + Send + Sync>,
    original: Arc<dyn Fn(&(dyn Any + Send + Sync), &mut dyn FnMut(&A)) + Send + Sync>,
}

impl<A: ?Sized + 'static> AspectAccess<A> {
    /// Binds the projection functions of one lineage declaration to a
    /// concrete entity handle.
    pub fn for_entity<T: Entity>(
        entity: &Shared<T>,
        map: fn(&T) -> &A,
        map_mut: fn(&mut T) -> &mut A,
    ) -> Self {
        let read_cell = entity.clone();
        let write_cell = entity.clone();
        Self {
            read: Arc::new(move |f: &mut dyn FnMut(&A)| {
                let guard = read_cell.read();
                f(map(&guard));
            }),
            write: Arc::new(move |f: &mut dyn FnMut(&mut A)| {
                let mut guard = write_cell.write();
                f(map_mut(&mut guard));
            }),
            original: Arc::new(move |snapshot, f: &mut dyn FnMut(&A)| {
                if let Some(value) = snapshot.downcast_ref::<T>() {
                    f(map(value));
                }
            }),
        }
    }

    fn with_read<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        (self.read)(&mut |aspect| {
            if let Some(f) = f.take() {
                out = Some(f(aspect));
            }
        });
        out.expect("aspect read access did not visit the entity")
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        let mut f = Some(f);
        let mut out = None;
        (self.write)(&mut |aspect| {
            if let Some(f) = f.take() {
                out = Some(f(aspect));
            }
        });
        out.expect("aspect write access did not visit the entity")
    }

    fn with_snapshot<R>(
        &self,
        snapshot: &(dyn Any + Send + Sync),
        f: impl FnOnce(&A) -> R,
    ) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;
        (self.original)(snapshot, &mut |aspect| {
            if let Some(f) = f.take() {
                out = Some(f(aspect));
            }
        });
        out
    }
}

impl<A: ?Sized + 'static> Clone for AspectAccess<A> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            write: self.write.clone(),
            original: self.original.clone(),
        }
    }
}

/// Before-phase entry seen by aspect handlers.
pub struct AspectBefore<A: ?Sized + 'static, K: KindMarker> {
    entity: EntityRef,
    access: AspectAccess<A>,
    context: Arc<dyn Context>,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<A: ?Sized + 'static, K: KindMarker> AspectBefore<A, K> {
    /// Builds an aspect before-entry over shared parts.
    pub fn new(
        entity: EntityRef,
        access: AspectAccess<A>,
        context: Arc<dyn Context>,
        parts: Arc<EntryParts>,
    ) -> Self {
        Self {
            entity,
            access,
            context,
            parts,
            _kind: PhantomData,
        }
    }

    /// Type-erased handle to the entity under change.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// The context performing the save, erased.
    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    /// The change kind this entry announces.
    pub fn kind(&self) -> ChangeKind {
        K::KIND
    }

    /// Reads the entity through the aspect projection.
    pub fn with_entity<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        self.access.with_read(f)
    }

    /// Mutates the entity through the aspect projection.
    pub fn with_entity_mut<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        self.access.with_write(f)
    }

    /// Cancels the change. The entity will not be written.
    pub fn cancel(&self) {
        self.parts.set_cancelled(true);
    }

    /// Sets or clears the cancellation flag, overriding earlier handlers.
    pub fn set_cancel(&self, cancel: bool) {
        self.parts.set_cancelled(cancel);
    }

    /// Whether this change is currently cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.parts.cancelled()
    }
}

impl<A: ?Sized + 'static, K: HasOriginal> AspectBefore<A, K> {
    /// Reads the pre-change values through the aspect projection, if the
    /// session has them.
    pub fn with_original<R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        let snapshot = self.parts.original()?;
        self.access.with_snapshot(&*snapshot, f)
    }
}

impl<A: ?Sized + 'static, K: KindMarker> Clone for AspectBefore<A, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            access: self.access.clone(),
            context: self.context.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<A: ?Sized + 'static, K: KindMarker> EntryView for AspectBefore<A, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<A: ?Sized + 'static, K: KindMarker> fmt::Debug for AspectBefore<A, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectBefore")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// After-phase entry seen by aspect handlers.
pub struct AspectAfter<A: ?Sized + 'static, K: KindMarker> {
    entity: EntityRef,
    access: AspectAccess<A>,
    context: Arc<dyn Context>,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<A: ?Sized + 'static, K: KindMarker> AspectAfter<A, K> {
    /// Builds an aspect after-entry over shared parts.
    pub fn new(
        entity: EntityRef,
        access: AspectAccess<A>,
        context: Arc<dyn Context>,
        parts: Arc<EntryParts>,
    ) -> Self {
        Self {
            entity,
            access,
            context,
            parts,
            _kind: PhantomData,
        }
    }

    /// Type-erased handle to the written entity.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// The context that performed the save, erased.
    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    /// The change kind that was applied.
    pub fn kind(&self) -> ChangeKind {
        K::KIND
    }

    /// Reads the entity through the aspect projection.
    pub fn with_entity<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        self.access.with_read(f)
    }

    /// Mutates the entity through the aspect projection.
    pub fn with_entity_mut<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        self.access.with_write(f)
    }
}

impl<A: ?Sized + 'static, K: KindMarker> Clone for AspectAfter<A, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            access: self.access.clone(),
            context: self.context.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<A: ?Sized + 'static, K: KindMarker> EntryView for AspectAfter<A, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<A: ?Sized + 'static, K: KindMarker> fmt::Debug for AspectAfter<A, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectAfter")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .finish()
    }
}

/// Failed-phase entry seen by aspect handlers.
pub struct AspectFailed<A: ?Sized + 'static, K: KindMarker> {
    entity: EntityRef,
    access: AspectAccess<A>,
    context: Arc<dyn Context>,
    error: SharedError,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<A: ?Sized + 'static, K: KindMarker> AspectFailed<A, K> {
    /// Builds an aspect failed-entry over shared parts.
    pub fn new(
        entity: EntityRef,
        access: AspectAccess<A>,
        context: Arc<dyn Context>,
        error: SharedError,
        parts: Arc<EntryParts>,
    ) -> Self {
        Self {
            entity,
            access,
            context,
            error,
            parts,
            _kind: PhantomData,
        }
    }

    /// Type-erased handle to the entity whose write failed.
    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// The context whose save failed, erased.
    pub fn context(&self) -> &Arc<dyn Context> {
        &self.context
    }

    /// The change kind that was being applied.
    pub fn kind(&self) -> ChangeKind {
        K::KIND
    }

    /// The error the persistence attempt produced.
    pub fn error(&self) -> &SharedError {
        &self.error
    }

    /// Reads the entity through the aspect projection.
    pub fn with_entity<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        self.access.with_read(f)
    }

    /// Mutates the entity through the aspect projection.
    pub fn with_entity_mut<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        self.access.with_write(f)
    }

    /// Marks the failure as handled; the save will report success.
    pub fn swallow(&self) {
        self.parts.set_swallowed(true);
    }

    /// Sets or clears the swallow flag, overriding earlier handlers.
    pub fn set_swallow(&self, swallow: bool) {
        self.parts.set_swallowed(swallow);
    }

    /// Whether some handler has swallowed the failure.
    pub fn is_swallowed(&self) -> bool {
        self.parts.swallowed()
    }
}

impl<A: ?Sized + 'static, K: HasOriginal> AspectFailed<A, K> {
    /// Reads the pre-change values through the aspect projection, if the
    /// session has them.
    pub fn with_original<R>(&self, f: impl FnOnce(&A) -> R) -> Option<R> {
        let snapshot = self.parts.original()?;
        self.access.with_snapshot(&*snapshot, f)
    }
}

impl<A: ?Sized + 'static, K: KindMarker> Clone for AspectFailed<A, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            access: self.access.clone(),
            context: self.context.clone(),
            error: self.error.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<A: ?Sized + 'static, K: KindMarker> EntryView for AspectFailed<A, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<A: ?Sized + 'static, K: KindMarker> fmt::Debug for AspectFailed<A, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectFailed")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .field("swallowed", &self.is_swallowed())
            .finish()
    }
}

/// Handler containers for one aspect, across all phases and kinds.
///
/// One canonical `AspectSet` exists per aspect type in a registry; every
/// entity whose lineage declares the aspect raises into the same set.
pub struct AspectSet<A: ?Sized + 'static> {
    inserting: EventContainer<AspectBefore<A, Insert>>,
    updating: EventContainer<AspectBefore<A, Update>>,
    deleting: EventContainer<AspectBefore<A, Delete>>,
    inserted: EventContainer<AspectAfter<A, Insert>>,
    updated: EventContainer<AspectAfter<A, Update>>,
    deleted: EventContainer<AspectAfter<A, Delete>>,
    insert_failed: EventContainer<AspectFailed<A, Insert>>,
    update_failed: EventContainer<AspectFailed<A, Update>>,
    delete_failed: EventContainer<AspectFailed<A, Delete>>,
}

impl<A: ?Sized + 'static> AspectSet<A> {
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
    pub fn inserting(&self) -> &EventContainer<AspectBefore<A, Insert>> {
        &self.inserting
    }

    /// Handlers that run before an update is written.
    pub fn updating(&self) -> &EventContainer<AspectBefore<A, Update>> {
        &self.updating
    }

    /// Handlers that run before a delete is written.
    pub fn deleting(&self) -> &EventContainer<AspectBefore<A, Delete>> {
        &self.deleting
    }

    /// Handlers that run after an insert was written.
    pub fn inserted(&self) -> &EventContainer<AspectAfter<A, Insert>> {
        &self.inserted
    }

    /// Handlers that run after an update was written.
    pub fn updated(&self) -> &EventContainer<AspectAfter<A, Update>> {
        &self.updated
    }

    /// Handlers that run after a delete was written.
    pub fn deleted(&self) -> &EventContainer<AspectAfter<A, Delete>> {
        &self.deleted
    }

    /// Handlers that run when writing an insert failed.
    pub fn insert_failed(&self) -> &EventContainer<AspectFailed<A, Insert>> {
        &self.insert_failed
    }

    /// Handlers that run when writing an update failed.
    pub fn update_failed(&self) -> &EventContainer<AspectFailed<A, Update>> {
        &self.update_failed
    }

    /// Handlers that run when writing a delete failed.
    pub fn delete_failed(&self) -> &EventContainer<AspectFailed<A, Delete>> {
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

impl<A: ?Sized + 'static> Default for AspectSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Audited {
        fn audit_tag(&self) -> &str;
        fn set_audit_tag(&mut self, tag: &str);
    }

    struct Invoice {
        tag: String,
    }

    impl Entity for Invoice {}

    impl Audited for Invoice {
        fn audit_tag(&self) -> &str {
            &self.tag
        }

        fn set_audit_tag(&mut self, tag: &str) {
            self.tag = tag.to_string();
        }
    }

    struct Ctx;

    impl Context for Ctx {}

    fn as_audited(entity: &Invoice) -> &(dyn Audited + 'static) {
        entity
    }

    fn as_audited_mut(entity: &mut Invoice) -> &mut (dyn Audited + 'static) {
        entity
    }

    fn access_for(entity: &Shared<Invoice>) -> AspectAccess<dyn Audited> {
        AspectAccess::for_entity(entity, as_audited, as_audited_mut)
    }

    #[test]
    fn reads_and_writes_through_projection() {
        let entity = Shared::new(Invoice { tag: "new".into() });
        let entry: AspectBefore<dyn Audited, Insert> = AspectBefore::new(
            entity.handle(),
            access_for(&entity),
            Arc::new(Ctx),
            Arc::new(EntryParts::new(None)),
        );

        assert_eq!(entry.with_entity(|a| a.audit_tag().to_string()), "new");
        entry.with_entity_mut(|a| a.set_audit_tag("stamped"));
        assert_eq!(entity.read().tag, "stamped");
    }

    #[test]
    fn original_projection_uses_snapshot() {
        let entity = Shared::new(Invoice { tag: "now".into() });
        let parts = Arc::new(EntryParts::with_original_fetch(None, || {
            Some(Arc::new(Invoice { tag: "then".into() }) as Arc<dyn Any + Send + Sync>)
        }));
        let entry: AspectBefore<dyn Audited, Update> =
            AspectBefore::new(entity.handle(), access_for(&entity), Arc::new(Ctx), parts);

        let original = entry.with_original(|a| a.audit_tag().to_string());
        assert_eq!(original.as_deref(), Some("then"));
    }

    #[test]
    fn aspect_set_counts_handlers() {
        let set: AspectSet<dyn Audited> = AspectSet::new();
        assert!(set.is_empty());

        set.inserting().add(|_| Ok(()));
        set.delete_failed().add(|_| Ok(()));
        assert_eq!(set.handler_count(), 2);
    }
}
