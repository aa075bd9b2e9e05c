//! Trigger entries.
//!
//! An entry is what a handler receives: the entity under change, the context
//! performing the save, and the per-phase control surface (cancellation for
//! the before phase, swallowing for the failed phase, lazily fetched
//! original values for updates and deletes).
//!
//! One [`EntryParts`] instance backs every view of the same entity/phase
//! pair. Handlers on different scopes of the same entity (aspect, typed,
//! global, instance) receive distinct entry values that share the flags and
//! the original-values cache, so a cancellation set by an aspect handler is
//! visible to the typed handler that runs after it.
//!
//! Entries are cheap to clone and are handed to handlers by value.

use crate::change::{ChangeKind, HasOriginal, KindMarker};
use crate::change::{Delete, Insert, Update};
use crate::context::Context;
use crate::entity::{Entity, Shared};
use crate::error::{SharedError, TriggerError};
use crate::resolver::Resolver;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

type AnySnapshot = Arc<dyn Any + Send + Sync>;

struct OriginalCell {
    slot: OnceLock<Option<AnySnapshot>>,
    fetch: Option<Box<dyn Fn() -> Option<AnySnapshot> + Send + Sync>>,
}

impl OriginalCell {
    fn empty() -> Self {
        Self {
            slot: OnceLock::new(),
            fetch: None,
        }
    }

    fn with_fetch(fetch: Box<dyn Fn() -> Option<AnySnapshot> + Send + Sync>) -> Self {
        Self {
            slot: OnceLock::new(),
            fetch: Some(fetch),
        }
    }

    fn get(&self) -> Option<AnySnapshot> {
        self.slot
            .get_or_init(|| self.fetch.as_ref().and_then(|fetch| fetch()))
            .clone()
    }
}

/// Shared state behind every entry view of one entity/phase pair.
///
/// Custom invokers build one `EntryParts` per phase, wrap it in an `Arc` and
/// thread it through each scope's entry, which is how cancellation and
/// swallow decisions propagate across scopes.
pub struct EntryParts {
    cancel: AtomicBool,
    swallow: AtomicBool,
    original: OriginalCell,
    resolver: Option<Arc<dyn Resolver>>,
}

impl EntryParts {
    /// Parts with no original-values source (inserts, after-phase entries).
    pub fn new(resolver: Option<Arc<dyn Resolver>>) -> Self {
        Self {
            cancel: AtomicBool::new(false),
            swallow: AtomicBool::new(false),
            original: OriginalCell::empty(),
            resolver,
        }
    }

    /// Parts whose entries can surface original values.
    ///
    /// `fetch` runs at most once, on first access; its result is cached for
    /// every view sharing these parts.
    pub fn with_original_fetch(
        resolver: Option<Arc<dyn Resolver>>,
        fetch: impl Fn() -> Option<AnySnapshot> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cancel: AtomicBool::new(false),
            swallow: AtomicBool::new(false),
            original: OriginalCell::with_fetch(Box::new(fetch)),
            resolver,
        }
    }

    /// Whether some handler has cancelled the change.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Sets or clears the cancellation flag.
    pub fn set_cancelled(&self, cancel: bool) {
        self.cancel.store(cancel, Ordering::Release);
    }

    /// Whether some handler has asked for the failure to be swallowed.
    pub fn swallowed(&self) -> bool {
        self.swallow.load(Ordering::Acquire)
    }

    /// Sets or clears the swallow flag.
    pub fn set_swallowed(&self, swallow: bool) {
        self.swallow.store(swallow, Ordering::Release);
    }

    /// The cached original-values snapshot, fetching it on first use.
    pub fn original(&self) -> Option<AnySnapshot> {
        self.original.get()
    }

    /// The resolver supplied to the surrounding save, if any.
    pub fn resolver(&self) -> Option<&Arc<dyn Resolver>> {
        self.resolver.as_ref()
    }

    /// Resolves a service for a handler.
    pub fn service<S: Send + Sync + 'static>(&self) -> Result<Arc<S>, TriggerError> {
        let resolver = self.resolver.as_ref().ok_or(TriggerError::ResolverMissing)?;
        resolver
            .resolve(std::any::TypeId::of::<S>())
            .and_then(|any| Arc::downcast::<S>(any).ok())
            .ok_or(TriggerError::ServiceUnresolved {
                service: std::any::type_name::<S>(),
            })
    }
}

/// Common surface of every entry type.
///
/// Lets generic code (such as service-injecting registration helpers) reach
/// the shared [`EntryParts`] without knowing the concrete entry type.
pub trait EntryView: Clone + Send + Sync + 'static {
    /// The shared per-phase state behind this view.
    fn parts(&self) -> &EntryParts;

    /// Resolves a service from the save's resolver.
    fn service<S: Send + Sync + 'static>(&self) -> Result<Arc<S>, TriggerError> {
        self.parts().service::<S>()
    }
}

/// Entry delivered to before-phase handlers.
///
/// Handlers observe the change before it is written and may mutate the
/// entity in place or cancel the change outright.
pub struct BeforeEntry<T: Entity, C: Context + ?Sized, K: KindMarker> {
    entity: Shared<T>,
    context: Arc<C>,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> BeforeEntry<T, C, K> {
    /// Builds a before entry over shared parts.
    pub fn new(entity: Shared<T>, context: Arc<C>, parts: Arc<EntryParts>) -> Self {
        Self {
            entity,
            context,
            parts,
            _kind: PhantomData,
        }
    }

    /// The entity under change.
    pub fn entity(&self) -> &Shared<T> {
        &self.entity
    }

    /// The context performing the save.
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// The change kind this entry announces.
    pub fn kind(&self) -> ChangeKind {
        K::KIND
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

impl<T: Entity, C: Context + ?Sized, K: HasOriginal> BeforeEntry<T, C, K> {
    /// The entity's values as they were before the change, if the session
    /// has them.
    pub fn original(&self) -> Option<Arc<T>> {
        self.parts
            .original()
            .and_then(|any| Arc::downcast::<T>(any).ok())
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> Clone for BeforeEntry<T, C, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            context: self.context.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> EntryView for BeforeEntry<T, C, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> fmt::Debug for BeforeEntry<T, C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeforeEntry")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Entry delivered to after-phase handlers, once the write succeeded.
pub struct AfterEntry<T: Entity, C: Context + ?Sized, K: KindMarker> {
    entity: Shared<T>,
    context: Arc<C>,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> AfterEntry<T, C, K> {
    /// Builds an after entry over shared parts.
    pub fn new(entity: Shared<T>, context: Arc<C>, parts: Arc<EntryParts>) -> Self {
        Self {
            entity,
            context,
            parts,
            _kind: PhantomData,
        }
    }

    /// The entity that was written.
    pub fn entity(&self) -> &Shared<T> {
        &self.entity
    }

    /// The context that performed the save.
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// The change kind that was applied.
    pub fn kind(&self) -> ChangeKind {
        K::KIND
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> Clone for AfterEntry<T, C, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            context: self.context.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> EntryView for AfterEntry<T, C, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> fmt::Debug for AfterEntry<T, C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AfterEntry")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .finish()
    }
}

/// Entry delivered to failed-phase handlers when the write did not succeed.
///
/// Every implicated entity's handlers see the same underlying error. Any of
/// them may mark it swallowed; the save then reports success with a zero
/// affected count instead of returning the error.
pub struct FailedEntry<T: Entity, C: Context + ?Sized, K: KindMarker> {
    entity: Shared<T>,
    context: Arc<C>,
    error: SharedError,
    parts: Arc<EntryParts>,
    _kind: PhantomData<fn() -> K>,
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> FailedEntry<T, C, K> {
    /// Builds a failed entry over shared parts.
    pub fn new(
        entity: Shared<T>,
        context: Arc<C>,
        error: SharedError,
        parts: Arc<EntryParts>,
    ) -> Self {
        Self {
            entity,
            context,
            error,
            parts,
            _kind: PhantomData,
        }
    }

    /// The entity whose write failed.
    pub fn entity(&self) -> &Shared<T> {
        &self.entity
    }

    /// The context whose save failed.
    pub fn context(&self) -> &Arc<C> {
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

impl<T: Entity, C: Context + ?Sized, K: HasOriginal> FailedEntry<T, C, K> {
    /// The entity's values as they were before the change, if the session
    /// has them.
    pub fn original(&self) -> Option<Arc<T>> {
        self.parts
            .original()
            .and_then(|any| Arc::downcast::<T>(any).ok())
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> Clone for FailedEntry<T, C, K> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            context: self.context.clone(),
            error: self.error.clone(),
            parts: self.parts.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> EntryView for FailedEntry<T, C, K> {
    fn parts(&self) -> &EntryParts {
        &self.parts
    }
}

impl<T: Entity, C: Context + ?Sized, K: KindMarker> fmt::Debug for FailedEntry<T, C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedEntry")
            .field("entity", &self.entity)
            .field("kind", &K::KIND)
            .field("swallowed", &self.is_swallowed())
            .finish()
    }
}

/// Before-phase entry for an insert.
pub type Inserting<T, C> = BeforeEntry<T, C, Insert>;
/// Before-phase entry for an update.
pub type Updating<T, C> = BeforeEntry<T, C, Update>;
/// Before-phase entry for a delete.
pub type Deleting<T, C> = BeforeEntry<T, C, Delete>;
/// After-phase entry for an insert.
pub type Inserted<T, C> = AfterEntry<T, C, Insert>;
/// After-phase entry for an update.
pub type Updated<T, C> = AfterEntry<T, C, Update>;
/// After-phase entry for a delete.
pub type Deleted<T, C> = AfterEntry<T, C, Delete>;
/// Failed-phase entry for an insert.
pub type InsertFailed<T, C> = FailedEntry<T, C, Insert>;
/// Failed-phase entry for an update.
pub type UpdateFailed<T, C> = FailedEntry<T, C, Update>;
/// Failed-phase entry for a delete.
pub type DeleteFailed<T, C> = FailedEntry<T, C, Delete>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct Account {
        balance: i64,
    }

    impl Entity for Account {}

    struct Ctx;

    impl Context for Ctx {}

    #[test]
    fn original_fetch_runs_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let counted = fetches.clone();
        let parts = Arc::new(EntryParts::with_original_fetch(None, move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(Account { balance: 1 }) as AnySnapshot)
        }));

        let entry: Updating<Account, Ctx> =
            BeforeEntry::new(Shared::new(Account { balance: 5 }), Arc::new(Ctx), parts);

        assert_eq!(entry.original().unwrap().balance, 1);
        assert_eq!(entry.clone().original().unwrap().balance, 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_original_is_none_and_cached() {
        let parts = Arc::new(EntryParts::new(None));
        let entry: Deleting<Account, Ctx> =
            BeforeEntry::new(Shared::new(Account { balance: 0 }), Arc::new(Ctx), parts);

        assert!(entry.original().is_none());
        assert!(entry.original().is_none());
    }

    #[test]
    fn cancel_is_visible_across_views() {
        let parts = Arc::new(EntryParts::new(None));
        let first: Inserting<Account, Ctx> = BeforeEntry::new(
            Shared::new(Account { balance: 0 }),
            Arc::new(Ctx),
            parts.clone(),
        );
        let second = first.clone();

        first.cancel();
        assert!(second.is_cancelled());

        second.set_cancel(false);
        assert!(!first.is_cancelled());
    }

    #[test]
    fn service_without_resolver_fails() {
        let parts = Arc::new(EntryParts::new(None));
        let entry: Inserting<Account, Ctx> =
            BeforeEntry::new(Shared::new(Account { balance: 0 }), Arc::new(Ctx), parts);

        assert!(matches!(
            entry.service::<String>(),
            Err(TriggerError::ResolverMissing)
        ));
    }
}
