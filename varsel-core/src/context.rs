//! Session and context contracts.
//!
//! Handlers are registered against a context type: the application object
//! whose save operation they observe. Two levels exist:
//!
//! - [`Context`] is the marker every context type implements. Aspect-level
//!   and global handlers see their context through `Arc<dyn Context>`, so
//!   the trait must stay object-safe and method-free.
//! - [`Session`] is the change-tracking contract the save orchestrator
//!   drives: enumerate pending changes, remap cancelled ones, surface
//!   original values and perform the durable write.
//!
//! A request-scoped database handle, a unit-of-work wrapper or an in-memory
//! fake (`MemorySession` in the `varsel` crate) are all sessions.

use crate::change::{PendingChange, PendingState};
use crate::entity::EntityRef;
use crate::error::PersistError;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// Marker for types that can act as the context of trigger handlers.
///
/// Typed handlers receive the concrete context (`Arc<C>`). Handlers on
/// broader scopes receive `Arc<dyn Context>`; [`Any`] is a supertrait, so
/// the erased handle upcasts to `&dyn Any` and a handler that knows the
/// concrete session type can recover it:
///
/// ```rust,ignore
/// let any: &dyn Any = entry.context().as_ref();
/// if let Some(session) = any.downcast_ref::<AppSession>() {
///     session.audit("order placed");
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a trigger `Context`",
    label = "missing `Context` implementation",
    note = "Contexts must be `Send + Sync + 'static`; the trait itself has no methods."
)]
pub trait Context: Any + Send + Sync {}

/// A change-tracking persistence session.
///
/// The save orchestrator is generic over this trait and never talks to a
/// concrete storage backend. Implementations must tolerate interleaved calls:
/// before-phase handlers run between [`Session::pending`] scans and may stage
/// further changes or mutate entities.
pub trait Session: Context {
    /// Snapshot of the currently pending changes, in a stable order.
    ///
    /// Called repeatedly during the before phase; entities staged by earlier
    /// handlers must show up in later snapshots.
    fn pending(&self) -> Vec<PendingChange>;

    /// Moves one tracked entity into the given state.
    ///
    /// Used when a before-handler cancels a change, with the state picked by
    /// [`ChangeKind::on_cancel`](crate::ChangeKind::on_cancel). Unknown
    /// handles are ignored.
    fn set_state(&self, entity: &EntityRef, state: PendingState);

    /// Pre-change snapshot of an entity's values, if the session has one.
    ///
    /// The returned value must downcast to the entity's concrete type.
    /// Sessions typically have originals only for updated and deleted
    /// entities; `None` is the answer for inserts and unknown handles.
    fn original_values(&self, entity: &EntityRef) -> Option<Arc<dyn Any + Send + Sync>>;

    /// Performs the durable write and returns the affected-entity count.
    ///
    /// Invoked exactly once per orchestrated save, after the before phase
    /// settles. When `accept_changes` is false the session keeps its change
    /// tracking dirty after a successful write, so the same changes can be
    /// retried or inspected.
    fn persist(&self, accept_changes: bool) -> Result<usize, PersistError>;

    /// Async form of [`Session::persist`].
    ///
    /// Defaults to the synchronous implementation; sessions backed by async
    /// storage override it.
    fn persist_async(
        &self,
        accept_changes: bool,
    ) -> impl Future<Output = Result<usize, PersistError>> + Send {
        async move { self.persist(accept_changes) }
    }
}
