//! Change classification for tracked entities.
//!
//! A persistence session reports its dirty entities as [`PendingChange`]
//! records. Each record pairs a type-erased entity handle with the
//! [`ChangeKind`] the session intends to apply at the next persist call.
//!
//! The zero-sized kind markers ([`Insert`], [`Update`], [`Delete`]) carry the
//! same classification at the type level, so that trigger entries can be
//! distinct types per change kind while sharing one generic implementation.

use crate::entity::EntityRef;
use std::fmt;

/// The operation a session will apply to a pending entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The entity is new and will be inserted.
    Insert,
    /// The entity exists and has modified values.
    Update,
    /// The entity exists and will be removed.
    Delete,
}

impl ChangeKind {
    /// The tracking state a cancelled change of this kind is remapped to.
    ///
    /// Cancelling neutralizes the change without touching the rest of the
    /// save: a cancelled insert becomes [`PendingState::Detached`] (the
    /// session forgets the entity), a cancelled update becomes
    /// [`PendingState::Unchanged`] (current values are kept, nothing is
    /// written), and a cancelled delete becomes [`PendingState::Modified`]
    /// (the row survives and any pending value changes are written instead).
    pub fn on_cancel(self) -> PendingState {
        match self {
            ChangeKind::Insert => PendingState::Detached,
            ChangeKind::Update => PendingState::Unchanged,
            ChangeKind::Delete => PendingState::Modified,
        }
    }

    /// Whether entries of this kind expose pre-change original values.
    pub fn has_original(self) -> bool {
        matches!(self, ChangeKind::Update | ChangeKind::Delete)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Tracking state a session can move a pending entity into.
///
/// Used by the save orchestrator when a before-handler cancels a change; see
/// [`ChangeKind::on_cancel`] for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    /// The session no longer tracks the entity at all.
    Detached,
    /// The entity is tracked but carries no pending change.
    Unchanged,
    /// The entity is tracked with pending value changes.
    Modified,
}

/// One dirty entity as reported by a session's change scan.
#[derive(Clone)]
pub struct PendingChange {
    /// Type-erased handle to the tracked entity.
    pub entity: EntityRef,
    /// The operation the session will apply to it.
    pub kind: ChangeKind,
}

impl fmt::Debug for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChange")
            .field("entity", &self.entity)
            .field("kind", &self.kind)
            .finish()
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Insert {}
    impl Sealed for super::Update {}
    impl Sealed for super::Delete {}
}

/// Type-level counterpart of [`ChangeKind`].
///
/// Implemented only by the three markers in this module; trigger entry types
/// are parameterized over a marker so that, for example, an inserting-entry
/// and a deleting-entry are different types with different capabilities.
pub trait KindMarker: sealed::Sealed + Send + Sync + 'static {
    /// The runtime classification this marker stands for.
    const KIND: ChangeKind;
}

/// Markers whose entries can expose the pre-change snapshot of the entity.
///
/// Inserts have no previous values, so only [`Update`] and [`Delete`]
/// implement this.
pub trait HasOriginal: KindMarker {}

/// Type-level marker for insert changes.
#[derive(Debug, Clone, Copy)]
pub struct Insert;

/// Type-level marker for update changes.
#[derive(Debug, Clone, Copy)]
pub struct Update;

/// Type-level marker for delete changes.
#[derive(Debug, Clone, Copy)]
pub struct Delete;

impl KindMarker for Insert {
    const KIND: ChangeKind = ChangeKind::Insert;
}

impl KindMarker for Update {
    const KIND: ChangeKind = ChangeKind::Update;
}

impl KindMarker for Delete {
    const KIND: ChangeKind = ChangeKind::Delete;
}

impl HasOriginal for Update {}
impl HasOriginal for Delete {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_remaps_each_kind() {
        assert_eq!(ChangeKind::Insert.on_cancel(), PendingState::Detached);
        assert_eq!(ChangeKind::Update.on_cancel(), PendingState::Unchanged);
        assert_eq!(ChangeKind::Delete.on_cancel(), PendingState::Modified);
    }

    #[test]
    fn only_update_and_delete_carry_originals() {
        assert!(!ChangeKind::Insert.has_original());
        assert!(ChangeKind::Update.has_original());
        assert!(ChangeKind::Delete.has_original());
    }

    #[test]
    fn markers_match_runtime_kinds() {
        assert_eq!(Insert::KIND, ChangeKind::Insert);
        assert_eq!(Update::KIND, ChangeKind::Update);
        assert_eq!(Delete::KIND, ChangeKind::Delete);
    }
}
