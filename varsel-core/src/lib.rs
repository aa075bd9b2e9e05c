//! # varsel-core
//!
//! Core types for the Varsel lifecycle trigger framework.
//!
//! This crate holds the data plane: everything a handler author or a custom
//! invoker touches, with no registry or orchestration machinery. The
//! `varsel` crate builds the control plane on top.
//!
//! # Building Blocks
//!
//! ## Change Model ([`ChangeKind`], [`PendingChange`])
//!
//! A session reports dirty entities as pending changes, each classified as
//! insert, update or delete. The zero-sized markers ([`Insert`], [`Update`],
//! [`Delete`]) mirror the classification at the type level so entry types
//! can differ per kind.
//!
//! ## Entity Handles ([`Shared`], [`EntityRef`])
//!
//! The typed and type-erased views of one tracked entity instance. Both
//! alias the same lock-guarded cell; mutations made through any handle are
//! seen by all of them.
//!
//! ## Entries ([`BeforeEntry`], [`AfterEntry`], [`FailedEntry`])
//!
//! What handlers receive: the entity, the context, and the per-phase control
//! surface (cancellation, failure swallowing, lazily fetched originals).
//! Scope-specific views share one [`EntryParts`] per entity and phase.
//!
//! ## Containers ([`EventContainer`])
//!
//! Ordered handler lists published as immutable snapshots, so registration
//! can race delivery without locks on the raise path.
//!
//! ## Sets ([`TriggerSet`], [`AspectSet`])
//!
//! The nine containers (three kinds times three phases) of one entity/
//! context pair, or of one aspect.
//!
//! ## Lineage ([`Lineage`], [`AspectRaiser`])
//!
//! How an entity declares its broader views and how invokers fire them in
//! declaration order.
//!
//! ## Session Contract ([`Session`], [`Context`])
//!
//! The change-tracking surface the save orchestrator drives: pending-change
//! scans, cancellation remaps, original values, and the durable write.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod aspect;
mod change;
mod container;
mod context;
mod entity;
mod entry;
mod error;
mod handler;
mod lineage;
mod resolver;
mod set;

// Re-exports
pub use aspect::{AspectAccess, AspectAfter, AspectBefore, AspectFailed, AspectSet};
pub use change::{
    ChangeKind, Delete, HasOriginal, Insert, KindMarker, PendingChange, PendingState, Update,
};
pub use container::EventContainer;
pub use context::{Context, Session};
pub use entity::{Entity, EntityId, EntityRef, Shared};
pub use entry::{
    AfterEntry, BeforeEntry, DeleteFailed, Deleted, Deleting, EntryParts, EntryView, FailedEntry,
    InsertFailed, Inserted, Inserting, UpdateFailed, Updated, Updating,
};
pub use error::{BoxError, PersistError, SharedError, TriggerError};
pub use handler::HandlerToken;
pub use lineage::{AspectLookup, AspectRaiser, Lineage};
pub use resolver::{Resolver, ServiceMap};
pub use set::TriggerSet;
