//! # varsel - Lifecycle Triggers for Persistence Sessions
//!
//! `varsel` runs application handlers at the edges of a change-tracking
//! session's save: immediately **before** and **after** each entity is
//! inserted, updated, or deleted, and when the persist attempt **fails**.
//! Before-handlers can cancel an individual change; failed-handlers can
//! swallow the failure.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use varsel::testing::MemorySession;
//! use varsel::{Entity, Registry, SessionExt, Shared};
//!
//! struct Order { total: u32 }
//! impl Entity for Order {}
//!
//! let registry = Registry::global();
//! let triggers = registry.triggers::<Order, MemorySession>();
//! triggers.inserting().add(|entry| {
//!     entry.entity().write().total += 1;
//!     Ok(())
//! });
//!
//! let session = Arc::new(MemorySession::new());
//! session.stage_insert(&Shared::new(Order { total: 0 }));
//! let written = session.save_with_triggers(registry, None)?;
//! ```
//!
//! Handlers for one entity fire in a deterministic order per phase: declared
//! aspects (outermost first), the entity's typed set, the global set, then
//! instance sets from the save's resolver. Registration is safe from any
//! thread at any time, including while a save is mid-raise elsewhere; a
//! raise in flight keeps the handler snapshot it started with.

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod invoker;
mod registry;
mod save;

pub mod testing;

pub use invoker::{ContextInvoker, TriggerInvoker};
pub use registry::Registry;
pub use save::{SaveError, SaveOptions, SessionExt, run_save, run_save_async};

pub use varsel_core::{
    // Entries
    AfterEntry,
    // Aspects
    AspectAccess,
    AspectAfter,
    AspectBefore,
    AspectFailed,
    AspectLookup,
    AspectRaiser,
    AspectSet,
    BeforeEntry,
    // Errors
    BoxError,
    // Change model
    ChangeKind,
    // Session contract
    Context,
    Delete,
    DeleteFailed,
    Deleted,
    Deleting,
    // Entity handles
    Entity,
    EntityId,
    EntityRef,
    EntryParts,
    EntryView,
    // Containers
    EventContainer,
    FailedEntry,
    HandlerToken,
    HasOriginal,
    Insert,
    InsertFailed,
    Inserted,
    Inserting,
    KindMarker,
    // Aspect chains
    Lineage,
    PendingChange,
    PendingState,
    PersistError,
    // Services
    Resolver,
    ServiceMap,
    Session,
    Shared,
    SharedError,
    TriggerError,
    // Trigger sets
    TriggerSet,
    Update,
    UpdateFailed,
    Updated,
    Updating,
};

/// Prelude module - common imports for Varsel.
///
/// # Usage
///
/// ```rust,ignore
/// use varsel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Errors
        BoxError,
        // Change model
        ChangeKind,
        // Session contract
        Context,
        // Entity handles
        Entity,
        EntityRef,
        EntryView,
        Lineage,
        // Registry and saves
        Registry,
        Resolver,
        SaveError,
        SaveOptions,
        ServiceMap,
        Session,
        SessionExt,
        Shared,
        TriggerSet,
    };
}
