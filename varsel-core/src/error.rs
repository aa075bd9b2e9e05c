//! Error types for Varsel.
//!
//! Three layers of failure meet here:
//!
//! - [`TriggerError`] - problems raised by the framework while preparing a
//!   handler invocation (service resolution, handle mismatches)
//! - [`PersistError`] - the session's durable write failed
//! - [`SharedError`] - a cloneable wrapper that lets one persistence failure
//!   be handed to every failed-phase entry and still be returned to the
//!   caller afterwards
//!
//! Handler closures themselves return [`BoxError`], so application code can
//! use any error type it likes.

use crate::entity::EntityRef;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the framework while servicing a handler.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// A handler asked for a service but the save was started without a
    /// resolver.
    #[error("no service resolver was supplied to this save")]
    ResolverMissing,

    /// The resolver had no registration for the requested service type.
    #[error("service `{service}` could not be resolved for a trigger handler")]
    ServiceUnresolved {
        /// Type name of the requested service.
        service: &'static str,
    },

    /// A type-erased entity handle did not hold the expected entity type.
    #[error("entity handle does not hold a `{expected}`")]
    EntityTypeMismatch {
        /// Type name the caller expected.
        expected: &'static str,
    },
}

/// A persistence failure reported by a session.
///
/// `implicated` carries the entities the backend could attribute the failure
/// to, when it knows; the orchestrator uses it to decide which failed-phase
/// entries to raise. An empty list means the backend could not say.
#[derive(Error, Debug)]
#[error("persistence failed: {source}")]
pub struct PersistError {
    source: BoxError,
    implicated: Vec<EntityRef>,
}

impl PersistError {
    /// Wraps a backend error with no attributed entities.
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
            implicated: Vec::new(),
        }
    }

    /// Attributes the failure to specific entities.
    pub fn with_implicated(mut self, implicated: Vec<EntityRef>) -> Self {
        self.implicated = implicated;
        self
    }

    /// The entities the backend attributed the failure to.
    pub fn implicated(&self) -> &[EntityRef] {
        &self.implicated
    }

    /// Splits into the underlying error and the attributed entities.
    pub fn into_parts(self) -> (BoxError, Vec<EntityRef>) {
        (self.source, self.implicated)
    }
}

/// A cloneable handle to one error instance.
///
/// Failed-phase entries for every implicated entity observe the same
/// underlying error, and the orchestrator still owns it afterwards to return
/// to the caller, so the error is reference-counted rather than moved.
/// Display and `source` forward to the wrapped error.
#[derive(Clone)]
pub struct SharedError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl SharedError {
    /// The wrapped error.
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl From<BoxError> for SharedError {
    fn from(err: BoxError) -> Self {
        Self(Arc::from(err))
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}
