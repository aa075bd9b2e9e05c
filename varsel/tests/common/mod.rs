use parking_lot::Mutex;
use std::sync::Arc;
use varsel::{BoxError, Entity};

// ============================================================================
// Test Entities
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Invoice {
    pub amount: i64,
    pub reference: String,
}

impl Entity for Invoice {}

#[derive(Clone, Debug)]
pub struct AuditLog {
    pub message: String,
}

impl Entity for AuditLog {}

// ============================================================================
// Shared Logs
// ============================================================================

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// A handler that appends `tag` to the log and ignores its entry.
pub fn note<E>(
    log: &Log,
    tag: &'static str,
) -> impl Fn(E) -> Result<(), BoxError> + Send + Sync + 'static
where
    E: Send + Sync + 'static,
{
    let log = log.clone();
    move |_| {
        log.lock().push(tag.to_string());
        Ok(())
    }
}
