//! Save orchestration.
//!
//! [`run_save`] sequences one triggered save against a [`Session`]: raise
//! before-phase triggers for every pending change (re-scanning for changes
//! staged by the handlers themselves), apply cancellations, persist once,
//! then raise after-phase triggers in scheduling order, or failed-phase
//! triggers if the persist errored. [`SessionExt`] wires the persist step to
//! [`Session::persist`] so most callers just write
//! `session.save_with_triggers(registry, None)`.
//!
//! Phase ordering within one save is total; nothing here fans out. Handler
//! errors abort the save where they occur and surface as
//! [`SaveError::Handler`]. A persist failure only turns into `Ok(0)` when a
//! failed-phase handler swallows it.

use crate::invoker::ContextInvoker;
use crate::registry::Registry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use varsel_core::{
    BoxError, ChangeKind, EntityId, EntityRef, PersistError, Resolver, Session, SharedError,
};

/// Errors from a triggered save.
#[derive(Debug, Error)]
pub enum SaveError {
    /// A before, after, or failed handler returned an error.
    ///
    /// The save stops at the failing handler; remaining handlers of the
    /// phase do not run, and for a before-phase failure the persist call is
    /// never made.
    #[error("trigger handler failed")]
    Handler(#[source] BoxError),

    /// The persist step failed and no failed-phase handler swallowed it.
    #[error("persistence failed")]
    Persist(#[source] SharedError),

    /// A pending change carried an entity type with no registered trigger
    /// pair for this context type.
    #[error("no triggers registered for entity type `{type_name}`")]
    UnregisteredEntity {
        /// Name of the entity type the session reported.
        type_name: &'static str,
    },

    /// Before-phase handlers kept staging new changes past the scan bound.
    #[error("before handlers were still staging changes after {limit} scans")]
    RescanLimit {
        /// The configured bound, see [`SaveOptions::rescan_limit`].
        limit: usize,
    },
}

/// Knobs for one save pass.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    pub(crate) accept_changes: bool,
    pub(crate) rescan_limit: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            accept_changes: true,
            rescan_limit: 100,
        }
    }
}

impl SaveOptions {
    /// Options with the defaults: accept changes, scan bound of 100.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the session should clear its change records after a
    /// successful persist. Defaults to `true`.
    pub fn accept_changes(mut self, accept: bool) -> Self {
        self.accept_changes = accept;
        self
    }

    /// Upper bound on before-phase pending scans.
    ///
    /// Every scan that turns up changes not seen before counts against the
    /// bound, the initial enumeration included. A handler that stages a new
    /// entity on every invocation would otherwise loop forever; exceeding
    /// the bound fails the save with [`SaveError::RescanLimit`]. Defaults
    /// to 100.
    pub fn rescan_limit(mut self, limit: usize) -> Self {
        self.rescan_limit = limit;
        self
    }
}

struct Planned<C: Session> {
    entity: EntityRef,
    kind: ChangeKind,
    invoker: Arc<dyn ContextInvoker<C>>,
}

/// Runs one triggered save with a caller-supplied persist step.
///
/// `persist` receives the session and must perform the durable write
/// exactly once; it runs even when every pending change was cancelled. Use
/// [`SessionExt::save_with_triggers`] unless the persist call needs custom
/// wiring.
///
/// Returns the persisted-entry count reported by `persist`, or `Ok(0)` when
/// a persist failure was swallowed by a failed-phase handler.
pub fn run_save<C, F>(
    registry: &Registry,
    context: &Arc<C>,
    resolver: Option<Arc<dyn Resolver>>,
    options: SaveOptions,
    persist: F,
) -> Result<usize, SaveError>
where
    C: Session,
    F: FnOnce(Arc<C>) -> Result<usize, PersistError>,
{
    // An id is only comparable while some handle to its cell is alive, so
    // the handle is kept alongside: a cancelled entity's freed cell must not
    // be recycled into an id this save already counted.
    let mut processed: HashMap<EntityId, EntityRef> = HashMap::new();
    let mut plan: Vec<Planned<C>> = Vec::new();
    let mut scans = 0usize;

    loop {
        let fresh: Vec<_> = context
            .pending()
            .into_iter()
            .filter(|change| !processed.contains_key(&change.entity.id()))
            .collect();
        if fresh.is_empty() {
            break;
        }
        scans += 1;
        if scans > options.rescan_limit {
            return Err(SaveError::RescanLimit {
                limit: options.rescan_limit,
            });
        }
        for change in fresh {
            processed.insert(change.entity.id(), change.entity.clone());
            let invoker = invoker_for(registry, &change.entity)?;
            let cancelled = invoker
                .before(change.kind, context, &change.entity, resolver.as_ref())
                .map_err(SaveError::Handler)?;
            if cancelled {
                debug!(
                    entity = change.entity.type_name(),
                    kind = %change.kind,
                    "change cancelled"
                );
                context.set_state(&change.entity, change.kind.on_cancel());
            } else {
                plan.push(Planned {
                    entity: change.entity,
                    kind: change.kind,
                    invoker,
                });
            }
        }
    }
    debug!(scans, scheduled = plan.len(), "before phase complete");

    match persist(context.clone()) {
        Ok(count) => {
            for step in &plan {
                step.invoker
                    .after(step.kind, context, &step.entity, resolver.as_ref())
                    .map_err(SaveError::Handler)?;
            }
            debug!(count, "save committed");
            Ok(count)
        }
        Err(error) => {
            let (source, implicated) = error.into_parts();
            let shared = SharedError::from(source);
            let targets = failure_targets(&plan, &implicated);
            if targets.is_empty() {
                warn!(error = %shared, "persist failed with no attributable entry");
                return Err(SaveError::Persist(shared));
            }
            let mut swallow = false;
            for index in targets {
                let step = &plan[index];
                swallow = step
                    .invoker
                    .failed(
                        step.kind,
                        context,
                        &step.entity,
                        &shared,
                        swallow,
                        resolver.as_ref(),
                    )
                    .map_err(SaveError::Handler)?;
            }
            if swallow {
                warn!(error = %shared, "persist failure swallowed");
                return Ok(0);
            }
            Err(SaveError::Persist(shared))
        }
    }
}

/// Async form of [`run_save`]; awaits each handler and the persist step
/// strictly in sequence.
pub async fn run_save_async<C, F, Fut>(
    registry: &Registry,
    context: &Arc<C>,
    resolver: Option<Arc<dyn Resolver>>,
    options: SaveOptions,
    persist: F,
) -> Result<usize, SaveError>
where
    C: Session,
    F: FnOnce(Arc<C>) -> Fut,
    Fut: Future<Output = Result<usize, PersistError>> + Send,
{
    // Handles kept for the save's duration, as in [`run_save`].
    let mut processed: HashMap<EntityId, EntityRef> = HashMap::new();
    let mut plan: Vec<Planned<C>> = Vec::new();
    let mut scans = 0usize;

    loop {
        let fresh: Vec<_> = context
            .pending()
            .into_iter()
            .filter(|change| !processed.contains_key(&change.entity.id()))
            .collect();
        if fresh.is_empty() {
            break;
        }
        scans += 1;
        if scans > options.rescan_limit {
            return Err(SaveError::RescanLimit {
                limit: options.rescan_limit,
            });
        }
        for change in fresh {
            processed.insert(change.entity.id(), change.entity.clone());
            let invoker = invoker_for(registry, &change.entity)?;
            let cancelled = invoker
                .before_async(change.kind, context, &change.entity, resolver.as_ref())
                .await
                .map_err(SaveError::Handler)?;
            if cancelled {
                debug!(
                    entity = change.entity.type_name(),
                    kind = %change.kind,
                    "change cancelled"
                );
                context.set_state(&change.entity, change.kind.on_cancel());
            } else {
                plan.push(Planned {
                    entity: change.entity,
                    kind: change.kind,
                    invoker,
                });
            }
        }
    }
    debug!(scans, scheduled = plan.len(), "before phase complete");

    match persist(context.clone()).await {
        Ok(count) => {
            for step in &plan {
                step.invoker
                    .after_async(step.kind, context, &step.entity, resolver.as_ref())
                    .await
                    .map_err(SaveError::Handler)?;
            }
            debug!(count, "save committed");
            Ok(count)
        }
        Err(error) => {
            let (source, implicated) = error.into_parts();
            let shared = SharedError::from(source);
            let targets = failure_targets(&plan, &implicated);
            if targets.is_empty() {
                warn!(error = %shared, "persist failed with no attributable entry");
                return Err(SaveError::Persist(shared));
            }
            let mut swallow = false;
            for index in targets {
                let step = &plan[index];
                swallow = step
                    .invoker
                    .failed_async(
                        step.kind,
                        context,
                        &step.entity,
                        &shared,
                        swallow,
                        resolver.as_ref(),
                    )
                    .await
                    .map_err(SaveError::Handler)?;
            }
            if swallow {
                warn!(error = %shared, "persist failure swallowed");
                return Ok(0);
            }
            Err(SaveError::Persist(shared))
        }
    }
}

fn invoker_for<C: Session>(
    registry: &Registry,
    entity: &EntityRef,
) -> Result<Arc<dyn ContextInvoker<C>>, SaveError> {
    registry
        .invoker_for::<C>(entity.entity_type())
        .ok_or_else(|| SaveError::UnregisteredEntity {
            type_name: entity.type_name(),
        })
}

/// Plan indices of the entries to notify for a persist failure.
///
/// Entries the error names take precedence; an error naming nothing is
/// attributed to the sole planned entry when exactly one exists, and to
/// nobody otherwise. Entries the error names that never made it into the
/// plan (cancelled, or never pending) are skipped, and an entry named more
/// than once is notified once.
fn failure_targets<C: Session>(plan: &[Planned<C>], implicated: &[EntityRef]) -> Vec<usize> {
    if implicated.is_empty() {
        return if plan.len() == 1 { vec![0] } else { Vec::new() };
    }
    let mut targets = Vec::new();
    for entity in implicated {
        if let Some(index) = plan.iter().position(|step| step.entity.id() == entity.id()) {
            if !targets.contains(&index) {
                targets.push(index);
            }
        }
    }
    targets
}

/// Triggered saves as session methods.
///
/// Implemented for `Arc<C>` so the orchestrator can hand the session to
/// handlers without borrowing from the caller's frame.
pub trait SessionExt<C: Session> {
    /// Runs [`run_save`] with default [`SaveOptions`], persisting through
    /// [`Session::persist`].
    fn save_with_triggers(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<usize, SaveError>;

    /// [`SessionExt::save_with_triggers`] with explicit options.
    fn save_with_triggers_opts(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
        options: SaveOptions,
    ) -> Result<usize, SaveError>;

    /// Async form of [`SessionExt::save_with_triggers`], persisting through
    /// [`Session::persist_async`].
    fn save_with_triggers_async(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> impl Future<Output = Result<usize, SaveError>> + Send;

    /// Async form of [`SessionExt::save_with_triggers_opts`].
    fn save_with_triggers_opts_async(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
        options: SaveOptions,
    ) -> impl Future<Output = Result<usize, SaveError>> + Send;
}

impl<C: Session> SessionExt<C> for Arc<C> {
    fn save_with_triggers(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<usize, SaveError> {
        self.save_with_triggers_opts(registry, resolver, SaveOptions::default())
    }

    fn save_with_triggers_opts(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
        options: SaveOptions,
    ) -> Result<usize, SaveError> {
        let accept = options.accept_changes;
        run_save(registry, self, resolver, options, move |session| {
            session.persist(accept)
        })
    }

    async fn save_with_triggers_async(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Result<usize, SaveError> {
        self.save_with_triggers_opts_async(registry, resolver, SaveOptions::default())
            .await
    }

    async fn save_with_triggers_opts_async(
        &self,
        registry: &Registry,
        resolver: Option<Arc<dyn Resolver>>,
        options: SaveOptions,
    ) -> Result<usize, SaveError> {
        let accept = options.accept_changes;
        run_save_async(registry, self, resolver, options, move |session| async move {
            session.persist_async(accept).await
        })
        .await
    }
}
