//! Trigger invokers.
//!
//! A [`TriggerInvoker`] binds one entity/context pair to everything that can
//! fire for it: the entity's resolved aspect chain, its typed set, its
//! global set, and (looked up per save) an instance set from the resolver. The
//! registry builds one invoker per pair on first use and caches it; the
//! binding is immutable afterwards, while the sets it points at keep
//! accepting handlers.
//!
//! Scope order within every phase is fixed: aspects in lineage order, then
//! the typed set, then the global set, then the instance set. All scopes of
//! one phase share one [`EntryParts`], which is how a cancellation or
//! swallow decision made early in the order is seen by later scopes.
//!
//! [`ContextInvoker`] is the type-erased face the save orchestrator talks
//! to: it recovers the typed handle from an [`EntityRef`] and dispatches on
//! the runtime [`ChangeKind`].

use crate::registry::Registry;
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;
use tracing::trace;
use varsel_core::{
    AfterEntry, AspectRaiser, BeforeEntry, BoxError, ChangeKind, Context, Delete, Entity,
    EntityRef, EntryParts, EventContainer, FailedEntry, Insert, KindMarker, Lineage, Resolver,
    Session, Shared, SharedError, TriggerError, TriggerSet, Update,
};

/// Type-erased invoker for one entity type within a context type.
///
/// The orchestrator holds change records as [`EntityRef`]s and change kinds;
/// this trait lets it fire the right phase without knowing the entity type.
/// `before` and `failed` report the shared flag state after all scopes ran.
#[async_trait]
pub trait ContextInvoker<C: Session>: Send + Sync {
    /// Raises the before phase; returns whether the change was cancelled.
    fn before(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError>;

    /// Raises the after phase for a successfully written entity.
    fn after(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError>;

    /// Raises the failed phase; returns whether the failure is swallowed.
    ///
    /// `swallow` seeds the flag, carrying the decision of previously
    /// notified entities forward.
    fn failed(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError>;

    /// Async form of [`ContextInvoker::before`].
    async fn before_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError>;

    /// Async form of [`ContextInvoker::after`].
    async fn after_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError>;

    /// Async form of [`ContextInvoker::failed`].
    async fn failed_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError>;
}

/// Maps a kind marker to its containers within a [`TriggerSet`].
trait KindChannels: KindMarker + Sized {
    fn before_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<BeforeEntry<T, C, Self>>;

    fn after_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<AfterEntry<T, C, Self>>;

    fn failed_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<FailedEntry<T, C, Self>>;
}

impl KindChannels for Insert {
    fn before_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<BeforeEntry<T, C, Self>> {
        set.inserting()
    }

    fn after_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<AfterEntry<T, C, Self>> {
        set.inserted()
    }

    fn failed_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<FailedEntry<T, C, Self>> {
        set.insert_failed()
    }
}

impl KindChannels for Update {
    fn before_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<BeforeEntry<T, C, Self>> {
        set.updating()
    }

    fn after_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<AfterEntry<T, C, Self>> {
        set.updated()
    }

    fn failed_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<FailedEntry<T, C, Self>> {
        set.update_failed()
    }
}

impl KindChannels for Delete {
    fn before_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<BeforeEntry<T, C, Self>> {
        set.deleting()
    }

    fn after_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<AfterEntry<T, C, Self>> {
        set.deleted()
    }

    fn failed_of<T: Entity, C: Context + ?Sized>(
        set: &TriggerSet<T, C>,
    ) -> &EventContainer<FailedEntry<T, C, Self>> {
        set.delete_failed()
    }
}

/// Fires every handler scope for one entity/context pair.
///
/// Built once per pair by the [`Registry`]; the public methods expose one
/// operation per change kind and phase, in sync and async form. The before
/// and failed raisers return the shared flag state ([`BeforeEntry::cancel`]
/// and [`FailedEntry::swallow`] respectively) after all scopes ran.
pub struct TriggerInvoker<T: Entity, C: Session> {
    lineage: Vec<Arc<dyn AspectRaiser<T>>>,
    typed: Arc<TriggerSet<T, C>>,
    global: Arc<TriggerSet<T, dyn Context>>,
}

impl<T: Entity, C: Session> TriggerInvoker<T, C> {
    /// Binds the invoker for `T` within `C` against a registry's sets.
    pub fn build(registry: &Registry) -> Self {
        let chain = Lineage::<T>::collect();
        if !chain.is_empty() {
            trace!(
                entity = std::any::type_name::<T>(),
                aspects = ?chain.names(),
                "bound aspect chain"
            );
        }
        Self {
            lineage: chain.resolve(registry),
            typed: registry.typed_set::<T, C>(),
            global: registry.global_triggers::<T>(),
        }
    }

    /// Raises the inserting phase; returns whether the insert was cancelled.
    pub fn raise_inserting(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before::<Insert>(context, entity, resolver)
    }

    /// Raises the updating phase; returns whether the update was cancelled.
    pub fn raise_updating(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before::<Update>(context, entity, resolver)
    }

    /// Raises the deleting phase; returns whether the delete was cancelled.
    pub fn raise_deleting(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before::<Delete>(context, entity, resolver)
    }

    /// Raises the inserted phase.
    pub fn raise_inserted(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after::<Insert>(context, entity, resolver)
    }

    /// Raises the updated phase.
    pub fn raise_updated(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after::<Update>(context, entity, resolver)
    }

    /// Raises the deleted phase.
    pub fn raise_deleted(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after::<Delete>(context, entity, resolver)
    }

    /// Raises the insert-failed phase; returns the resulting swallow flag.
    pub fn raise_insert_failed(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed::<Insert>(context, entity, error, swallow, resolver)
    }

    /// Raises the update-failed phase; returns the resulting swallow flag.
    pub fn raise_update_failed(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed::<Update>(context, entity, error, swallow, resolver)
    }

    /// Raises the delete-failed phase; returns the resulting swallow flag.
    pub fn raise_delete_failed(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed::<Delete>(context, entity, error, swallow, resolver)
    }

    /// Async form of [`TriggerInvoker::raise_inserting`].
    pub async fn raise_inserting_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before_async::<Insert>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_updating`].
    pub async fn raise_updating_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before_async::<Update>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_deleting`].
    pub async fn raise_deleting_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_before_async::<Delete>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_inserted`].
    pub async fn raise_inserted_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after_async::<Insert>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_updated`].
    pub async fn raise_updated_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after_async::<Update>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_deleted`].
    pub async fn raise_deleted_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        self.raise_after_async::<Delete>(context, entity, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_insert_failed`].
    pub async fn raise_insert_failed_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed_async::<Insert>(context, entity, error, swallow, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_update_failed`].
    pub async fn raise_update_failed_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed_async::<Update>(context, entity, error, swallow, resolver)
            .await
    }

    /// Async form of [`TriggerInvoker::raise_delete_failed`].
    pub async fn raise_delete_failed_async(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        self.raise_failed_async::<Delete>(context, entity, error, swallow, resolver)
            .await
    }

    fn parts_for<K: KindMarker>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Arc<EntryParts> {
        if K::KIND.has_original() {
            let session = context.clone();
            let handle = entity.handle();
            Arc::new(EntryParts::with_original_fetch(
                resolver.cloned(),
                move || session.original_values(&handle),
            ))
        } else {
            Arc::new(EntryParts::new(resolver.cloned()))
        }
    }

    fn raise_before<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let parts = self.parts_for::<K>(context, entity, resolver);
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser.raise_before(K::KIND, entity, &erased, &parts)?;
        }
        K::before_of(self.typed.as_ref()).raise(&BeforeEntry::new(
            entity.clone(),
            context.clone(),
            parts.clone(),
        ))?;
        K::before_of(self.global.as_ref()).raise(&BeforeEntry::new(
            entity.clone(),
            erased.clone(),
            parts.clone(),
        ))?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::before_of(set.as_ref()).raise(&BeforeEntry::new(
                entity.clone(),
                context.clone(),
                parts.clone(),
            ))?;
        }
        Ok(parts.cancelled())
    }

    fn raise_after<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        let parts = Arc::new(EntryParts::new(resolver.cloned()));
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser.raise_after(K::KIND, entity, &erased, &parts)?;
        }
        K::after_of(self.typed.as_ref()).raise(&AfterEntry::new(
            entity.clone(),
            context.clone(),
            parts.clone(),
        ))?;
        K::after_of(self.global.as_ref()).raise(&AfterEntry::new(
            entity.clone(),
            erased.clone(),
            parts.clone(),
        ))?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::after_of(set.as_ref()).raise(&AfterEntry::new(
                entity.clone(),
                context.clone(),
                parts.clone(),
            ))?;
        }
        Ok(())
    }

    fn raise_failed<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let parts = self.parts_for::<K>(context, entity, resolver);
        parts.set_swallowed(swallow);
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser.raise_failed(K::KIND, entity, &erased, error, &parts)?;
        }
        K::failed_of(self.typed.as_ref()).raise(&FailedEntry::new(
            entity.clone(),
            context.clone(),
            error.clone(),
            parts.clone(),
        ))?;
        K::failed_of(self.global.as_ref()).raise(&FailedEntry::new(
            entity.clone(),
            erased.clone(),
            error.clone(),
            parts.clone(),
        ))?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::failed_of(set.as_ref()).raise(&FailedEntry::new(
                entity.clone(),
                context.clone(),
                error.clone(),
                parts.clone(),
            ))?;
        }
        Ok(parts.swallowed())
    }

    async fn raise_before_async<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let parts = self.parts_for::<K>(context, entity, resolver);
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser
                .raise_before_async(K::KIND, entity, &erased, &parts)
                .await?;
        }
        K::before_of(self.typed.as_ref())
            .raise_async(&BeforeEntry::new(
                entity.clone(),
                context.clone(),
                parts.clone(),
            ))
            .await?;
        K::before_of(self.global.as_ref())
            .raise_async(&BeforeEntry::new(
                entity.clone(),
                erased.clone(),
                parts.clone(),
            ))
            .await?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::before_of(set.as_ref())
                .raise_async(&BeforeEntry::new(
                    entity.clone(),
                    context.clone(),
                    parts.clone(),
                ))
                .await?;
        }
        Ok(parts.cancelled())
    }

    async fn raise_after_async<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        let parts = Arc::new(EntryParts::new(resolver.cloned()));
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser
                .raise_after_async(K::KIND, entity, &erased, &parts)
                .await?;
        }
        K::after_of(self.typed.as_ref())
            .raise_async(&AfterEntry::new(
                entity.clone(),
                context.clone(),
                parts.clone(),
            ))
            .await?;
        K::after_of(self.global.as_ref())
            .raise_async(&AfterEntry::new(
                entity.clone(),
                erased.clone(),
                parts.clone(),
            ))
            .await?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::after_of(set.as_ref())
                .raise_async(&AfterEntry::new(
                    entity.clone(),
                    context.clone(),
                    parts.clone(),
                ))
                .await?;
        }
        Ok(())
    }

    async fn raise_failed_async<K: KindChannels>(
        &self,
        context: &Arc<C>,
        entity: &Shared<T>,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let parts = self.parts_for::<K>(context, entity, resolver);
        parts.set_swallowed(swallow);
        let erased: Arc<dyn Context> = context.clone();
        for raiser in &self.lineage {
            raiser
                .raise_failed_async(K::KIND, entity, &erased, error, &parts)
                .await?;
        }
        K::failed_of(self.typed.as_ref())
            .raise_async(&FailedEntry::new(
                entity.clone(),
                context.clone(),
                error.clone(),
                parts.clone(),
            ))
            .await?;
        K::failed_of(self.global.as_ref())
            .raise_async(&FailedEntry::new(
                entity.clone(),
                erased.clone(),
                error.clone(),
                parts.clone(),
            ))
            .await?;
        if let Some(set) = instance_set::<T, C>(resolver) {
            K::failed_of(set.as_ref())
                .raise_async(&FailedEntry::new(
                    entity.clone(),
                    context.clone(),
                    error.clone(),
                    parts.clone(),
                ))
                .await?;
        }
        Ok(parts.swallowed())
    }
}

#[async_trait]
impl<T: Entity, C: Session> ContextInvoker<C> for TriggerInvoker<T, C> {
    fn before(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => self.raise_inserting(context, &shared, resolver),
            ChangeKind::Update => self.raise_updating(context, &shared, resolver),
            ChangeKind::Delete => self.raise_deleting(context, &shared, resolver),
        }
    }

    fn after(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => self.raise_inserted(context, &shared, resolver),
            ChangeKind::Update => self.raise_updated(context, &shared, resolver),
            ChangeKind::Delete => self.raise_deleted(context, &shared, resolver),
        }
    }

    fn failed(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => {
                self.raise_insert_failed(context, &shared, error, swallow, resolver)
            }
            ChangeKind::Update => {
                self.raise_update_failed(context, &shared, error, swallow, resolver)
            }
            ChangeKind::Delete => {
                self.raise_delete_failed(context, &shared, error, swallow, resolver)
            }
        }
    }

    async fn before_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => self.raise_inserting_async(context, &shared, resolver).await,
            ChangeKind::Update => self.raise_updating_async(context, &shared, resolver).await,
            ChangeKind::Delete => self.raise_deleting_async(context, &shared, resolver).await,
        }
    }

    async fn after_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<(), BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => self.raise_inserted_async(context, &shared, resolver).await,
            ChangeKind::Update => self.raise_updated_async(context, &shared, resolver).await,
            ChangeKind::Delete => self.raise_deleted_async(context, &shared, resolver).await,
        }
    }

    async fn failed_async(
        &self,
        kind: ChangeKind,
        context: &Arc<C>,
        entity: &EntityRef,
        error: &SharedError,
        swallow: bool,
        resolver: Option<&Arc<dyn Resolver>>,
    ) -> Result<bool, BoxError> {
        let shared = claim::<T>(entity)?;
        match kind {
            ChangeKind::Insert => {
                self.raise_insert_failed_async(context, &shared, error, swallow, resolver)
                    .await
            }
            ChangeKind::Update => {
                self.raise_update_failed_async(context, &shared, error, swallow, resolver)
                    .await
            }
            ChangeKind::Delete => {
                self.raise_delete_failed_async(context, &shared, error, swallow, resolver)
                    .await
            }
        }
    }
}

/// Per-save instance set, if the resolver carries one for this pair.
fn instance_set<T: Entity, C: Session>(
    resolver: Option<&Arc<dyn Resolver>>,
) -> Option<Arc<TriggerSet<T, C>>> {
    let resolver = resolver?;
    resolver
        .resolve(TypeId::of::<TriggerSet<T, C>>())
        .and_then(|any| any.downcast::<TriggerSet<T, C>>().ok())
}

fn claim<T: Entity>(entity: &EntityRef) -> Result<Shared<T>, BoxError> {
    entity.downcast::<T>().ok_or_else(|| {
        BoxError::from(TriggerError::EntityTypeMismatch {
            expected: std::any::type_name::<T>(),
        })
    })
}
