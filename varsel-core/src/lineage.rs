//! Aspect chains.
//!
//! An entity declares its broader views in [`Entity::lineage`]; the
//! [`Lineage`] builder records each declared aspect together with the
//! projection functions that map the entity into it. Declaration order is
//! firing order, so entities list their base-most aspect first.
//!
//! The builder stores, per aspect, a bind closure monomorphized over both
//! the entity and the aspect type. Binding happens once, when an invoker for
//! the entity is built: the closure fetches (or creates) the canonical
//! [`AspectSet`] for its aspect from the registry through [`AspectLookup`]
//! and returns an [`AspectRaiser`] that can fire every phase of that set for
//! this entity type. Because the raiser holds the canonical set, handlers
//! registered after the invoker was built still fire.

use crate::aspect::{AspectAccess, AspectAfter, AspectBefore, AspectFailed, AspectSet};
use crate::change::ChangeKind;
use crate::context::Context;
use crate::entity::{Entity, Shared};
use crate::entry::EntryParts;
use crate::error::{BoxError, SharedError};
use futures::future::BoxFuture;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Source of canonical aspect sets, implemented by the registry.
///
/// `make` builds an empty set of the right concrete type; implementations
/// must return the same set for the same `aspect` on every call, creating it
/// with `make` on first use.
pub trait AspectLookup {
    /// Returns the canonical set for `aspect`, creating it if absent.
    fn aspect_set(
        &self,
        aspect: TypeId,
        make: &dyn Fn() -> Arc<dyn Any + Send + Sync>,
    ) -> Arc<dyn Any + Send + Sync>;
}

/// One bound step of an entity's aspect chain.
///
/// Object-safe so invokers can hold a heterogeneous chain; the sync and
/// async raise paths mirror [`EventContainer`](crate::EventContainer)'s.
pub trait AspectRaiser<T: Entity>: Send + Sync {
    /// Name of the aspect type, for diagnostics.
    fn aspect_name(&self) -> &'static str;

    /// Raises the before-phase containers of this aspect for one entity.
    fn raise_before(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError>;

    /// Raises the after-phase containers of this aspect for one entity.
    fn raise_after(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError>;

    /// Raises the failed-phase containers of this aspect for one entity.
    fn raise_failed(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        error: &SharedError,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError>;

    /// Async form of [`AspectRaiser::raise_before`].
    fn raise_before_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    /// Async form of [`AspectRaiser::raise_after`].
    fn raise_after_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    /// Async form of [`AspectRaiser::raise_failed`].
    fn raise_failed_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        error: &'a SharedError,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;
}

struct LineageNode<T: Entity> {
    aspect: TypeId,
    name: &'static str,
    bind: Box<dyn Fn(&dyn AspectLookup) -> Arc<dyn AspectRaiser<T>> + Send + Sync>,
}

/// Builder for an entity's aspect chain, passed to [`Entity::lineage`].
pub struct Lineage<T: Entity> {
    nodes: Vec<LineageNode<T>>,
}

impl<T: Entity> Lineage<T> {
    /// Collects the chain declared by `T`'s [`Entity::lineage`].
    pub fn collect() -> Self {
        let mut lineage = Self { nodes: Vec::new() };
        T::lineage(&mut lineage);
        lineage
    }

    /// Declares that `T` is visible as the aspect `A`.
    ///
    /// `map` and `map_mut` project an entity reference into the aspect;
    /// for a trait object aspect they are usually identity coercions:
    ///
    /// ```rust,ignore
    /// lineage.aspect::<dyn Auditable>(|e| e, |e| e);
    /// ```
    ///
    /// Redeclaring an aspect already in the chain is a no-op; the first
    /// declaration keeps its position.
    pub fn aspect<A>(&mut self, map: fn(&T) -> &A, map_mut: fn(&mut T) -> &mut A) -> &mut Self
    where
        A: ?Sized + 'static,
    {
        let aspect = TypeId::of::<A>();
        if self.nodes.iter().any(|node| node.aspect == aspect) {
            return self;
        }
        self.nodes.push(LineageNode {
            aspect,
            name: std::any::type_name::<A>(),
            bind: Box::new(move |lookup| {
                let set = lookup
                    .aspect_set(aspect, &|| Arc::new(AspectSet::<A>::new()))
                    .downcast::<AspectSet<A>>()
                    .ok()
                    .expect("type mismatch in aspect set registry");
                Arc::new(BoundAspect {
                    set,
                    name: std::any::type_name::<A>(),
                    map,
                    map_mut,
                })
            }),
        });
        self
    }

    /// Number of declared aspects.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of the declared aspects, in firing order.
    pub fn names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|node| node.name).collect()
    }

    /// Binds every declared aspect to its canonical set.
    pub fn resolve(&self, lookup: &dyn AspectLookup) -> Vec<Arc<dyn AspectRaiser<T>>> {
        self.nodes.iter().map(|node| (node.bind)(lookup)).collect()
    }
}

struct BoundAspect<T: Entity, A: ?Sized + 'static> {
    set: Arc<AspectSet<A>>,
    name: &'static str,
    map: fn(&T) -> &A,
    map_mut: fn(&mut T) -> &mut A,
}

impl<T: Entity, A: ?Sized + 'static> BoundAspect<T, A> {
    fn access(&self, entity: &Shared<T>) -> AspectAccess<A> {
        AspectAccess::for_entity(entity, self.map, self.map_mut)
    }
}

impl<T: Entity, A: ?Sized + 'static> AspectRaiser<T> for BoundAspect<T, A> {
    fn aspect_name(&self) -> &'static str {
        self.name
    }

    fn raise_before(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError> {
        let access = self.access(entity);
        let handle = entity.handle();
        match kind {
            ChangeKind::Insert => self.set.inserting().raise(&AspectBefore::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
            ChangeKind::Update => self.set.updating().raise(&AspectBefore::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
            ChangeKind::Delete => self.set.deleting().raise(&AspectBefore::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
        }
    }

    fn raise_after(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError> {
        let access = self.access(entity);
        let handle = entity.handle();
        match kind {
            ChangeKind::Insert => self.set.inserted().raise(&AspectAfter::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
            ChangeKind::Update => self.set.updated().raise(&AspectAfter::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
            ChangeKind::Delete => self.set.deleted().raise(&AspectAfter::new(
                handle,
                access,
                context.clone(),
                parts.clone(),
            )),
        }
    }

    fn raise_failed(
        &self,
        kind: ChangeKind,
        entity: &Shared<T>,
        context: &Arc<dyn Context>,
        error: &SharedError,
        parts: &Arc<EntryParts>,
    ) -> Result<(), BoxError> {
        let access = self.access(entity);
        let handle = entity.handle();
        match kind {
            ChangeKind::Insert => self.set.insert_failed().raise(&AspectFailed::new(
                handle,
                access,
                context.clone(),
                error.clone(),
                parts.clone(),
            )),
            ChangeKind::Update => self.set.update_failed().raise(&AspectFailed::new(
                handle,
                access,
                context.clone(),
                error.clone(),
                parts.clone(),
            )),
            ChangeKind::Delete => self.set.delete_failed().raise(&AspectFailed::new(
                handle,
                access,
                context.clone(),
                error.clone(),
                parts.clone(),
            )),
        }
    }

    fn raise_before_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let access = self.access(entity);
            let handle = entity.handle();
            match kind {
                ChangeKind::Insert => {
                    self.set
                        .inserting()
                        .raise_async(&AspectBefore::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Update => {
                    self.set
                        .updating()
                        .raise_async(&AspectBefore::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Delete => {
                    self.set
                        .deleting()
                        .raise_async(&AspectBefore::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
            }
        })
    }

    fn raise_after_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let access = self.access(entity);
            let handle = entity.handle();
            match kind {
                ChangeKind::Insert => {
                    self.set
                        .inserted()
                        .raise_async(&AspectAfter::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Update => {
                    self.set
                        .updated()
                        .raise_async(&AspectAfter::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Delete => {
                    self.set
                        .deleted()
                        .raise_async(&AspectAfter::new(
                            handle,
                            access,
                            context.clone(),
                            parts.clone(),
                        ))
                        .await
                }
            }
        })
    }

    fn raise_failed_async<'a>(
        &'a self,
        kind: ChangeKind,
        entity: &'a Shared<T>,
        context: &'a Arc<dyn Context>,
        error: &'a SharedError,
        parts: &'a Arc<EntryParts>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            let access = self.access(entity);
            let handle = entity.handle();
            match kind {
                ChangeKind::Insert => {
                    self.set
                        .insert_failed()
                        .raise_async(&AspectFailed::new(
                            handle,
                            access,
                            context.clone(),
                            error.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Update => {
                    self.set
                        .update_failed()
                        .raise_async(&AspectFailed::new(
                            handle,
                            access,
                            context.clone(),
                            error.clone(),
                            parts.clone(),
                        ))
                        .await
                }
                ChangeKind::Delete => {
                    self.set
                        .delete_failed()
                        .raise_async(&AspectFailed::new(
                            handle,
                            access,
                            context.clone(),
                            error.clone(),
                            parts.clone(),
                        ))
                        .await
                }
            }
        })
    }
}
