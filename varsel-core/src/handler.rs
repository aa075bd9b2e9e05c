//! Handler representation.
//!
//! Every registered trigger handler is stored as a [`HandlerFn`]: a union of
//! a synchronous closure and an asynchronous one over the same entry type.
//! Containers hold these side by side and pick the right invocation shape per
//! raise path, so callers never need parallel sync/async registration lists.

use crate::error::BoxError;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque receipt for a registered handler.
///
/// Returned by every container `add` call; pass it back to
/// [`EventContainer::remove`](crate::EventContainer::remove) to deregister.
/// Tokens are unique per registration, so registering the same closure twice
/// yields two tokens and each removal retires one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

impl HandlerToken {
    pub(crate) fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// A stored handler: either a synchronous closure or an async one.
///
/// Entries are passed by value; they are cheap handles over shared state, so
/// cloning one per invocation keeps the closure signatures free of borrowed
/// lifetimes.
pub(crate) enum HandlerFn<E> {
    Sync(Arc<dyn Fn(E) -> Result<(), BoxError> + Send + Sync>),
    Async(Arc<dyn Fn(E) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>),
}

impl<E> HandlerFn<E> {
    /// Invokes the handler from a synchronous raise.
    ///
    /// Async handlers are driven to completion on the calling thread. The
    /// blocking raise path is only sound when the handler future does not
    /// itself require the surrounding runtime; prefer the async raise path
    /// inside async applications.
    pub(crate) fn invoke_blocking(&self, entry: E) -> Result<(), BoxError> {
        match self {
            HandlerFn::Sync(f) => f(entry),
            HandlerFn::Async(f) => futures::executor::block_on(f(entry)),
        }
    }

    /// Invokes the handler from an asynchronous raise.
    pub(crate) async fn invoke(&self, entry: E) -> Result<(), BoxError> {
        match self {
            HandlerFn::Sync(f) => f(entry),
            HandlerFn::Async(f) => f(entry).await,
        }
    }
}

impl<E> Clone for HandlerFn<E> {
    fn clone(&self) -> Self {
        match self {
            HandlerFn::Sync(f) => HandlerFn::Sync(f.clone()),
            HandlerFn::Async(f) => HandlerFn::Async(f.clone()),
        }
    }
}
