//! Ordered handler containers.
//!
//! An [`EventContainer`] holds every handler registered for one entry type,
//! in registration order. The handler list is published as an immutable
//! snapshot behind an [`ArcSwap`]: raising loads the current snapshot once
//! and walks it, while concurrent adds and removes swap in a new list
//! without disturbing raises already in flight.
//!
//! That gives the two guarantees the save orchestrator builds on:
//!
//! - a raise observes exactly the handlers whose registration completed
//!   before the raise loaded its snapshot, in registration order
//! - a handler removed mid-raise still runs for that raise; later raises no
//!   longer see it

use crate::entry::EntryView;
use crate::error::BoxError;
use crate::handler::{HandlerFn, HandlerToken};
use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

struct Registration<E> {
    token: HandlerToken,
    call: HandlerFn<E>,
}

impl<E> Clone for Registration<E> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            call: self.call.clone(),
        }
    }
}

/// An ordered, concurrently mutable collection of handlers for one entry
/// type.
///
/// Synchronous and asynchronous handlers share the container and keep their
/// relative registration order. The same closure may be added more than
/// once; each add is an independent registration with its own token.
pub struct EventContainer<E> {
    handlers: ArcSwap<Vec<Registration<E>>>,
}

impl<E> EventContainer<E> {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Registers a synchronous handler and returns its removal token.
    pub fn add<F>(&self, handler: F) -> HandlerToken
    where
        F: Fn(E) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.push(HandlerFn::Sync(Arc::new(handler)))
    }

    /// Registers an asynchronous handler and returns its removal token.
    pub fn add_async<F, Fut>(&self, handler: F) -> HandlerToken
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.push(HandlerFn::Async(Arc::new(
            move |entry: E| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(handler(entry))
            },
        )))
    }

    /// Registers a synchronous handler that receives a resolved service.
    ///
    /// The service is looked up from the save's resolver each time the
    /// handler fires; resolution failure aborts the raise with
    /// [`TriggerError`](crate::TriggerError).
    pub fn add_with<S, F>(&self, handler: F) -> HandlerToken
    where
        E: EntryView,
        S: Send + Sync + 'static,
        F: Fn(E, Arc<S>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add(move |entry: E| {
            let service = entry.service::<S>()?;
            handler(entry, service)
        })
    }

    /// Registers an asynchronous handler that receives a resolved service.
    pub fn add_with_async<S, F, Fut>(&self, handler: F) -> HandlerToken
    where
        E: EntryView,
        S: Send + Sync + 'static,
        F: Fn(E, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.push(HandlerFn::Async(Arc::new(
            move |entry: E| -> BoxFuture<'static, Result<(), BoxError>> {
                let handler = handler.clone();
                Box::pin(async move {
                    let service = entry.service::<S>()?;
                    handler(entry, service).await
                })
            },
        )))
    }

    /// Removes the most recent registration matching `token`.
    ///
    /// Returns whether a registration was removed. Raises that already
    /// loaded their snapshot still deliver to the removed handler.
    pub fn remove(&self, token: HandlerToken) -> bool {
        let mut removed = false;
        self.handlers.rcu(|current| {
            let mut next: Vec<Registration<E>> = (**current).clone();
            match next.iter().rposition(|reg| reg.token == token) {
                Some(idx) => {
                    next.remove(idx);
                    removed = true;
                }
                None => removed = false,
            }
            next
        });
        removed
    }

    /// Number of currently registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }

    fn push(&self, call: HandlerFn<E>) -> HandlerToken {
        let token = HandlerToken::next();
        let reg = Registration { token, call };
        self.handlers.rcu(|current| {
            let mut next: Vec<Registration<E>> = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(reg.clone());
            next
        });
        token
    }
}

impl<E: Clone> EventContainer<E> {
    /// Delivers `entry` to every registered handler, in order, blocking on
    /// async handlers.
    ///
    /// Stops at the first handler error and propagates it.
    pub fn raise(&self, entry: &E) -> Result<(), BoxError> {
        let snapshot = self.handlers.load_full();
        for reg in snapshot.iter() {
            reg.call.invoke_blocking(entry.clone())?;
        }
        Ok(())
    }

    /// Delivers `entry` to every registered handler, in order, awaiting each
    /// one before invoking the next.
    pub async fn raise_async(&self, entry: &E) -> Result<(), BoxError> {
        let snapshot = self.handlers.load_full();
        for reg in snapshot.iter() {
            reg.call.invoke(entry.clone()).await?;
        }
        Ok(())
    }
}

impl<E> Default for EventContainer<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        tag: &'static str,
    ) -> impl Fn(u32) -> Result<(), BoxError> + Send + Sync + 'static {
        let log = log.clone();
        move |_| {
            log.lock().push(tag);
            Ok(())
        }
    }

    #[test]
    fn delivers_in_registration_order() {
        let container = EventContainer::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        container.add(recording(&log, "first"));
        container.add_async({
            let log = log.clone();
            move |_| {
                let log = log.clone();
                async move {
                    log.lock().push("second");
                    Ok(())
                }
            }
        });
        container.add(recording(&log, "third"));

        container.raise(&0).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_registration_fires_per_add() {
        let container = EventContainer::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = container.add(recording(&log, "dup"));
        let second = container.add(recording(&log, "dup"));
        assert_ne!(first, second);

        container.raise(&0).unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn remove_retires_last_matching_registration() {
        let container = EventContainer::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let token = container.add(recording(&log, "kept"));
        assert!(container.remove(token));
        assert!(!container.remove(token));
        assert!(container.is_empty());

        container.raise(&0).unwrap();
        assert!(log.lock().is_empty());
    }

    #[test]
    fn error_stops_delivery() {
        let container = EventContainer::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        container.add(recording(&log, "ran"));
        container.add(|_| Err("boom".into()));
        container.add(recording(&log, "skipped"));

        let err = container.raise(&0).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.lock(), vec!["ran"]);
    }

    #[test]
    fn async_raise_preserves_order() {
        let container = EventContainer::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        container.add(recording(&log, "sync"));
        container.add_async({
            let log = log.clone();
            move |_| {
                let log = log.clone();
                async move {
                    log.lock().push("async");
                    Ok(())
                }
            }
        });

        futures::executor::block_on(container.raise_async(&0)).unwrap();
        assert_eq!(*log.lock(), vec!["sync", "async"]);
    }
}
