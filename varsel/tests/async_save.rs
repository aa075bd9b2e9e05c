use std::sync::Arc;
use varsel::testing::MemorySession;
use varsel::{Registry, SessionExt, Shared};

mod common;
use common::{AuditLog, Invoice, new_log, note};

fn invoice(reference: &str, amount: i64) -> Shared<Invoice> {
    Shared::new(Invoice {
        amount,
        reference: reference.to_string(),
    })
}

#[tokio::test]
async fn test_async_save_mixes_sync_and_async_handlers_in_order() {
    let registry = Registry::new();
    let log = new_log();

    let triggers = registry.triggers::<Invoice, MemorySession>();
    triggers.inserting().add(note(&log, "sync-before"));
    let async_log = log.clone();
    triggers.inserting().add_async(move |_entry| {
        let log = async_log.clone();
        async move {
            log.lock().push("async-before".to_string());
            Ok(())
        }
    });
    triggers.inserted().add(note(&log, "after"));

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-1", 10));
    let written = session
        .save_with_triggers_async(&registry, None)
        .await
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(*log.lock(), vec!["sync-before", "async-before", "after"]);
}

#[tokio::test]
async fn test_async_handler_cancels_an_insert() {
    let registry = Registry::new();
    let log = new_log();

    let triggers = registry.triggers::<Invoice, MemorySession>();
    triggers.inserting().add_async(|entry| async move {
        entry.cancel();
        Ok(())
    });
    triggers.inserted().add(note(&log, "after"));

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-2", 10));
    let written = session
        .save_with_triggers_async(&registry, None)
        .await
        .unwrap();

    assert_eq!(written, 0);
    assert!(session.committed().is_empty());
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_async_failed_handler_swallows() {
    let registry = Registry::new();

    registry
        .triggers::<Invoice, MemorySession>()
        .insert_failed()
        .add_async(|entry| async move {
            entry.swallow();
            Ok(())
        });

    let session = Arc::new(MemorySession::new());
    let flaky = invoice("inv-3", 10);
    session.stage_insert(&flaky);
    session.fail_next_persist("flaky network".into(), vec![flaky.handle()]);

    let written = session
        .save_with_triggers_async(&registry, None)
        .await
        .unwrap();

    assert_eq!(written, 0);
    assert_eq!(session.persist_calls(), 1);
}

#[tokio::test]
async fn test_async_save_rescans_past_a_dropped_cancellation() {
    let registry = Registry::new();
    let log = new_log();

    // Same shape as the sync variant: once "doomed" is cancelled the session
    // slot with its only handle goes away, and the invoice staged next must
    // still get its own before event.
    let before_log = log.clone();
    registry
        .triggers::<Invoice, MemorySession>()
        .inserting()
        .add(move |entry| {
            let reference = entry.entity().read().reference.clone();
            before_log.lock().push(format!("before:{reference}"));
            match reference.as_str() {
                "doomed" => entry.cancel(),
                "trigger" => entry.context().stage_insert(&invoice("late", 5)),
                _ => {}
            }
            Ok(())
        });

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("doomed", 1));
    session.stage_insert(&invoice("trigger", 2));
    let written = session
        .save_with_triggers_async(&registry, None)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(
        *log.lock(),
        vec!["before:doomed", "before:trigger", "before:late"]
    );
}

#[tokio::test]
async fn test_async_save_rescans_for_newly_staged_entities() {
    let registry = Registry::new();
    let log = new_log();

    let staged = log.clone();
    registry
        .triggers::<Invoice, MemorySession>()
        .inserting()
        .add_async(move |entry| {
            let log = staged.clone();
            async move {
                let audit = Shared::new(AuditLog {
                    message: "trail".to_string(),
                });
                entry.context().stage_insert(&audit);
                log.lock().push("invoice".to_string());
                Ok(())
            }
        });
    registry
        .triggers::<AuditLog, MemorySession>()
        .inserting()
        .add(note(&log, "audit"));

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-4", 10));
    let written = session
        .save_with_triggers_async(&registry, None)
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(*log.lock(), vec!["invoice", "audit"]);
}
