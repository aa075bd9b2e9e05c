use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use varsel::testing::MemorySession;
use varsel::{ChangeKind, Registry, SaveError, SaveOptions, Session, SessionExt, Shared};

mod common;
use common::{AuditLog, Invoice, new_log};

fn invoice(reference: &str, amount: i64) -> Shared<Invoice> {
    Shared::new(Invoice {
        amount,
        reference: reference.to_string(),
    })
}

#[test]
fn test_inserts_fire_before_then_persist_then_after() {
    let registry = Registry::new();
    let log = new_log();
    let after_count = Arc::new(AtomicUsize::new(0));

    let triggers = registry.triggers::<Invoice, MemorySession>();
    let before_log = log.clone();
    triggers.inserting().add(move |entry| {
        let reference = entry.entity().read().reference.clone();
        before_log.lock().push(format!("before:{reference}"));
        Ok(())
    });
    let after_log = log.clone();
    let counted = after_count.clone();
    triggers.inserted().add(move |entry| {
        counted.fetch_add(1, Ordering::SeqCst);
        let reference = entry.entity().read().reference.clone();
        after_log.lock().push(format!("after:{reference}"));
        Ok(())
    });

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("a", 10));
    session.stage_insert(&invoice("b", 20));
    let written = session.save_with_triggers(&registry, None).unwrap();

    assert_eq!(written, 2);
    assert_eq!(session.persist_calls(), 1);
    assert_eq!(after_count.load(Ordering::SeqCst), 2);
    assert_eq!(
        *log.lock(),
        vec!["before:a", "before:b", "after:a", "after:b"]
    );
}

#[test]
fn test_cancelled_insert_is_detached_and_skips_after() {
    let registry = Registry::new();
    let log = new_log();

    let triggers = registry.triggers::<Invoice, MemorySession>();
    triggers.inserting().add(|entry| {
        if entry.entity().read().amount < 0 {
            entry.cancel();
        }
        Ok(())
    });
    let after_log = log.clone();
    triggers.inserted().add(move |entry| {
        after_log
            .lock()
            .push(entry.entity().read().reference.clone());
        Ok(())
    });

    let session = Arc::new(MemorySession::new());
    let kept = invoice("kept", 40);
    let bogus = invoice("bogus", -5);
    session.stage_insert(&kept);
    session.stage_insert(&bogus);
    let written = session.save_with_triggers(&registry, None).unwrap();

    assert_eq!(written, 1);
    assert_eq!(
        session.committed(),
        vec![(kept.id(), ChangeKind::Insert)]
    );
    assert_eq!(*log.lock(), vec!["kept"]);
}

#[test]
fn test_cancelled_delete_is_written_back_as_update() {
    let registry = Registry::new();
    let log = new_log();

    let triggers = registry.triggers::<Invoice, MemorySession>();
    triggers.deleting().add(|entry| {
        entry.cancel();
        Ok(())
    });
    let updated_log = log.clone();
    triggers.updated().add(move |_entry| {
        updated_log.lock().push("updated".to_string());
        Ok(())
    });
    let deleted_log = log.clone();
    triggers.deleted().add(move |_entry| {
        deleted_log.lock().push("deleted".to_string());
        Ok(())
    });

    let session = Arc::new(MemorySession::new());
    let doomed = invoice("doomed", 1);
    session.stage_delete(&doomed);
    let written = session.save_with_triggers(&registry, None).unwrap();

    // The cancelled delete is remapped to a pending update and persisted as
    // one, but no update events were ever announced for it.
    assert_eq!(written, 1);
    assert_eq!(
        session.committed(),
        vec![(doomed.id(), ChangeKind::Update)]
    );
    assert!(log.lock().is_empty());
}

#[test]
fn test_entities_staged_during_before_get_their_own_events() {
    let registry = Registry::new();
    let log = new_log();

    let invoice_triggers = registry.triggers::<Invoice, MemorySession>();
    let staged_log = log.clone();
    invoice_triggers.inserting().add(move |entry| {
        let audit = Shared::new(AuditLog {
            message: "invoice staged".to_string(),
        });
        entry.context().stage_insert(&audit);
        staged_log.lock().push("invoice:before".to_string());
        Ok(())
    });
    let invoice_after = log.clone();
    invoice_triggers.inserted().add(move |_entry| {
        invoice_after.lock().push("invoice:after".to_string());
        Ok(())
    });

    let audit_triggers = registry.triggers::<AuditLog, MemorySession>();
    let audit_before = log.clone();
    audit_triggers.inserting().add(move |_entry| {
        audit_before.lock().push("audit:before".to_string());
        Ok(())
    });
    let audit_after = log.clone();
    audit_triggers.inserted().add(move |_entry| {
        audit_after.lock().push("audit:after".to_string());
        Ok(())
    });

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-1", 5));
    let written = session.save_with_triggers(&registry, None).unwrap();

    assert_eq!(written, 2);
    assert_eq!(session.persist_calls(), 1);
    assert_eq!(
        *log.lock(),
        vec![
            "invoice:before",
            "audit:before",
            "invoice:after",
            "audit:after"
        ]
    );
}

#[test]
fn test_entity_staged_after_a_cancelled_one_drops_still_fires() {
    let registry = Registry::new();
    let log = new_log();

    let triggers = registry.triggers::<Invoice, MemorySession>();
    let before_log = log.clone();
    triggers.inserting().add(move |entry| {
        let reference = entry.entity().read().reference.clone();
        before_log.lock().push(format!("before:{reference}"));
        match reference.as_str() {
            // "doomed" cancels itself; the session slot held its only other
            // handle, so its cell is freed mid-save right before "trigger"
            // stages a fresh invoice that may land on the recycled address.
            "doomed" => entry.cancel(),
            "trigger" => entry.context().stage_insert(&invoice("late", 5)),
            _ => {}
        }
        Ok(())
    });

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("doomed", 1));
    session.stage_insert(&invoice("trigger", 2));
    let written = session.save_with_triggers(&registry, None).unwrap();

    // Every invoice that reached the persist call got its own before event.
    assert_eq!(written, 2);
    assert_eq!(
        *log.lock(),
        vec!["before:doomed", "before:trigger", "before:late"]
    );
}

#[test]
fn test_update_entries_see_staging_time_originals() {
    let registry = Registry::new();
    let log = new_log();

    let seen = log.clone();
    registry
        .triggers::<Invoice, MemorySession>()
        .updating()
        .add(move |entry| {
            let original = entry.original().ok_or("no original values")?;
            let current = entry.entity().read().amount;
            seen.lock().push(format!("{}->{}", original.amount, current));
            Ok(())
        });

    let session = Arc::new(MemorySession::new());
    let changed = invoice("inv-2", 10);
    session.stage_update(&changed);
    changed.write().amount = 99;
    session.save_with_triggers(&registry, None).unwrap();

    assert_eq!(*log.lock(), vec!["10->99"]);
}

#[test]
fn test_before_handler_error_aborts_the_save() {
    let registry = Registry::new();

    registry
        .triggers::<Invoice, MemorySession>()
        .inserting()
        .add(|_entry| Err("validation refused".into()));

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-3", 1));
    let err = session.save_with_triggers(&registry, None).unwrap_err();

    match err {
        SaveError::Handler(source) => assert_eq!(source.to_string(), "validation refused"),
        other => panic!("expected a handler error, got {other}"),
    }
    assert_eq!(session.persist_calls(), 0);
}

#[test]
fn test_empty_change_set_still_persists_once() {
    let registry = Registry::new();
    let session = Arc::new(MemorySession::new());

    let written = session.save_with_triggers(&registry, None).unwrap();

    assert_eq!(written, 0);
    assert_eq!(session.persist_calls(), 1);
}

#[test]
fn test_unregistered_entity_type_is_an_error() {
    let registry = Registry::new();
    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-4", 1));

    let err = session.save_with_triggers(&registry, None).unwrap_err();

    match err {
        SaveError::UnregisteredEntity { type_name } => {
            assert!(type_name.contains("Invoice"));
        }
        other => panic!("expected an unregistered entity error, got {other}"),
    }
    assert_eq!(session.persist_calls(), 0);
}

#[test]
fn test_runaway_staging_hits_the_scan_bound() {
    let registry = Registry::new();

    // Every audit insert stages another one; the save must give up instead
    // of spinning.
    registry
        .triggers::<AuditLog, MemorySession>()
        .inserting()
        .add(|entry| {
            let next = Shared::new(AuditLog {
                message: "cascade".to_string(),
            });
            entry.context().stage_insert(&next);
            Ok(())
        });

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&Shared::new(AuditLog {
        message: "seed".to_string(),
    }));
    let options = SaveOptions::new().rescan_limit(3);
    let err = session
        .save_with_triggers_opts(&registry, None, options)
        .unwrap_err();

    match err {
        SaveError::RescanLimit { limit } => assert_eq!(limit, 3),
        other => panic!("expected the scan bound, got {other}"),
    }
    assert_eq!(session.persist_calls(), 0);
}

#[test]
fn test_save_without_accepting_keeps_change_records() {
    let registry = Registry::new();
    registry.register::<Invoice, MemorySession>();

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&invoice("inv-5", 7));
    let options = SaveOptions::new().accept_changes(false);
    let written = session
        .save_with_triggers_opts(&registry, None, options)
        .unwrap();

    assert_eq!(written, 1);
    assert_eq!(session.pending().len(), 1);
}
