use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use varsel::testing::MemorySession;
use varsel::{Entity, Registry, SessionExt, Shared};

struct Ledger;

impl Entity for Ledger {}

#[test]
fn test_racing_registrations_share_one_canonical_set() {
    let registry = Arc::new(Registry::new());
    let fired = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let fired = fired.clone();
        workers.push(thread::spawn(move || {
            let set = registry.triggers::<Ledger, MemorySession>();
            let fired = fired.clone();
            set.inserting().add(move |_entry| {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            set
        }));
    }
    let sets: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    // Every thread landed on the same canonical set, losing no registration.
    for other in &sets[1..] {
        assert!(Arc::ptr_eq(&sets[0], other));
    }
    assert_eq!(sets[0].inserting().len(), 8);

    let session = Arc::new(MemorySession::new());
    session.stage_insert(&Shared::new(Ledger));
    session.save_with_triggers(&registry, None).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 8);
}

#[test]
fn test_racing_first_saves_reuse_one_invoker_pair() {
    let registry = Arc::new(Registry::new());
    let fired = Arc::new(AtomicUsize::new(0));

    let counted = fired.clone();
    registry
        .triggers::<Ledger, MemorySession>()
        .inserting()
        .add(move |_entry| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    // Eight sessions save concurrently; the first uses race the invoker
    // build for the pair.
    let mut workers = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        workers.push(thread::spawn(move || {
            let session = Arc::new(MemorySession::new());
            session.stage_insert(&Shared::new(Ledger));
            session.save_with_triggers(&registry, None).unwrap()
        }));
    }
    let written: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();

    assert_eq!(written, 8);
    assert_eq!(fired.load(Ordering::SeqCst), 8);
}
