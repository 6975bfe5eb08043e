//! Property-based tests for the queue store
//!
//! Uses proptest to drive random operation sequences against a simple
//! per-tenant model and checks ordering, isolation and notifications.

use encore_queue::{ClearMode, QueueConfig, QueueEventKind, QueueItem, QueueStore};
use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type Store = QueueStore<u32, ()>;

// ===== Helpers =====

#[derive(Debug, Clone)]
enum Op {
    Insert(usize, u32),
    Skip(usize),
    Advance(usize),
    RemoveCurrent(usize),
    ClearCurrent(usize),
}

const TENANTS: [&str; 3] = ["g0", "g1", "g2"];

fn arbitrary_op() -> impl Strategy<Value = Op> {
    let tenant = 0usize..TENANTS.len();
    prop_oneof![
        3 => (tenant.clone(), any::<u32>()).prop_map(|(t, p)| Op::Insert(t, p)),
        1 => tenant.clone().prop_map(Op::Skip),
        1 => tenant.clone().prop_map(Op::Advance),
        1 => tenant.clone().prop_map(Op::RemoveCurrent),
        1 => tenant.prop_map(Op::ClearCurrent),
    ]
}

fn arbitrary_ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(arbitrary_op(), 0..200)
}

fn payloads(store: &Store, tenant: &str) -> Vec<u32> {
    store.get_all(tenant).iter().map(|item| item.payload).collect()
}

/// Observed notification: kind, tenant, payload of the carried item
type Note = (QueueEventKind, String, Option<u32>);

fn record(store: &Store) -> Arc<Mutex<Vec<Note>>> {
    let notes = Arc::new(Mutex::new(Vec::new()));
    for kind in QueueEventKind::ALL {
        let sink = Arc::clone(&notes);
        store.subscribe(kind, move |event| {
            sink.lock().unwrap().push((
                event.kind(),
                event.tenant_id().to_string(),
                event.item().map(|item| item.payload),
            ));
            Ok(())
        });
    }
    notes
}

fn run_against_model(ops: &[Op], clear_mode: ClearMode) -> Result<(), TestCaseError> {
    let store: Store = QueueStore::with_config(QueueConfig {
        clear_mode,
        ..QueueConfig::default()
    });
    let notes = record(&store);
    let mut model: HashMap<&str, VecDeque<u32>> = HashMap::new();

    for op in ops {
        let before = notes.lock().unwrap().len();

        let (tenant, expected) = match *op {
            Op::Insert(t, payload) => {
                let tenant = TENANTS[t];
                store.insert(tenant, QueueItem::new(payload, ()));
                model.entry(tenant).or_default().push_back(payload);
                (tenant, Some((QueueEventKind::Inserted, Some(payload))))
            }
            Op::Skip(t) | Op::Advance(t) | Op::RemoveCurrent(t) | Op::ClearCurrent(t) => {
                let tenant = TENANTS[t];
                let (kind, changed) = match op {
                    Op::Skip(_) => (QueueEventKind::Skipped, store.skip(tenant)),
                    Op::Advance(_) => (QueueEventKind::Advanced, store.advance(tenant)),
                    Op::RemoveCurrent(_) => {
                        (QueueEventKind::Removed, store.remove_current(tenant))
                    }
                    _ => (QueueEventKind::Cleared, store.clear_current(tenant)),
                };

                let queue = model.entry(tenant).or_default();
                let model_changed = !queue.is_empty();
                if model_changed {
                    if kind == QueueEventKind::Cleared && clear_mode == ClearMode::All {
                        queue.clear();
                    } else {
                        queue.pop_front();
                    }
                }
                prop_assert_eq!(changed, model_changed);

                let expected = model_changed.then(|| (kind, queue.front().copied()));
                (tenant, expected)
            }
        };

        // Exactly one notification per successful mutation, none otherwise
        let seen = notes.lock().unwrap();
        match expected {
            Some((kind, item)) => {
                prop_assert_eq!(seen.len(), before + 1);
                prop_assert_eq!(&seen[before], &(kind, tenant.to_string(), item));
            }
            None => prop_assert_eq!(seen.len(), before),
        }
        drop(seen);

        // Every tenant matches the model, so untouched tenants are unchanged
        for tenant in TENANTS {
            let expected: Vec<u32> = model
                .get(tenant)
                .map(|q| q.iter().copied().collect())
                .unwrap_or_default();
            prop_assert_eq!(payloads(&store, tenant), expected);
            prop_assert_eq!(store.length(tenant), store.get_all(tenant).len());
        }
    }

    Ok(())
}

// ===== Property Tests =====

proptest! {
    /// Property: Inserts with no removals come back in insertion order
    #[test]
    fn insertion_order_preserved(items in prop::collection::vec(any::<u32>(), 0..100)) {
        let store = Store::new();
        for payload in &items {
            store.insert("g1", QueueItem::new(*payload, ()));
        }

        prop_assert_eq!(payloads(&store, "g1"), items.clone());
        prop_assert_eq!(store.length("g1"), items.len());
    }

    /// Property: Store matches a per-tenant VecDeque model (head-only clear)
    #[test]
    fn store_matches_model(ops in arbitrary_ops()) {
        run_against_model(&ops, ClearMode::Head)?;
    }

    /// Property: Store matches a per-tenant VecDeque model (full clear)
    #[test]
    fn store_matches_model_with_full_clear(ops in arbitrary_ops()) {
        run_against_model(&ops, ClearMode::All)?;
    }

    /// Property: Operations on one tenant never touch another
    #[test]
    fn tenants_isolated(
        others in prop::collection::vec(any::<u32>(), 1..20),
        ops in arbitrary_ops()
    ) {
        let store = Store::new();
        for payload in &others {
            store.insert("bystander", QueueItem::new(*payload, ()));
        }

        for op in ops {
            let t = "active";
            match op {
                Op::Insert(_, p) => store.insert(t, QueueItem::new(p, ())),
                Op::Skip(_) => { store.skip(t); }
                Op::Advance(_) => { store.advance(t); }
                Op::RemoveCurrent(_) => { store.remove_current(t); }
                Op::ClearCurrent(_) => { store.clear_current(t); }
            }
        }

        prop_assert_eq!(payloads(&store, "bystander"), others.clone());
        prop_assert_eq!(store.length("bystander"), others.len());
    }

    /// Property: Head removal on an unknown tenant never creates it
    #[test]
    fn head_removal_never_creates_tenant(name in "[a-z]{1,12}") {
        let store = Store::new();
        prop_assert!(!store.skip(&name));
        prop_assert!(!store.advance(&name));
        prop_assert!(!store.remove_current(&name));
        prop_assert!(!store.clear_current(&name));
        prop_assert_eq!(store.tenant_count(), 0);
    }
}
