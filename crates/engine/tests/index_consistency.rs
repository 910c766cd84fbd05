//! Randomized stress test checking that a unique and a non-unique index
//! stay consistent with committed state after a long run of random
//! updates/removes, each going through the real prepare/commit protocol.
//!
//! Grounded on the teacher's `index_consistency::test_indices_consistent_after_random_ops`
//! (`crates/storage/tests/integration_tests.rs`).

use jacis_concurrency::TransactionHandle;
use jacis_core::adapter::CloneValueAdapter;
use jacis_core::StoreSpec;
use jacis_engine::{StoreEngine, TransactionalStore};
use rand::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Item {
    bucket: u8,
}

#[test]
fn indexes_stay_consistent_after_random_operations() {
    let store: StoreEngine<String, CloneValueAdapter<Item>> =
        StoreEngine::new(StoreSpec::new("items", CloneValueAdapter::new()));
    store
        .create_non_unique_index("by_bucket", |item: &Item| item.bucket)
        .unwrap();

    let mut rng = rand::thread_rng();
    let mut model: HashMap<String, Item> = HashMap::new();

    for _ in 0..500 {
        let key = format!("key_{}", rng.gen_range(0..50));
        let op: u8 = rng.gen_range(0..3);
        let tx = Arc::new(TransactionHandle::begin_local("stress"));

        match op {
            0 => {
                let item = Item {
                    bucket: rng.gen_range(0..5),
                };
                store.update(&tx, &key, item.clone());
                if store.prepare(tx.tx_id()).is_ok() {
                    store.commit(tx.tx_id()).unwrap();
                    model.insert(key, item);
                } else {
                    store.rollback(tx.tx_id()).unwrap();
                }
            }
            1 => {
                store.remove(&tx, &key);
                if store.prepare(tx.tx_id()).is_ok() {
                    store.commit(tx.tx_id()).unwrap();
                    model.remove(&key);
                } else {
                    store.rollback(tx.tx_id()).unwrap();
                }
            }
            _ => {
                let _ = store.get(&tx, &key);
                store.rollback(tx.tx_id()).unwrap();
            }
        }
    }

    let index = store.get_non_unique_index::<u8>("by_bucket").unwrap();
    for bucket in 0..5u8 {
        let mut expected: Vec<String> = model
            .iter()
            .filter(|(_, item)| item.bucket == bucket)
            .map(|(k, _)| k.clone())
            .collect();
        expected.sort();

        let mut indexed: Vec<String> = index.get(&bucket).into_iter().collect();
        indexed.sort();

        assert_eq!(indexed, expected, "index mismatch for bucket {bucket}");
    }

    let mut committed: Vec<(String, Item)> = store.stream_read_only();
    committed.sort_by(|a, b| a.0.cmp(&b.0));
    let mut expected: Vec<(String, Item)> = model.into_iter().collect();
    expected.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(committed, expected);
}
