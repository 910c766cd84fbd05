//! End-to-end scenarios exercising a `Container` the way an application
//! would: multiple stores and threads sharing one process-wide instance.

use jacis::{Container, JacisError, StoreSpec, TrackedView, TransactionHandle, TransactionalStore};
use jacis_core::adapter::CloneValueAdapter;
use std::any::Any;
use std::sync::Arc;

fn fresh_accounts(container: &Container) -> Arc<jacis::StoreEngine<String, CloneValueAdapter<i64>>> {
    let store = container
        .create_store(StoreSpec::new("accounts", CloneValueAdapter::<i64>::new()))
        .expect("store name is free");
    store.init_store_non_transactional(vec![1i64], |_| "a".to_string(), 1);
    store
}

#[test]
fn dirty_read_prevention() {
    let container = Arc::new(Container::default());
    let store = fresh_accounts(&container);

    let t1 = container.begin_local_transaction("writer").unwrap();
    store.update(&t1, &"a".to_string(), 2);

    let reader = {
        let container = container.clone();
        let store = store.clone();
        std::thread::spawn(move || {
            let t2 = container.begin_local_transaction("reader").unwrap();
            let value = store.get(&t2, &"a".to_string());
            container.rollback_transaction().unwrap();
            value
        })
    }
    .join()
    .unwrap();
    assert_eq!(reader, Some(1));

    container.commit_transaction().unwrap();

    container
        .with_local_tx("verify", |t3| {
            assert_eq!(store.get(t3, &"a".to_string()), Some(2));
            Ok(())
        })
        .unwrap();
}

#[test]
fn repeatable_read() {
    let container = Arc::new(Container::default());
    let store = fresh_accounts(&container);

    let t1 = container.begin_local_transaction("t1").unwrap();
    assert_eq!(store.get(&t1, &"a".to_string()), Some(1));

    {
        let container = container.clone();
        let store = store.clone();
        std::thread::spawn(move || {
            container
                .with_local_tx("t2", |t2| {
                    store.update(t2, &"a".to_string(), 2);
                    Ok(())
                })
                .unwrap();
        })
        .join()
        .unwrap();
    }

    // T1's second read of k still observes the value from its first touch.
    assert_eq!(store.get(&t1, &"a".to_string()), Some(1));
    container.commit_transaction().unwrap();

    container
        .with_local_tx("t3", |t3| {
            assert_eq!(store.get(t3, &"a".to_string()), Some(2));
            Ok(())
        })
        .unwrap();
}

#[test]
fn stale_object_on_write_write_conflict_and_successful_retry() {
    let container = Arc::new(Container::default());
    let store = fresh_accounts(&container);

    let t1 = container.begin_local_transaction("t1").unwrap();
    store.update(&t1, &"a".to_string(), 11);

    {
        let container = container.clone();
        let store = store.clone();
        std::thread::spawn(move || {
            container
                .with_local_tx("t2", |t2| {
                    store.update(t2, &"a".to_string(), 21);
                    Ok(())
                })
                .unwrap();
        })
        .join()
        .unwrap();
    }

    let err = container.commit_transaction().unwrap_err();
    assert!(matches!(err, JacisError::TxRollback { .. }));

    container
        .with_local_tx_and_retry("t1-retry", 3, |tx| {
            let current = store.get(tx, &"a".to_string()).unwrap();
            store.update(tx, &"a".to_string(), current + 100);
            Ok(())
        })
        .unwrap();

    // Computed over the value the racing transaction actually committed (21).
    assert_eq!(store.get_committed_value(&"a".to_string()), Some(121));
}

#[derive(Clone)]
struct Widget {
    str_value: String,
}

#[test]
fn unique_index_collision_at_commit() {
    let container = Container::default();
    let store = container
        .create_store(StoreSpec::new("widgets", CloneValueAdapter::<Widget>::new()))
        .unwrap();
    store.init_store_non_transactional_with(
        vec![
            (
                "v1".to_string(),
                Widget {
                    str_value: "X".to_string(),
                },
            ),
            (
                "v2".to_string(),
                Widget {
                    str_value: "Y".to_string(),
                },
            ),
        ],
        |(k, _)| k.clone(),
        |(_, v)| v,
        1,
    );
    store.create_unique_index("by_str_value", |w: &Widget| w.str_value.clone()).unwrap();

    let t1 = Arc::new(TransactionHandle::begin_local("t1"));
    store.update(
        &t1,
        &"v2".to_string(),
        Widget {
            str_value: "Z".to_string(),
        },
    );

    let t2 = Arc::new(TransactionHandle::begin_local("t2"));
    store.update(
        &t2,
        &"v1".to_string(),
        Widget {
            str_value: "Z".to_string(),
        },
    );

    store.prepare(t1.tx_id()).unwrap();
    store.commit(t1.tx_id()).unwrap();

    let err = store.prepare(t2.tx_id()).unwrap_err();
    assert!(matches!(err, JacisError::UniqueIndexViolation { .. }));
    store.rollback(t2.tx_id()).unwrap();
}

#[test]
fn unique_index_get_reflects_the_reading_transactions_own_uncommitted_write() {
    let container = Container::default();
    let store = container
        .create_store(StoreSpec::new("widgets", CloneValueAdapter::<Widget>::new()))
        .unwrap();
    store.init_store_non_transactional_with(
        vec![(
            "v1".to_string(),
            Widget {
                str_value: "X".to_string(),
            },
        )],
        |(k, _)| k.clone(),
        |(_, v)| v,
        1,
    );
    store.create_unique_index("by_str_value", |w: &Widget| w.str_value.clone()).unwrap();

    let t1 = Arc::new(TransactionHandle::begin_local("t1"));
    store.update(
        &t1,
        &"v1".to_string(),
        Widget {
            str_value: "Z".to_string(),
        },
    );

    // t1's own uncommitted write is visible through the tx-aware lookup...
    assert_eq!(store.unique_index_get(&t1, "by_str_value", &"Z".to_string()), Some("v1".to_string()));
    assert_eq!(store.unique_index_get(&t1, "by_str_value", &"X".to_string()), None);

    // ...but not yet through the committed-only lookup.
    assert_eq!(store.unique_index_get_read_only("by_str_value", &"Z".to_string()), None);
    assert_eq!(store.unique_index_get_read_only("by_str_value", &"X".to_string()), Some("v1".to_string()));

    store.prepare(t1.tx_id()).unwrap();
    store.commit(t1.tx_id()).unwrap();

    assert_eq!(store.unique_index_get_read_only("by_str_value", &"Z".to_string()), Some("v1".to_string()));
    assert_eq!(store.unique_index_get_read_only("by_str_value", &"X".to_string()), None);
}

#[derive(Clone, Default)]
struct SumView(i64);

impl TrackedView<i64> for SumView {
    fn clear(&mut self) {
        self.0 = 0;
    }

    fn track_modification(&mut self, old: Option<&i64>, new: Option<&i64>) -> Result<(), String> {
        if let Some(v) = old {
            self.0 -= v;
        }
        if let Some(v) = new {
            self.0 += v;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn TrackedView<i64>> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn tracked_view_consistency() {
    let container = Container::default();
    let store = container
        .create_store(StoreSpec::new("numbers", CloneValueAdapter::<i64>::new()))
        .unwrap();
    store.init_store_non_transactional_with(
        vec![("a".to_string(), 1i64), ("b".to_string(), 2), ("c".to_string(), 3)],
        |(k, _)| k.clone(),
        |(_, v)| v,
        1,
    );
    store.register_tracked_view("sum", Box::new(SumView::default())).unwrap();

    let seeded = store.get_tracked_view(&TransactionHandle::begin_local("probe"), "sum").unwrap();
    assert_eq!(seeded.as_any().downcast_ref::<SumView>().unwrap().0, 6);

    let t1 = Arc::new(TransactionHandle::begin_local("t1"));
    store.update(&t1, &"a".to_string(), 10);
    store.update(&t1, &"d".to_string(), 4);

    let view = store.get_tracked_view(&t1, "sum").unwrap();
    assert_eq!(view.as_any().downcast_ref::<SumView>().unwrap().0, 19);

    let t2 = Arc::new(TransactionHandle::begin_local("t2"));
    let view_outside = store.get_tracked_view(&t2, "sum").unwrap();
    assert_eq!(view_outside.as_any().downcast_ref::<SumView>().unwrap().0, 6);

    store.prepare(t1.tx_id()).unwrap();
    store.commit(t1.tx_id()).unwrap();

    let view_after = store.get_tracked_view(&Arc::new(TransactionHandle::begin_local("t3")), "sum").unwrap();
    assert_eq!(view_after.as_any().downcast_ref::<SumView>().unwrap().0, 19);

    store.rollback(t2.tx_id()).unwrap();
}

#[test]
fn read_only_optimistic_lock_is_staled_by_a_concurrent_writer() {
    let container = Container::default();
    let store = fresh_accounts(&container);

    let t1 = Arc::new(TransactionHandle::begin_local("t1"));
    store.lock_read_only(&t1, &"a".to_string());

    let t2 = Arc::new(TransactionHandle::begin_local("t2"));
    store.update(&t2, &"a".to_string(), 2);
    store.prepare(t2.tx_id()).unwrap();
    store.commit(t2.tx_id()).unwrap();

    let err = store.prepare(t1.tx_id()).unwrap_err();
    assert!(matches!(err, JacisError::StaleObject { .. }));
    store.rollback(t1.tx_id()).unwrap();
}
