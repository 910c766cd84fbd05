//! Tracked views: incrementally maintained aggregates (Section 4.5).

use crate::index::Modification;
use jacis_core::error::{JacisError, JacisResult};
use std::any::Any;
use std::sync::Arc;
use std::sync::RwLock;

/// A user-supplied aggregation kept consistent with a store's committed
/// state. Implementors must be `Clone` so the registry can hand out
/// per-transaction snapshots without disturbing the committed-side
/// instance.
pub trait TrackedView<V>: Send + Sync {
    /// Reset to the "no values seen" state.
    fn clear(&mut self);

    /// Fold one modification into the view. `old = None` means the key was
    /// previously absent; `new = None` means it is being removed.
    fn track_modification(&mut self, old: Option<&V>, new: Option<&V>) -> Result<(), String>;

    /// Optional integrity audit, run after commit when the store is
    /// configured with `check_views_on_commit`. Given every current
    /// committed value, it may recompute independently and compare.
    fn check_view(&self, _all_values: &[&V]) -> Result<(), String> {
        Ok(())
    }

    /// Produce a boxed clone of this view's current state, for snapshotting.
    fn clone_box(&self) -> Box<dyn TrackedView<V>>;

    /// Expose this view as `Any` so callers can downcast a snapshot back to
    /// their concrete aggregate type.
    fn as_any(&self) -> &dyn Any;
}

struct Entry<V> {
    name: String,
    view: RwLock<Box<dyn TrackedView<V>>>,
}

/// Every tracked view registered on one store.
pub struct TrackedViewRegistry<V> {
    entries: RwLock<Vec<Arc<Entry<V>>>>,
}

impl<V> Default for TrackedViewRegistry<V> {
    fn default() -> Self {
        TrackedViewRegistry {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<V> TrackedViewRegistry<V> {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view, seeding it by replaying every current committed
    /// value through `track_modification(None, Some(value))`.
    pub fn register(
        &self,
        store_id: &jacis_core::ids::StoreId,
        name: impl Into<String>,
        mut view: Box<dyn TrackedView<V>>,
        committed_values: &[&V],
    ) -> JacisResult<()> {
        let name = name.into();
        view.clear();
        for value in committed_values {
            view.track_modification(None, Some(value))
                .map_err(|reason| JacisError::TrackedViewFailure {
                    store_id: store_id.clone(),
                    view_name: name.clone(),
                    reason,
                })?;
        }
        self.entries.write().unwrap().push(Arc::new(Entry {
            name,
            view: RwLock::new(view),
        }));
        Ok(())
    }

    fn find(&self, name: &str) -> Option<Arc<Entry<V>>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    /// Apply a committed-side modification to every registered view. Used
    /// by the commit protocol for each modified key.
    pub fn apply_committed(
        &self,
        store_id: &jacis_core::ids::StoreId,
        old: Option<&V>,
        new: Option<&V>,
    ) -> JacisResult<()> {
        for entry in self.entries.read().unwrap().iter() {
            entry
                .view
                .write()
                .unwrap()
                .track_modification(old, new)
                .map_err(|reason| JacisError::TrackedViewFailure {
                    store_id: store_id.clone(),
                    view_name: entry.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    /// Run every view's `check_view` audit hook.
    pub fn audit(&self, store_id: &jacis_core::ids::StoreId, all_values: &[&V]) -> JacisResult<()> {
        for entry in self.entries.read().unwrap().iter() {
            entry
                .view
                .read()
                .unwrap()
                .check_view(all_values)
                .map_err(|reason| JacisError::TrackedViewFailure {
                    store_id: store_id.clone(),
                    view_name: entry.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    /// A per-transaction snapshot of the named view: a clone of its current
    /// committed-side state, with `modifications` replayed on top. Later
    /// mutations to the committed view (from other transactions committing
    /// concurrently) do not retroactively change the returned snapshot.
    pub fn snapshot<K>(&self, name: &str, modifications: &[Modification<K, V>]) -> Option<Box<dyn TrackedView<V>>>
    where
        V: Clone,
    {
        let entry = self.find(name)?;
        let mut snapshot = entry.view.read().unwrap().clone_box();
        for (_, orig, new) in modifications {
            let old_ref = orig.as_ref().and_then(|o| o.as_ref());
            let _ = snapshot.track_modification(old_ref, new.as_ref());
        }
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacis_concurrency::OrigValue;
    use jacis_core::ids::StoreId;

    #[derive(Clone, Default)]
    struct RunningTotal {
        sum: i64,
        count: usize,
    }

    impl TrackedView<i64> for RunningTotal {
        fn clear(&mut self) {
            self.sum = 0;
            self.count = 0;
        }

        fn track_modification(&mut self, old: Option<&i64>, new: Option<&i64>) -> Result<(), String> {
            if let Some(v) = old {
                self.sum -= v;
                self.count -= 1;
            }
            if let Some(v) = new {
                self.sum += v;
                self.count += 1;
            }
            Ok(())
        }

        fn check_view(&self, all_values: &[&i64]) -> Result<(), String> {
            let expected: i64 = all_values.iter().copied().sum();
            if expected == self.sum {
                Ok(())
            } else {
                Err(format!("expected sum {expected}, tracked {}", self.sum))
            }
        }

        fn clone_box(&self) -> Box<dyn TrackedView<i64>> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn register_seeds_the_view_from_committed_values() {
        let registry: TrackedViewRegistry<i64> = TrackedViewRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .register(&store_id, "total", Box::new(RunningTotal::default()), &[&10, &20])
            .unwrap();

        let snapshot = registry.snapshot::<String>("total", &[]).unwrap();
        let total = snapshot.as_any().downcast_ref::<RunningTotal>().unwrap();
        assert_eq!(total.sum, 30);
        assert_eq!(total.count, 2);
    }

    #[test]
    fn apply_committed_folds_a_single_modification_into_every_view() {
        let registry: TrackedViewRegistry<i64> = TrackedViewRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .register(&store_id, "total", Box::new(RunningTotal::default()), &[&10])
            .unwrap();

        registry.apply_committed(&store_id, Some(&10), Some(&15)).unwrap();

        let snapshot = registry.snapshot::<String>("total", &[]).unwrap();
        let total = snapshot.as_any().downcast_ref::<RunningTotal>().unwrap();
        assert_eq!(total.sum, 15);
    }

    #[test]
    fn snapshot_replays_pending_modifications_without_mutating_the_committed_view() {
        let registry: TrackedViewRegistry<i64> = TrackedViewRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .register(&store_id, "total", Box::new(RunningTotal::default()), &[&10])
            .unwrap();

        let modifications: Vec<Modification<String, i64>> =
            vec![("a".to_string(), OrigValue::Tracked(Some(10)), Some(40))];
        let snapshot = registry.snapshot("total", &modifications).unwrap();
        let total = snapshot.as_any().downcast_ref::<RunningTotal>().unwrap();
        assert_eq!(total.sum, 40);

        // The committed-side view is untouched by the snapshot's replay.
        let committed_snapshot = registry.snapshot::<String>("total", &[]).unwrap();
        let committed_total = committed_snapshot.as_any().downcast_ref::<RunningTotal>().unwrap();
        assert_eq!(committed_total.sum, 10);
    }

    #[test]
    fn audit_reports_a_divergent_view() {
        let registry: TrackedViewRegistry<i64> = TrackedViewRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .register(&store_id, "total", Box::new(RunningTotal::default()), &[&10])
            .unwrap();

        assert!(registry.audit(&store_id, &[&10]).is_ok());
        let err = registry.audit(&store_id, &[&10, &5]).unwrap_err();
        assert!(matches!(err, JacisError::TrackedViewFailure { .. }));
    }
}
