//! Secondary indexes (Section 4.4 of the specification).
//!
//! Each index keeps only the *committed* binding in a `DashMap`; per-tx reads
//! recompute the effective binding by overlaying the reading transaction's
//! pending modifications on top of the committed map (see
//! `UniqueIndex::get_for_tx` and friends), per Section 4.4's "recomputed at
//! read time" contract — the index never keeps a separate tx-local copy of
//! its own state.

use dashmap::DashMap;
use jacis_concurrency::OrigValue;
use jacis_core::error::{JacisError, JacisResult};
use jacis_core::ids::StoreId;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// One `(key, orig_value, new_value)` triple from a `TxView`'s pending
/// modifications, as returned by `TxView::modified_entries`.
pub type Modification<K, V> = (K, OrigValue<V>, Option<V>);

/// Non-generic-over-secondary-key seam letting `StoreEngine` dispatch unique
/// checks and commit maintenance across an arbitrary set of indexes without
/// knowing each one's secondary-key type.
pub trait IndexMaintainer<K, V>: Send + Sync {
    /// The index's name, as given to `create_*_index`.
    fn name(&self) -> &str;

    /// Raise `UniqueIndexViolation` if installing `new` for `key` would
    /// collide with a different key already bound to the same secondary key.
    /// No-op for non-unique indexes.
    fn verify_unique(&self, store_id: &StoreId, key: &K, new: Option<&V>) -> JacisResult<()>;

    /// Apply a committed mutation: remove `old`'s bindings, install `new`'s.
    fn apply(&self, key: &K, old: Option<&V>, new: Option<&V>);

    /// Rebuild (or extend) the index from the current committed snapshot.
    /// Used at `create_*_index` time.
    fn seed(&self, key: &K, value: &V) -> JacisResult<()>;
}

/// `extractor(value) -> secondary key`, one primary key per secondary key.
pub struct UniqueIndex<K, S, V> {
    name: String,
    committed: DashMap<S, K>,
    extractor: Arc<dyn Fn(&V) -> S + Send + Sync>,
}

impl<K, S, V> UniqueIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty index with the given name and extractor.
    pub fn new(name: impl Into<String>, extractor: impl Fn(&V) -> S + Send + Sync + 'static) -> Self {
        UniqueIndex {
            name: name.into(),
            committed: DashMap::new(),
            extractor: Arc::new(extractor),
        }
    }

    /// Committed-only lookup (the `getReadOnly` index variant).
    pub fn get(&self, secondary: &S) -> Option<K> {
        self.committed.get(secondary).map(|e| e.clone())
    }

    /// Lookup overlaid with a transaction's pending modifications (the
    /// `get` index variant, reflecting the reading transaction's view).
    pub fn get_for_tx(&self, secondary: &S, modifications: &[Modification<K, V>]) -> Option<K> {
        let mut result = self.get(secondary);
        for (key, orig, _new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                if (self.extractor)(old_v) == *secondary && result.as_ref() == Some(key) {
                    result = None;
                }
            }
        }
        for (key, _, new) in modifications {
            if let Some(v) = new {
                if (self.extractor)(v) == *secondary {
                    result = Some(key.clone());
                }
            }
        }
        result
    }

    /// All committed `(secondary, primary)` bindings.
    pub fn stream(&self) -> Vec<(S, K)> {
        self.committed.iter().map(|e| (e.key().clone(), e.value().clone())).collect()
    }

    /// `stream`, overlaid with a transaction's pending modifications.
    pub fn stream_for_tx(&self, modifications: &[Modification<K, V>]) -> Vec<(S, K)> {
        let mut result: HashMap<S, K> = self.committed.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        for (key, orig, _new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                let secondary = (self.extractor)(old_v);
                if result.get(&secondary) == Some(key) {
                    result.remove(&secondary);
                }
            }
        }
        for (key, _, new) in modifications {
            if let Some(v) = new {
                result.insert((self.extractor)(v), key.clone());
            }
        }
        result.into_iter().collect()
    }

    /// Committed-only lookup of several secondary keys at once.
    pub fn multi_get(&self, secondaries: &[S]) -> HashMap<S, K> {
        secondaries.iter().filter_map(|s| self.get(s).map(|k| (s.clone(), k))).collect()
    }

    /// `multi_get`, overlaid with a transaction's pending modifications.
    pub fn multi_get_for_tx(&self, secondaries: &[S], modifications: &[Modification<K, V>]) -> HashMap<S, K> {
        secondaries
            .iter()
            .filter_map(|s| self.get_for_tx(s, modifications).map(|k| (s.clone(), k)))
            .collect()
    }
}

impl<K, S, V> IndexMaintainer<K, V> for UniqueIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn verify_unique(&self, store_id: &StoreId, key: &K, new: Option<&V>) -> JacisResult<()> {
        if let Some(v) = new {
            let secondary = (self.extractor)(v);
            if let Some(holder) = self.committed.get(&secondary) {
                if *holder != *key {
                    return Err(JacisError::UniqueIndexViolation {
                        store_id: store_id.clone(),
                        index_name: self.name.clone(),
                        key: format!("{key:?}"),
                    });
                }
            }
        }
        Ok(())
    }

    fn apply(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        if let Some(v) = old {
            let secondary = (self.extractor)(v);
            self.committed.remove_if(&secondary, |_, k| k == key);
        }
        if let Some(v) = new {
            let secondary = (self.extractor)(v);
            self.committed.insert(secondary, key.clone());
        }
    }

    fn seed(&self, key: &K, value: &V) -> JacisResult<()> {
        self.apply(key, None, Some(value));
        Ok(())
    }
}

/// `extractor(value) -> secondary key`, many primary keys per secondary key.
pub struct NonUniqueIndex<K, S, V> {
    name: String,
    committed: DashMap<S, HashSet<K>>,
    extractor: Arc<dyn Fn(&V) -> S + Send + Sync>,
}

impl<K, S, V> NonUniqueIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty index with the given name and extractor.
    pub fn new(name: impl Into<String>, extractor: impl Fn(&V) -> S + Send + Sync + 'static) -> Self {
        NonUniqueIndex {
            name: name.into(),
            committed: DashMap::new(),
            extractor: Arc::new(extractor),
        }
    }

    /// Committed-only lookup.
    pub fn get(&self, secondary: &S) -> HashSet<K> {
        self.committed.get(secondary).map(|e| e.clone()).unwrap_or_default()
    }

    /// Lookup overlaid with a transaction's pending modifications.
    pub fn get_for_tx(&self, secondary: &S, modifications: &[Modification<K, V>]) -> HashSet<K> {
        let mut result = self.get(secondary);
        for (key, orig, new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                if (self.extractor)(old_v) == *secondary {
                    result.remove(key);
                }
            }
            if let Some(v) = new {
                if (self.extractor)(v) == *secondary {
                    result.insert(key.clone());
                }
            }
        }
        result
    }

    /// All committed `(secondary, primary)` bindings, flattened.
    pub fn stream(&self) -> Vec<(S, K)> {
        self.committed
            .iter()
            .flat_map(|e| e.value().iter().map(|k| (e.key().clone(), k.clone())).collect::<Vec<_>>())
            .collect()
    }

    /// `stream`, overlaid with a transaction's pending modifications.
    pub fn stream_for_tx(&self, modifications: &[Modification<K, V>]) -> Vec<(S, K)> {
        let mut result: HashMap<S, HashSet<K>> = self
            .committed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (key, orig, new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                let secondary = (self.extractor)(old_v);
                if let Some(set) = result.get_mut(&secondary) {
                    set.remove(key);
                }
            }
            if let Some(v) = new {
                result.entry((self.extractor)(v)).or_default().insert(key.clone());
            }
        }
        result
            .into_iter()
            .flat_map(|(s, ks)| ks.into_iter().map(move |k| (s.clone(), k)).collect::<Vec<_>>())
            .collect()
    }

    /// Committed-only lookup of several secondary keys at once.
    pub fn multi_get(&self, secondaries: &[S]) -> HashMap<S, HashSet<K>> {
        secondaries.iter().map(|s| (s.clone(), self.get(s))).collect()
    }

    /// `multi_get`, overlaid with a transaction's pending modifications.
    pub fn multi_get_for_tx(&self, secondaries: &[S], modifications: &[Modification<K, V>]) -> HashMap<S, HashSet<K>> {
        secondaries.iter().map(|s| (s.clone(), self.get_for_tx(s, modifications))).collect()
    }
}

impl<K, S, V> IndexMaintainer<K, V> for NonUniqueIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn verify_unique(&self, _store_id: &StoreId, _key: &K, _new: Option<&V>) -> JacisResult<()> {
        Ok(())
    }

    fn apply(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        if let Some(v) = old {
            let secondary = (self.extractor)(v);
            if let Some(mut set) = self.committed.get_mut(&secondary) {
                set.remove(key);
            }
        }
        if let Some(v) = new {
            let secondary = (self.extractor)(v);
            self.committed.entry(secondary).or_default().insert(key.clone());
        }
    }

    fn seed(&self, key: &K, value: &V) -> JacisResult<()> {
        self.apply(key, None, Some(value));
        Ok(())
    }
}

/// `extractor(value) -> Vec<secondary key>`, a value may be indexed under
/// several secondary keys at once (Section 4.4's "non-unique-multi").
pub struct NonUniqueMultiIndex<K, S, V> {
    name: String,
    committed: DashMap<S, HashSet<K>>,
    extractor: Arc<dyn Fn(&V) -> Vec<S> + Send + Sync>,
}

impl<K, S, V> NonUniqueMultiIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty index with the given name and multi-valued extractor.
    pub fn new(name: impl Into<String>, extractor: impl Fn(&V) -> Vec<S> + Send + Sync + 'static) -> Self {
        NonUniqueMultiIndex {
            name: name.into(),
            committed: DashMap::new(),
            extractor: Arc::new(extractor),
        }
    }

    /// Committed-only lookup.
    pub fn get(&self, secondary: &S) -> HashSet<K> {
        self.committed.get(secondary).map(|e| e.clone()).unwrap_or_default()
    }

    /// Lookup overlaid with a transaction's pending modifications.
    pub fn get_for_tx(&self, secondary: &S, modifications: &[Modification<K, V>]) -> HashSet<K> {
        let mut result = self.get(secondary);
        for (key, orig, new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                if (self.extractor)(old_v).contains(secondary) {
                    result.remove(key);
                }
            }
            if let Some(v) = new {
                if (self.extractor)(v).contains(secondary) {
                    result.insert(key.clone());
                }
            }
        }
        result
    }

    /// All committed `(secondary, primary)` bindings, flattened.
    pub fn stream(&self) -> Vec<(S, K)> {
        self.committed
            .iter()
            .flat_map(|e| e.value().iter().map(|k| (e.key().clone(), k.clone())).collect::<Vec<_>>())
            .collect()
    }

    /// `stream`, overlaid with a transaction's pending modifications.
    pub fn stream_for_tx(&self, modifications: &[Modification<K, V>]) -> Vec<(S, K)> {
        let mut result: HashMap<S, HashSet<K>> = self
            .committed
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (key, orig, new) in modifications {
            if let Some(Some(old_v)) = orig.as_ref() {
                for secondary in (self.extractor)(old_v) {
                    if let Some(set) = result.get_mut(&secondary) {
                        set.remove(key);
                    }
                }
            }
            if let Some(v) = new {
                for secondary in (self.extractor)(v) {
                    result.entry(secondary).or_default().insert(key.clone());
                }
            }
        }
        result
            .into_iter()
            .flat_map(|(s, ks)| ks.into_iter().map(move |k| (s.clone(), k)).collect::<Vec<_>>())
            .collect()
    }

    /// Committed-only lookup of several secondary keys at once.
    pub fn multi_get(&self, secondaries: &[S]) -> HashMap<S, HashSet<K>> {
        secondaries.iter().map(|s| (s.clone(), self.get(s))).collect()
    }

    /// `multi_get`, overlaid with a transaction's pending modifications.
    pub fn multi_get_for_tx(&self, secondaries: &[S], modifications: &[Modification<K, V>]) -> HashMap<S, HashSet<K>> {
        secondaries.iter().map(|s| (s.clone(), self.get_for_tx(s, modifications))).collect()
    }
}

impl<K, S, V> IndexMaintainer<K, V> for NonUniqueMultiIndex<K, S, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    S: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn verify_unique(&self, _store_id: &StoreId, _key: &K, _new: Option<&V>) -> JacisResult<()> {
        Ok(())
    }

    fn apply(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        if let Some(v) = old {
            for secondary in (self.extractor)(v) {
                if let Some(mut set) = self.committed.get_mut(&secondary) {
                    set.remove(key);
                }
            }
        }
        if let Some(v) = new {
            for secondary in (self.extractor)(v) {
                self.committed.entry(secondary).or_default().insert(key.clone());
            }
        }
    }

    fn seed(&self, key: &K, value: &V) -> JacisResult<()> {
        self.apply(key, None, Some(value));
        Ok(())
    }
}

/// All indexes registered on one store.
///
/// Keeps two views of the same index objects: a name-keyed, type-erased map
/// for `get_*_index` (callers know the concrete `S`/index-kind they asked
/// for and downcast), and a `TxId`-free `IndexMaintainer` list the commit
/// protocol drives without needing to know any index's secondary-key type —
/// the same type-erasure seam `StoreEngine`/`TransactionalStore` use for the
/// container.
#[derive(Default)]
pub struct IndexRegistry<K, V> {
    by_name: DashMap<String, Arc<dyn Any + Send + Sync>>,
    maintainers: DashMap<String, Arc<dyn IndexMaintainer<K, V>>>,
}

impl<K, V> IndexRegistry<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// A fresh, empty registry.
    pub fn new() -> Self {
        IndexRegistry {
            by_name: DashMap::new(),
            maintainers: DashMap::new(),
        }
    }

    fn insert<S, I>(&self, name: &str, index: Arc<I>) -> JacisResult<()>
    where
        S: 'static,
        I: IndexMaintainer<K, V> + Any + Send + Sync + 'static,
    {
        if self.by_name.contains_key(name) {
            return Err(JacisError::Internal(format!("index '{name}' already exists")));
        }
        self.by_name.insert(name.to_string(), index.clone() as Arc<dyn Any + Send + Sync>);
        self.maintainers.insert(name.to_string(), index as Arc<dyn IndexMaintainer<K, V>>);
        Ok(())
    }

    /// Register a unique index, seeding it from `committed_snapshot`.
    /// Fails if the name is taken or a seeded value collides.
    pub fn create_unique<S>(
        &self,
        store_id: &StoreId,
        name: &str,
        extractor: impl Fn(&V) -> S + Send + Sync + 'static,
        committed_snapshot: &[(K, V)],
    ) -> JacisResult<Arc<UniqueIndex<K, S, V>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let index = Arc::new(UniqueIndex::new(name, extractor));
        for (key, value) in committed_snapshot {
            index.verify_unique(store_id, key, Some(value))?;
            index.apply(key, None, Some(value));
        }
        self.insert::<S, _>(name, index.clone())?;
        Ok(index)
    }

    /// Register a non-unique index, seeding it from `committed_snapshot`.
    pub fn create_non_unique<S>(
        &self,
        name: &str,
        extractor: impl Fn(&V) -> S + Send + Sync + 'static,
        committed_snapshot: &[(K, V)],
    ) -> JacisResult<Arc<NonUniqueIndex<K, S, V>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let index = Arc::new(NonUniqueIndex::new(name, extractor));
        for (key, value) in committed_snapshot {
            index.apply(key, None, Some(value));
        }
        self.insert::<S, _>(name, index.clone())?;
        Ok(index)
    }

    /// Register a non-unique-multi index, seeding it from
    /// `committed_snapshot`.
    pub fn create_non_unique_multi<S>(
        &self,
        name: &str,
        extractor: impl Fn(&V) -> Vec<S> + Send + Sync + 'static,
        committed_snapshot: &[(K, V)],
    ) -> JacisResult<Arc<NonUniqueMultiIndex<K, S, V>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let index = Arc::new(NonUniqueMultiIndex::new(name, extractor));
        for (key, value) in committed_snapshot {
            index.apply(key, None, Some(value));
        }
        self.insert::<S, _>(name, index.clone())?;
        Ok(index)
    }

    /// Fetch a previously created index by name and downcast it to the
    /// caller's expected concrete type.
    pub fn get<I: Any + Send + Sync + 'static>(&self, name: &str) -> Option<Arc<I>> {
        self.by_name.get(name)?.value().clone().downcast::<I>().ok()
    }

    /// Every registered index's maintenance seam, for the commit protocol.
    pub fn maintainers(&self) -> Vec<Arc<dyn IndexMaintainer<K, V>>> {
        self.maintainers.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct Account {
        email: String,
        tags: Vec<String>,
    }

    #[test]
    fn unique_index_seeds_from_committed_snapshot() {
        let snapshot = vec![(
            "1".to_string(),
            Account {
                email: "a@example.com".to_string(),
                tags: vec![],
            },
        )];
        let index = UniqueIndex::new("by_email", |a: &Account| a.email.clone());
        for (key, value) in &snapshot {
            index.seed(key, value).unwrap();
        }
        assert_eq!(index.get(&"a@example.com".to_string()), Some("1".to_string()));
    }

    #[test]
    fn unique_index_rejects_a_colliding_insert() {
        let index: UniqueIndex<String, String, Account> = UniqueIndex::new("by_email", |a| a.email.clone());
        let store_id = StoreId::new("accounts");
        let a = Account {
            email: "dup@example.com".to_string(),
            tags: vec![],
        };
        index.verify_unique(&store_id, &"1".to_string(), Some(&a)).unwrap();
        index.apply(&"1".to_string(), None, Some(&a));

        let err = index
            .verify_unique(&store_id, &"2".to_string(), Some(&a))
            .unwrap_err();
        assert!(matches!(err, JacisError::UniqueIndexViolation { .. }));

        // The same key re-installing its own binding is fine.
        index.verify_unique(&store_id, &"1".to_string(), Some(&a)).unwrap();
    }

    #[test]
    fn unique_index_get_for_tx_overlays_pending_modifications() {
        let index: UniqueIndex<String, String, Account> = UniqueIndex::new("by_email", |a| a.email.clone());
        let old = Account {
            email: "old@example.com".to_string(),
            tags: vec![],
        };
        index.apply(&"1".to_string(), None, Some(&old));

        let new = Account {
            email: "new@example.com".to_string(),
            tags: vec![],
        };
        let modifications: Vec<Modification<String, Account>> =
            vec![("1".to_string(), OrigValue::Tracked(Some(old.clone())), Some(new.clone()))];

        assert_eq!(index.get_for_tx(&"old@example.com".to_string(), &modifications), None);
        assert_eq!(
            index.get_for_tx(&"new@example.com".to_string(), &modifications),
            Some("1".to_string())
        );
        // Committed binding is unaffected until the modification actually commits.
        assert_eq!(index.get(&"old@example.com".to_string()), Some("1".to_string()));
    }

    #[test]
    fn unique_index_multi_get_batches_several_secondaries() {
        let index: UniqueIndex<String, String, Account> = UniqueIndex::new("by_email", |a| a.email.clone());
        index.apply(
            &"1".to_string(),
            None,
            Some(&Account {
                email: "a@example.com".to_string(),
                tags: vec![],
            }),
        );
        index.apply(
            &"2".to_string(),
            None,
            Some(&Account {
                email: "b@example.com".to_string(),
                tags: vec![],
            }),
        );
        let found = index.multi_get(&["a@example.com".to_string(), "missing@example.com".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(found.get("a@example.com"), Some(&"1".to_string()));
    }

    #[test]
    fn non_unique_index_stream_flattens_every_binding() {
        let index: NonUniqueIndex<String, String, Account> = NonUniqueIndex::new("by_domain", |a| {
            a.email.split('@').nth(1).unwrap_or_default().to_string()
        });
        index.apply(
            &"1".to_string(),
            None,
            Some(&Account {
                email: "a@example.com".to_string(),
                tags: vec![],
            }),
        );
        let mut bindings = index.stream();
        bindings.sort();
        assert_eq!(bindings, vec![("example.com".to_string(), "1".to_string())]);
    }

    #[test]
    fn non_unique_index_groups_multiple_keys_per_secondary() {
        let index: NonUniqueIndex<String, String, Account> = NonUniqueIndex::new("by_domain", |a| {
            a.email.split('@').nth(1).unwrap_or_default().to_string()
        });
        let a1 = Account {
            email: "a@example.com".to_string(),
            tags: vec![],
        };
        let a2 = Account {
            email: "b@example.com".to_string(),
            tags: vec![],
        };
        index.apply(&"1".to_string(), None, Some(&a1));
        index.apply(&"2".to_string(), None, Some(&a2));
        let mut keys: Vec<_> = index.get(&"example.com".to_string()).into_iter().collect();
        keys.sort();
        assert_eq!(keys, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn non_unique_multi_index_indexes_under_every_extracted_secondary() {
        let index: NonUniqueMultiIndex<String, String, Account> =
            NonUniqueMultiIndex::new("by_tag", |a| a.tags.clone());
        let a = Account {
            email: "a@example.com".to_string(),
            tags: vec!["vip".to_string(), "beta".to_string()],
        };
        index.apply(&"1".to_string(), None, Some(&a));
        assert_eq!(index.get(&"vip".to_string()), HashSet::from(["1".to_string()]));
        assert_eq!(index.get(&"beta".to_string()), HashSet::from(["1".to_string()]));

        index.apply(&"1".to_string(), Some(&a), None);
        assert!(index.get(&"vip".to_string()).is_empty());
    }

    #[test]
    fn registry_rejects_a_duplicate_index_name() {
        let registry: IndexRegistry<String, Account> = IndexRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .create_unique(&store_id, "by_email", |a: &Account| a.email.clone(), &[])
            .unwrap();
        let err = registry
            .create_non_unique("by_email", |a: &Account| a.email.clone(), &[])
            .unwrap_err();
        assert!(matches!(err, JacisError::Internal(_)));
    }

    #[test]
    fn registry_get_downcasts_to_the_requested_index_type() {
        let registry: IndexRegistry<String, Account> = IndexRegistry::new();
        let store_id = StoreId::new("accounts");
        registry
            .create_unique(&store_id, "by_email", |a: &Account| a.email.clone(), &[])
            .unwrap();
        let fetched = registry.get::<UniqueIndex<String, String, Account>>("by_email");
        assert!(fetched.is_some());
        assert_eq!(registry.maintainers().len(), 1);
    }
}
