//! The store engine: composes the committed store, index registry, and
//! tracked-view registry behind the public store API, and runs the
//! two-phase commit protocol (Section 4.6).

use crate::index::IndexRegistry;
use crate::index::{Modification, NonUniqueIndex, NonUniqueMultiIndex, UniqueIndex};
use crate::tracked_view::{TrackedView, TrackedViewRegistry};
use crate::transactional::TransactionalStore;
use dashmap::DashMap;
use jacis_concurrency::{TransactionHandle, TxView, TxViewPolicy};
use jacis_core::adapter::ValueAdapter;
use jacis_core::error::{debug_key, JacisError, JacisResult};
use jacis_core::ids::{StoreId, TxId, Version};
use jacis_core::listener::{ModificationListener, PersistenceAdapter};
use jacis_core::StoreSpec;
use jacis_storage::CommittedStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Diagnostic snapshot of one key's state in one transaction, returned by
/// `StoreEngine::get_object_info`.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    /// Version observed at first touch.
    pub orig_version: Version,
    /// Whether the application has called `update`/`remove` on this key.
    pub updated: bool,
    /// Whether the application performed a locking read.
    pub read_locked: bool,
    /// Whether prepare has already flagged this entry as stale.
    pub stale: bool,
}

struct PendingInstall<K, C, W> {
    key: K,
    old_committed: Option<C>,
    new_committed: Option<C>,
    old_writable: Option<W>,
    new_writable: Option<W>,
}

/// A single store: `K` keys mapping to values managed through adapter `A`.
pub struct StoreEngine<K, A: ValueAdapter> {
    spec: StoreSpec<K, A>,
    committed: Arc<CommittedStore<K, A::Committed>>,
    tx_views: DashMap<TxId, Arc<TxView<K, A>>>,
    locks: DashMap<TxId, Vec<K>>,
    prepared: DashMap<TxId, Vec<PendingInstall<K, A::Committed, A::Writable>>>,
    indexes: IndexRegistry<K, A::Writable>,
    tracked_views: TrackedViewRegistry<A::Writable>,
    listeners: RwLock<Vec<Arc<dyn ModificationListener<K, A::Committed>>>>,
}

impl<K, A> StoreEngine<K, A>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: ValueAdapter + 'static,
    A::Writable: Clone,
    A::Committed: Clone,
{
    /// Create a store from `spec`, restoring committed state from its
    /// persistence adapter (if any) before accepting transactions.
    pub fn new(spec: StoreSpec<K, A>) -> Self {
        let committed = Arc::new(CommittedStore::new(spec.name.clone()));
        if let Some(adapter) = spec.persistence_adapter.as_ref() {
            for (key, value) in adapter.initialize_store() {
                committed.seed(key, value, Version::INITIAL.next());
            }
        }
        StoreEngine {
            spec,
            committed,
            tx_views: DashMap::new(),
            locks: DashMap::new(),
            prepared: DashMap::new(),
            indexes: IndexRegistry::new(),
            tracked_views: TrackedViewRegistry::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// This store's identity.
    pub fn store_id(&self) -> &StoreId {
        &self.spec.name
    }

    fn policy(&self) -> TxViewPolicy {
        TxViewPolicy {
            track_original_value: self.spec.track_original_value,
            alias_read_only: true,
        }
    }

    fn view_for(&self, tx: &TransactionHandle) -> Arc<TxView<K, A>> {
        let view = self
            .tx_views
            .entry(tx.tx_id())
            .or_insert_with(|| {
                Arc::new(TxView::new(
                    tx.tx_id(),
                    self.spec.value_adapter.clone(),
                    self.committed.clone(),
                    self.policy(),
                ))
            })
            .clone();
        tx.register_store(self.spec.name.clone());
        view
    }

    /// `tx`'s own pending modifications, for overlaying onto a committed
    /// snapshot (index reads, tracked-view reads). Empty if `tx` has not
    /// touched this store.
    fn tx_modifications(&self, tx: &TransactionHandle) -> Vec<Modification<K, A::Writable>> {
        match self.tx_views.get(&tx.tx_id()) {
            Some(view) => view.modified_entries(),
            None => Vec::new(),
        }
    }

    fn committed_to_writable(&self, key: &K) -> Option<A::Writable> {
        self.committed
            .current(key)
            .value
            .as_ref()
            .map(|v| self.spec.value_adapter.committed_to_writable(v))
    }

    // -- Store API (Section 6) -------------------------------------------

    /// `get(key)`.
    pub fn get(&self, tx: &TransactionHandle, key: &K) -> Option<A::Writable> {
        self.view_for(tx).get(key)
    }

    /// `getReadOnly(key)`.
    pub fn get_read_only(&self, tx: &TransactionHandle, key: &K) -> JacisResult<Option<A::Writable>> {
        if self.spec.strict_read_only && !self.spec.value_adapter.supports_read_only() {
            return Err(JacisError::ReadOnlyNotSupported {
                store_id: self.spec.name.clone(),
            });
        }
        Ok(self.view_for(tx).get_read_only(key))
    }

    /// `lockReadOnly(key)`.
    pub fn lock_read_only(&self, tx: &TransactionHandle, key: &K) -> Option<A::Writable> {
        self.view_for(tx).lock_read_only(key)
    }

    /// `update(key, value)`.
    pub fn update(&self, tx: &TransactionHandle, key: &K, value: A::Writable) {
        self.view_for(tx).update(key, value);
    }

    /// Scoped mutable access to a key's working copy: touches the committed
    /// store if needed, then runs `f` against a guard whose `DerefMut` marks
    /// the entry `updated`, mirroring the source API's implicit
    /// same-object-identity mutation (Section 4.3) without handing out a
    /// borrow tied to a temporary `Arc<TxView>`.
    pub fn update_in_place<R>(&self, tx: &TransactionHandle, key: &K, f: impl FnOnce(&mut Option<A::Writable>) -> R) -> R {
        let view = self.view_for(tx);
        let mut guard = view.get_for_update(key);
        f(&mut guard)
    }

    /// `remove(key)`.
    pub fn remove(&self, tx: &TransactionHandle, key: &K) {
        self.view_for(tx).remove(key);
    }

    /// `refresh(key)`.
    pub fn refresh(&self, tx: &TransactionHandle, key: &K) -> bool {
        self.view_for(tx).refresh(key)
    }

    /// `containsKey(key)`.
    pub fn contains_key(&self, tx: &TransactionHandle, key: &K) -> bool {
        self.view_for(tx).contains_key(key)
    }

    /// `size()`: committed, non-tombstone key count.
    pub fn size(&self) -> usize {
        self.committed.len()
    }

    /// `clear()`: drop all committed state. Only safe with no transactions
    /// outstanding against this store.
    pub fn clear(&self) {
        self.committed.clear();
    }

    /// `stream()`: every key visible to `tx`, with its effective value.
    pub fn stream(&self, tx: &TransactionHandle) -> Vec<(K, A::Writable)> {
        let view = self.view_for(tx);
        view.effective_keys()
            .into_iter()
            .filter_map(|k| {
                let v = view.get(&k);
                v.map(|v| (k, v))
            })
            .collect()
    }

    /// `streamReadOnly()`: a non-transactional, committed-only snapshot.
    pub fn stream_read_only(&self) -> Vec<(K, A::Writable)> {
        self.committed
            .snapshot_read_only()
            .into_iter()
            .map(|(k, v)| (k, self.spec.value_adapter.committed_to_writable(&v)))
            .collect()
    }

    /// `collect(predicate)`: `stream` filtered by a predicate over the
    /// effective value.
    pub fn collect(&self, tx: &TransactionHandle, predicate: impl Fn(&A::Writable) -> bool) -> Vec<(K, A::Writable)> {
        self.stream(tx).into_iter().filter(|(_, v)| predicate(v)).collect()
    }

    /// `getCommittedValue(key)`: bypasses the TxView entirely.
    pub fn get_committed_value(&self, key: &K) -> Option<A::Writable> {
        self.committed_to_writable(key)
    }

    /// `getTransactionStartValue(key)`: the value this transaction observed
    /// at first touch, if the store tracks originals.
    pub fn get_transaction_start_value(&self, tx: &TransactionHandle, key: &K) -> Option<A::Writable> {
        let view = self.tx_views.get(&tx.tx_id())?;
        view.touched_entries()
            .into_iter()
            .find(|(k, ..)| k == key)
            .and_then(|(_, orig, ..)| orig.as_ref().cloned().flatten())
    }

    /// `getReadOnlySnapshot()`: alias of `streamReadOnly`.
    pub fn get_read_only_snapshot(&self) -> Vec<(K, A::Writable)> {
        self.stream_read_only()
    }

    /// `getObjectInfo(key)`: diagnostic view of this transaction's entry.
    pub fn get_object_info(&self, tx: &TransactionHandle, key: &K) -> Option<ObjectInfo> {
        let view = self.tx_views.get(&tx.tx_id())?;
        view.entry_info(key).map(|(orig_version, updated, read_locked, stale)| ObjectInfo {
            orig_version,
            updated,
            read_locked,
            stale,
        })
    }

    /// `initStoreNonTransactional(objects, keyExtractor, parallelism)`:
    /// bulk-seed the committed store before any transaction has touched it,
    /// treating each object directly as its own committed representation.
    pub fn init_store_non_transactional(
        &self,
        objects: Vec<A::Committed>,
        key_extractor: impl Fn(&A::Committed) -> K + Send + Sync,
        parallelism: usize,
    ) where
        A::Committed: Send,
    {
        self.init_store_non_transactional_with(objects, key_extractor, |v| v, parallelism);
    }

    /// `initStoreNonTransactional(objects, keyExtractor, valueExtractor,
    /// parallelism)`: as `init_store_non_transactional`, with an explicit
    /// per-object conversion into the committed representation. Objects are
    /// split into `parallelism` chunks (minimum 1) and seeded from that many
    /// scoped threads at once, since seeding only ever inserts into the
    /// committed store's `DashMap` and never touches a `TxView`.
    pub fn init_store_non_transactional_with<T: Send>(
        &self,
        objects: Vec<T>,
        key_extractor: impl Fn(&T) -> K + Sync,
        value_extractor: impl Fn(T) -> A::Committed + Sync,
        parallelism: usize,
    ) {
        if objects.is_empty() {
            return;
        }
        let version = Version::INITIAL.next();
        let parallelism = parallelism.max(1).min(objects.len());
        let chunk_size = objects.len().div_ceil(parallelism);
        let committed = &self.committed;
        let key_extractor = &key_extractor;
        let value_extractor = &value_extractor;
        let mut remaining = objects;
        std::thread::scope(|scope| {
            while !remaining.is_empty() {
                let take = chunk_size.min(remaining.len());
                let chunk: Vec<T> = remaining.drain(..take).collect();
                scope.spawn(move || {
                    for object in chunk {
                        let key = key_extractor(&object);
                        let value = value_extractor(object);
                        committed.seed(key, value, version);
                    }
                });
            }
        });
    }

    /// `registerModificationListener(listener)`.
    pub fn register_modification_listener(&self, listener: Arc<dyn ModificationListener<K, A::Committed>>) {
        self.listeners.write().push(listener);
    }

    /// `getTrackedViewRegistry()`.
    pub fn tracked_view_registry(&self) -> &TrackedViewRegistry<A::Writable> {
        &self.tracked_views
    }

    /// Register a tracked view, seeded from the current committed snapshot.
    pub fn register_tracked_view(&self, name: impl Into<String>, view: Box<dyn TrackedView<A::Writable>>) -> JacisResult<()> {
        let snapshot = self.stream_read_only();
        let refs: Vec<&A::Writable> = snapshot.iter().map(|(_, v)| v).collect();
        self.tracked_views.register(&self.spec.name, name, view, &refs)
    }

    /// `getTrackedView(tx, name)`: the named view's committed state with
    /// `tx`'s own pending modifications folded on top, so a transaction that
    /// has updated or added keys sees its own effect reflected immediately,
    /// while a second transaction reading the same view still sees only the
    /// committed total.
    pub fn get_tracked_view(&self, tx: &TransactionHandle, name: &str) -> Option<Box<dyn TrackedView<A::Writable>>> {
        self.tracked_views.snapshot(name, &self.tx_modifications(tx))
    }

    /// `createUniqueIndex(name, extractor)`.
    pub fn create_unique_index<S>(
        &self,
        name: &str,
        extractor: impl Fn(&A::Writable) -> S + Send + Sync + 'static,
    ) -> JacisResult<Arc<UniqueIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let snapshot = self.stream_read_only();
        self.indexes.create_unique(&self.spec.name, name, extractor, &snapshot)
    }

    /// `getUniqueIndex(name)`.
    pub fn get_unique_index<S>(&self, name: &str) -> Option<Arc<UniqueIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes.get(name)
    }

    /// `createNonUniqueIndex(name, extractor)`.
    pub fn create_non_unique_index<S>(
        &self,
        name: &str,
        extractor: impl Fn(&A::Writable) -> S + Send + Sync + 'static,
    ) -> JacisResult<Arc<NonUniqueIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let snapshot = self.stream_read_only();
        self.indexes.create_non_unique(name, extractor, &snapshot)
    }

    /// `getNonUniqueIndex(name)`.
    pub fn get_non_unique_index<S>(&self, name: &str) -> Option<Arc<NonUniqueIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes.get(name)
    }

    /// `createNonUniqueMultiIndex(name, extractor)`.
    pub fn create_non_unique_multi_index<S>(
        &self,
        name: &str,
        extractor: impl Fn(&A::Writable) -> Vec<S> + Send + Sync + 'static,
    ) -> JacisResult<Arc<NonUniqueMultiIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let snapshot = self.stream_read_only();
        self.indexes.create_non_unique_multi(name, extractor, &snapshot)
    }

    /// `getNonUniqueMultiIndex(name)`.
    pub fn get_non_unique_multi_index<S>(&self, name: &str) -> Option<Arc<NonUniqueMultiIndex<K, S, A::Writable>>>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes.get(name)
    }

    /// `index.get(secondary)` on the named unique index, overlaid with
    /// `tx`'s own pending modifications (spec.md §9's resolution of index
    /// reads in favor of the live TxView overlay). The tx-aware counterpart
    /// to `get_unique_index`, for callers that hold only a store and a
    /// transaction handle, not the index object itself. `None` if the index
    /// is unknown or no key is currently bound to `secondary`.
    pub fn unique_index_get<S>(&self, tx: &TransactionHandle, name: &str, secondary: &S) -> Option<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        let index: Arc<UniqueIndex<K, S, A::Writable>> = self.indexes.get(name)?;
        index.get_for_tx(secondary, &self.tx_modifications(tx))
    }

    /// `index.getReadOnly(secondary)` on the named unique index: committed
    /// only, bypassing any transaction's pending modifications.
    pub fn unique_index_get_read_only<S>(&self, name: &str, secondary: &S) -> Option<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes.get::<UniqueIndex<K, S, A::Writable>>(name)?.get(secondary)
    }

    /// `index.get(secondary)` on the named non-unique index, overlaid with
    /// `tx`'s own pending modifications.
    pub fn non_unique_index_get<S>(&self, tx: &TransactionHandle, name: &str, secondary: &S) -> HashSet<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        match self.indexes.get::<NonUniqueIndex<K, S, A::Writable>>(name) {
            Some(index) => index.get_for_tx(secondary, &self.tx_modifications(tx)),
            None => HashSet::new(),
        }
    }

    /// `index.getReadOnly(secondary)` on the named non-unique index:
    /// committed only, bypassing any transaction's pending modifications.
    pub fn non_unique_index_get_read_only<S>(&self, name: &str, secondary: &S) -> HashSet<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes
            .get::<NonUniqueIndex<K, S, A::Writable>>(name)
            .map(|index| index.get(secondary))
            .unwrap_or_default()
    }

    /// `index.get(secondary)` on the named non-unique-multi index, overlaid
    /// with `tx`'s own pending modifications.
    pub fn non_unique_multi_index_get<S>(&self, tx: &TransactionHandle, name: &str, secondary: &S) -> HashSet<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        match self.indexes.get::<NonUniqueMultiIndex<K, S, A::Writable>>(name) {
            Some(index) => index.get_for_tx(secondary, &self.tx_modifications(tx)),
            None => HashSet::new(),
        }
    }

    /// `index.getReadOnly(secondary)` on the named non-unique-multi index:
    /// committed only, bypassing any transaction's pending modifications.
    pub fn non_unique_multi_index_get_read_only<S>(&self, name: &str, secondary: &S) -> HashSet<K>
    where
        S: Eq + Hash + Clone + Send + Sync + 'static,
    {
        self.indexes
            .get::<NonUniqueMultiIndex<K, S, A::Writable>>(name)
            .map(|index| index.get(secondary))
            .unwrap_or_default()
    }
}

impl<K, A> TransactionalStore for StoreEngine<K, A>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: ValueAdapter + 'static,
    A::Writable: Clone,
    A::Committed: Clone,
{
    fn store_id(&self) -> &StoreId {
        &self.spec.name
    }

    fn capture_snapshot(&self, tx: &TransactionHandle) {
        let view = self.view_for(tx);
        for key in self.committed.present_keys() {
            view.get(&key);
        }
    }

    fn prepare(&self, tx: TxId) -> JacisResult<()> {
        let view = match self.tx_views.get(&tx) {
            Some(v) => v.clone(),
            None => return Ok(()),
        };

        if let Some(dirty_check) = self.spec.dirty_check.as_ref() {
            if self.spec.track_original_value {
                for (key, orig, current, updated, read_locked) in view.touched_entries() {
                    if updated || read_locked {
                        continue;
                    }
                    if let (Some(Some(orig_v)), Some(cur_v)) = (orig.as_ref(), current.as_ref()) {
                        if dirty_check(orig_v, cur_v) {
                            view.promote(&key);
                        }
                    }
                }
            }
        }

        let mut locked_keys = Vec::new();
        let mut pending = Vec::new();
        let result = (|| -> JacisResult<()> {
            for (key, orig_version, updated, _read_locked) in view.checked_entries() {
                self.committed.try_lock(&key, tx)?;
                locked_keys.push(key.clone());

                let current = self.committed.current(&key);
                if current.version != orig_version {
                    tracing::debug!(
                        store_id = %self.spec.name,
                        key = %debug_key(&key),
                        tx = %tx,
                        expected = %orig_version,
                        actual = %current.version,
                        "stale object detected at prepare"
                    );
                    return Err(JacisError::StaleObject {
                        store_id: self.spec.name.clone(),
                        key: debug_key(&key),
                        expected: orig_version,
                        actual: current.version,
                    });
                }

                if updated {
                    let new_writable = view.get(&key);
                    let old_committed = current.value.clone();
                    let mut new_committed = new_writable.as_ref().map(|w| self.spec.value_adapter.writable_to_committed(w));

                    for listener in self.listeners.read().iter() {
                        if let Some(nc) = new_committed.as_mut() {
                            listener.on_adjust_before_prepare(&key, old_committed.as_ref(), nc, tx);
                        }
                    }
                    for listener in self.listeners.read().iter() {
                        if let Some(nc) = new_committed.as_ref() {
                            listener
                                .on_prepare_modification(&key, old_committed.as_ref(), nc, tx)
                                .map_err(|reason| JacisError::ModificationVeto {
                                    store_id: self.spec.name.clone(),
                                    key: debug_key(&key),
                                    reason,
                                })?;
                        }
                    }

                    let adjusted_writable = new_committed.as_ref().map(|c| self.spec.value_adapter.committed_to_writable(c));
                    for maintainer in self.indexes.maintainers() {
                        maintainer.verify_unique(&self.spec.name, &key, adjusted_writable.as_ref())?;
                    }

                    let old_writable = old_committed.as_ref().map(|c| self.spec.value_adapter.committed_to_writable(c));
                    pending.push(PendingInstall {
                        key,
                        old_committed,
                        new_committed,
                        old_writable,
                        new_writable: adjusted_writable,
                    });
                }
            }
            Ok(())
        })();

        self.locks.insert(tx, locked_keys);

        result.map(|()| {
            self.prepared.insert(tx, pending);
        })
    }

    fn commit(&self, tx: TxId) -> JacisResult<()> {
        let pending = self.prepared.remove(&tx).map(|(_, v)| v).unwrap_or_default();

        for p in &pending {
            self.committed.install(&p.key, p.new_committed.clone(), tx)?;

            for maintainer in self.indexes.maintainers() {
                maintainer.apply(&p.key, p.old_writable.as_ref(), p.new_writable.as_ref());
            }
            self.tracked_views
                .apply_committed(&self.spec.name, p.old_writable.as_ref(), p.new_writable.as_ref())?;

            for listener in self.listeners.read().iter() {
                listener.on_modification(&p.key, p.old_committed.as_ref(), p.new_committed.as_ref(), tx);
            }
            if let Some(adapter) = self.spec.persistence_adapter.as_ref() {
                adapter.on_modification(&p.key, p.old_committed.as_ref(), p.new_committed.as_ref(), tx);
            }
        }

        if let Some((_, keys)) = self.locks.remove(&tx) {
            for key in keys {
                self.committed.unlock(&key, tx);
            }
        }
        if let Some((_, view)) = self.tx_views.remove(&tx) {
            view.discard();
        }

        if self.spec.check_views_on_commit {
            let snapshot = self.stream_read_only();
            let refs: Vec<&A::Writable> = snapshot.iter().map(|(_, v)| v).collect();
            self.tracked_views.audit(&self.spec.name, &refs)?;
        }

        if let Some(adapter) = self.spec.persistence_adapter.as_ref() {
            adapter.after_commit_for_store(tx);
        }

        Ok(())
    }

    fn rollback(&self, tx: TxId) -> JacisResult<()> {
        self.prepared.remove(&tx);
        if let Some((_, keys)) = self.locks.remove(&tx) {
            for key in keys {
                self.committed.unlock(&key, tx);
            }
        }
        if let Some((_, view)) = self.tx_views.remove(&tx) {
            view.discard();
        }
        for listener in self.listeners.read().iter() {
            listener.after_rollback(tx);
        }
        if let Some(adapter) = self.spec.persistence_adapter.as_ref() {
            adapter.after_rollback_for_store(tx);
        }
        Ok(())
    }

    fn clear(&self) {
        StoreEngine::clear(self);
    }
}
