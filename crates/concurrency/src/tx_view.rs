//! The per-(transaction, store) buffer (Section 4.3 of the specification).

use crate::tx_entry::{OrigValue, TxEntry};
use jacis_core::adapter::ValueAdapter;
use jacis_core::ids::{TxId, Version};
use jacis_storage::CommittedStore;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Policy knobs a `TxView` needs from its store's `StoreSpec`, decoupled
/// from the full spec type so this crate does not need to depend on every
/// adapter-specific piece of `jacis-core::StoreSpec`.
#[derive(Debug, Clone, Copy)]
pub struct TxViewPolicy {
    /// Mirrors `StoreSpec::track_original_value`.
    pub track_original_value: bool,
    /// Whether `get_read_only` may alias the committed side directly
    /// instead of recording a tx entry (Section 4.3: "is **not** stored as
    /// a tx entry if the store policy permits alias-sharing"). When `true`,
    /// repeated `get_read_only` calls for the same key may observe
    /// different, newer committed versions — the documented
    /// repeatable-read weakening.
    pub alias_read_only: bool,
}

impl Default for TxViewPolicy {
    fn default() -> Self {
        TxViewPolicy {
            track_original_value: false,
            alias_read_only: true,
        }
    }
}

/// The per-(transaction, store) view: a buffer of tx entries reconciled
/// against a shared [`CommittedStore`] on commit.
pub struct TxView<K, A: ValueAdapter> {
    tx_id: TxId,
    adapter: Arc<A>,
    committed: Arc<CommittedStore<K, A::Committed>>,
    policy: TxViewPolicy,
    entries: Mutex<HashMap<K, TxEntry<A::Writable>>>,
}

impl<K, A> TxView<K, A>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    A: ValueAdapter,
{
    /// Create a fresh, empty view for `tx_id` against `committed`.
    pub fn new(tx_id: TxId, adapter: Arc<A>, committed: Arc<CommittedStore<K, A::Committed>>, policy: TxViewPolicy) -> Self {
        TxView {
            tx_id,
            adapter,
            committed,
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The transaction this view belongs to.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    fn touch_entry(&self, entries: &mut HashMap<K, TxEntry<A::Writable>>, key: &K) {
        if !entries.contains_key(key) {
            let touched = self.committed.touch(key);
            let writable = touched
                .value
                .as_ref()
                .map(|v| self.adapter.committed_to_writable(v));
            entries.insert(
                key.clone(),
                TxEntry::from_touch(writable, touched.version, self.policy.track_original_value),
            );
        }
    }

    /// `get(key)`: materialize (if needed) and return a clone of the
    /// working copy. `None` means the effective value is absent.
    pub fn get(&self, key: &K) -> Option<A::Writable>
    where
        A::Writable: Clone,
    {
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        entries.get(key).and_then(|e| e.value.clone())
    }

    /// `getReadOnly(key)`: like `get`, but may skip recording a tx entry
    /// per `TxViewPolicy::alias_read_only`, and the returned value goes
    /// through the adapter's read-only conversions.
    pub fn get_read_only(&self, key: &K) -> Option<A::Writable> {
        if self.policy.alias_read_only {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(key) {
                return entry
                    .value
                    .as_ref()
                    .map(|v| self.adapter.writable_to_read_only(v));
            }
            drop(entries);
            let current = self.committed.current(key);
            return current
                .value
                .as_ref()
                .map(|v| self.adapter.committed_to_read_only(v));
        }
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        entries
            .get(key)
            .and_then(|e| e.value.as_ref())
            .map(|v| self.adapter.writable_to_read_only(v))
    }

    /// `lockReadOnly(key)`: like `getReadOnly`, but always records a tx
    /// entry with `read_locked = true`, so prepare validates no concurrent
    /// commit occurred on this key even though this transaction never
    /// writes it.
    pub fn lock_read_only(&self, key: &K) -> Option<A::Writable> {
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        let entry = entries.get_mut(key).expect("just touched");
        entry.read_locked = true;
        entry.value.as_ref().map(|v| self.adapter.writable_to_read_only(v))
    }

    /// `update(key, value)`: ensures a tx entry exists, sets its value, and
    /// marks it `updated`.
    pub fn update(&self, key: &K, value: A::Writable) {
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        let entry = entries.get_mut(key).expect("just touched");
        entry.value = Some(value);
        entry.updated = true;
    }

    /// `remove(key)`: as `update(key, absent)`.
    pub fn remove(&self, key: &K) {
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        let entry = entries.get_mut(key).expect("just touched");
        entry.value = None;
        entry.updated = true;
    }

    /// `refresh(key)`: discards the tx entry so the next access re-touches
    /// the committed store. Only legal when the entry is not `updated`;
    /// returns `false` (no-op) if it is, or if there is no entry to
    /// discard.
    pub fn refresh(&self, key: &K) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.updated => {
                entries.remove(key);
                self.committed.untouch(key);
                true
            }
            _ => false,
        }
    }

    /// `containsKey(key)`: true iff the effective value (tx-local override
    /// over committed) is present.
    pub fn contains_key(&self, key: &K) -> bool {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            return entry.value.is_some();
        }
        drop(entries);
        self.committed.current(key).value.is_some()
    }

    /// Acquire a mutable guard over this key's working copy, touching the
    /// committed store first if necessary. Every dereference through
    /// `DerefMut` marks the entry `updated`, which is the idiomatic-Rust
    /// substitute for the source API's implicit same-object-identity
    /// mutation (Section 4.3's repeated-`get`-identity invariant).
    pub fn get_for_update<'a>(&'a self, key: &K) -> TxEntryGuard<'a, K, A::Writable> {
        let mut entries = self.entries.lock();
        self.touch_entry(&mut entries, key);
        TxEntryGuard {
            entries,
            key: key.clone(),
        }
    }

    /// Effective key set: committed present keys unioned with tx-local
    /// keys, tx-local overrides taking precedence (so a tx-local remove
    /// excludes a committed key, and a tx-local add includes one the
    /// committed store doesn't have yet).
    pub fn effective_keys(&self) -> Vec<K> {
        let entries = self.entries.lock();
        let mut keys: Vec<K> = self
            .committed
            .present_keys()
            .into_iter()
            .filter(|k| !entries.contains_key(k) || entries[k].value.is_some())
            .collect();
        for (k, entry) in entries.iter() {
            if entry.value.is_some() && !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }

    /// Snapshot the entries this transaction has modified (`updated`), for
    /// use by the commit protocol and by tracked-view per-tx snapshots.
    /// Returns `(key, orig_value, new_value)` triples.
    pub fn modified_entries(&self) -> Vec<(K, OrigValue<A::Writable>, Option<A::Writable>)>
    where
        A::Writable: Clone,
    {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(_, e)| e.updated)
            .map(|(k, e)| (k.clone(), e.orig_value.clone(), e.value.clone()))
            .collect()
    }

    /// All entries touched or locked for read, for the prepare phase's
    /// stale-object check. Returns `(key, orig_version, updated,
    /// read_locked)`.
    pub fn checked_entries(&self) -> Vec<(K, Version, bool, bool)> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|(_, e)| e.updated || e.read_locked)
            .map(|(k, e)| (k.clone(), e.orig_version, e.updated, e.read_locked))
            .collect()
    }

    /// Mark a touched/locked entry stale (diagnostic bookkeeping only; the
    /// prepare call itself still returns the error immediately).
    pub fn mark_stale(&self, key: &K) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.stale = true;
        }
    }

    /// Promote an entry to `updated`, without changing its value. Used by
    /// the store engine's dirty-check pass (Section 4.6 step 2).
    pub fn promote(&self, key: &K) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.updated = true;
        }
    }

    /// Every touched entry, for the dirty-check pass: `(key, orig_value,
    /// current_value, updated, read_locked)`.
    pub fn touched_entries(&self) -> Vec<(K, OrigValue<A::Writable>, Option<A::Writable>, bool, bool)>
    where
        A::Writable: Clone,
    {
        let entries = self.entries.lock();
        entries
            .iter()
            .map(|(k, e)| (k.clone(), e.orig_value.clone(), e.value.clone(), e.updated, e.read_locked))
            .collect()
    }

    /// Diagnostic snapshot of one key's tx entry, for `getObjectInfo`.
    pub fn entry_info(&self, key: &K) -> Option<(Version, bool, bool, bool)> {
        let entries = self.entries.lock();
        entries.get(key).map(|e| (e.orig_version, e.updated, e.read_locked, e.stale))
    }

    /// Release every tx entry, decrementing the committed store's
    /// ref-count for each. Called once at the end of commit or rollback.
    pub fn discard(&self) {
        let mut entries = self.entries.lock();
        for key in entries.keys() {
            self.committed.untouch(key);
        }
        entries.clear();
    }

    /// Whether any entry in this view has been modified.
    pub fn has_pending_modifications(&self) -> bool {
        self.entries.lock().values().any(|e| e.updated)
    }
}

/// A guard over one key's tx-local working copy. Derefs (mutably) directly
/// onto the stored value; every `deref_mut` marks the entry `updated`.
pub struct TxEntryGuard<'a, K, W> {
    entries: MutexGuard<'a, HashMap<K, TxEntry<W>>>,
    key: K,
}

impl<'a, K: Eq + Hash, W> Deref for TxEntryGuard<'a, K, W> {
    type Target = Option<W>;

    fn deref(&self) -> &Option<W> {
        &self.entries.get(&self.key).expect("touched on construction").value
    }
}

impl<'a, K: Eq + Hash, W> DerefMut for TxEntryGuard<'a, K, W> {
    fn deref_mut(&mut self) -> &mut Option<W> {
        let entry = self.entries.get_mut(&self.key).expect("touched on construction");
        entry.updated = true;
        &mut entry.value
    }
}
