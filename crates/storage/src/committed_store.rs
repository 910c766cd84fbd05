//! The committed store: a sharded, per-key-locked, versioned map.

use crate::entry::{CommittedEntry, TouchResult};
use dashmap::DashMap;
use jacis_core::error::{debug_key, JacisError, JacisResult};
use jacis_core::ids::{StoreId, TxId, Version};
use std::fmt::Debug;
use std::hash::Hash;

/// The committed store for one [`K`, `V`] store instance.
///
/// `V` here is always a `ValueAdapter::Committed` type. All three adapters
/// the core provides (`CloneValueAdapter`, `SerdeValueAdapter`,
/// `IdentityValueAdapter`) produce `Clone` committed representations — a
/// user clone-type, a byte buffer, or an `Arc` — so requiring `V: Clone`
/// here costs nothing at any real call site while keeping this type free of
/// adapter-specific logic.
///
/// Backed by `dashmap::DashMap`: a shard's read or write guard already gives
/// an atomic, torn-read-free view of one entry's `(value, version)` pair, so
/// readers that only need a consistent snapshot (`current`,
/// `snapshot_read_only`) never need the explicit version-recheck loop the
/// specification allows for lock-free implementations (Section 4.2,
/// Section 9's open question on this point is resolved in favor of
/// DashMap's shard locking, see `DESIGN.md`).
pub struct CommittedStore<K, V> {
    store_id: StoreId,
    entries: DashMap<K, CommittedEntry<V>>,
}

impl<K, V> CommittedStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty committed store for the given store id.
    pub fn new(store_id: StoreId) -> Self {
        CommittedStore {
            store_id,
            entries: DashMap::new(),
        }
    }

    /// Install an already-committed value at store creation time, bypassing
    /// locking entirely. Used for bulk init and persistence-adapter
    /// restoration, both of which happen before the store accepts
    /// transactions.
    pub fn seed(&self, key: K, value: V, version: Version) {
        self.entries.insert(
            key,
            CommittedEntry {
                value: Some(value),
                version,
                locked_for_tx: None,
                ref_count: 0,
            },
        );
    }

    /// `touch(key, tx)`: increments `ref_count` and returns the current
    /// committed value and version. Creates a fresh tombstone if the key
    /// does not yet exist.
    pub fn touch(&self, key: &K) -> TouchResult<V> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(CommittedEntry::fresh_tombstone);
        entry.ref_count += 1;
        TouchResult {
            value: entry.value.clone(),
            version: entry.version,
        }
    }

    /// `untouch(key, tx)`: decrements `ref_count`; if it reaches zero and
    /// the entry is an unlocked tombstone, removes it from the map.
    pub fn untouch(&self, key: &K) {
        let mut remove = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            remove = entry.is_collectible();
        }
        if remove {
            // Re-check under a fresh lookup: another thread may have
            // touched the key between releasing the guard above and here.
            self.entries.remove_if(key, |_, e| e.is_collectible());
        }
    }

    /// `tryLock(key, tx)`: sets `locked_for_tx = tx` if currently unset or
    /// already held by `tx`; otherwise fails with `LockContention`.
    pub fn try_lock(&self, key: &K, tx: TxId) -> JacisResult<()> {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(CommittedEntry::fresh_tombstone);
        match entry.locked_for_tx {
            None => {
                entry.locked_for_tx = Some(tx);
                Ok(())
            }
            Some(holder) if holder == tx => Ok(()),
            Some(holder) => {
                tracing::debug!(
                    store_id = %self.store_id,
                    key = %debug_key(key),
                    holder = %holder,
                    requester = %tx,
                    "lock contention on prepare"
                );
                Err(JacisError::LockContention {
                    store_id: self.store_id.clone(),
                    key: debug_key(key),
                    holder,
                })
            }
        }
    }

    /// `unlock(key, tx)`: clears `locked_for_tx` if held by `tx`.
    pub fn unlock(&self, key: &K, tx: TxId) {
        let mut remove = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.locked_for_tx == Some(tx) {
                entry.locked_for_tx = None;
            }
            remove = entry.is_collectible();
        }
        if remove {
            self.entries.remove_if(key, |_, e| e.is_collectible());
        }
    }

    /// `install(key, newValue, tx) -> newVersion`: precondition
    /// `locked_for_tx == Some(tx)`. Replaces the value and bumps the
    /// version. The lock is left held; the caller releases it later via
    /// `unlock`.
    pub fn install(&self, key: &K, new_value: Option<V>, tx: TxId) -> JacisResult<Version> {
        let mut entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| JacisError::Internal(format!("install on untouched key {key:?}")))?;
        if entry.locked_for_tx != Some(tx) {
            return Err(JacisError::Internal(format!(
                "install on key {key:?} without holding its lock"
            )));
        }
        entry.version = entry.version.next();
        entry.value = new_value;
        Ok(entry.version)
    }

    /// Current `(value, version)` for a key, without touching `ref_count`.
    /// Used for non-transactional reads (`getCommittedValue`,
    /// `getReadOnly` outside any transaction).
    pub fn current(&self, key: &K) -> TouchResult<V> {
        match self.entries.get(key) {
            Some(entry) => TouchResult {
                value: entry.value.clone(),
                version: entry.version,
            },
            None => TouchResult {
                value: None,
                version: Version::INITIAL,
            },
        }
    }

    /// A point-in-time snapshot of every present (non-tombstone) key and
    /// value. Built from a point-in-time copy of the key set followed by
    /// per-entry reads, per the specification's `snapshotReadOnly` contract
    /// — no global lock is held across the whole operation.
    pub fn snapshot_read_only(&self) -> Vec<(K, V)> {
        self.entries
            .iter()
            .filter_map(|entry| {
                entry
                    .value
                    .clone()
                    .map(|v| (entry.key().clone(), v))
            })
            .collect()
    }

    /// Number of present (non-tombstone) keys. Per the specification's
    /// design notes, the exact moment a tombstone disappears from this
    /// count after a remove-then-commit is an implementation detail, not a
    /// contract.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    /// Whether the store has no present keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, present or tombstone. Only safe to call when no
    /// transaction holds a TxView referencing this store.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// All keys that currently have a present value, for use by iteration
    /// helpers that need to union committed keys with a TxView's local
    /// overlay.
    pub fn present_keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|entry| entry.value.is_some())
            .map(|entry| entry.key().clone())
            .collect()
    }
}
