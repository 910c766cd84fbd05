//! The committed entry type (Section 3 of the specification).

use jacis_core::ids::{TxId, Version};

/// One key's state in the committed store.
///
/// Invariants (restated from the specification):
/// - `version` strictly increases whenever `value` changes.
/// - An entry with `value = None`, `ref_count == 0`, and
///   `locked_for_tx == None` is eligible for removal (a collectible
///   tombstone).
/// - `locked_for_tx` is cleared on commit-completion or rollback of that
///   transaction.
#[derive(Debug, Clone)]
pub struct CommittedEntry<V> {
    /// Current committed value. `None` represents a tombstone (the key is
    /// absent, but the entry is kept alive by in-flight readers).
    pub value: Option<V>,
    /// Monotonically non-decreasing version, incremented on every
    /// successful commit that touches this key.
    pub version: Version,
    /// The transaction currently holding the optimistic lock on this entry,
    /// if any. Set by `try_lock`, required by `install`, cleared by
    /// `unlock`.
    pub locked_for_tx: Option<TxId>,
    /// Number of live TxViews currently referencing this entry. Used only
    /// to decide whether an absent entry may be garbage collected; it is
    /// not consulted by `install` or locking.
    pub ref_count: u64,
}

impl<V> CommittedEntry<V> {
    /// A fresh tombstone: absent value, version 0, unlocked, one reference
    /// (the caller that is about to record it).
    pub fn fresh_tombstone() -> Self {
        CommittedEntry {
            value: None,
            version: Version::INITIAL,
            locked_for_tx: None,
            ref_count: 0,
        }
    }

    /// Whether this entry is an unreferenced, unlocked tombstone and can be
    /// physically removed from the map.
    pub fn is_collectible(&self) -> bool {
        self.value.is_none() && self.ref_count == 0 && self.locked_for_tx.is_none()
    }
}

/// Result of [`CommittedStore::touch`](crate::CommittedStore::touch): the
/// value and version observed at the moment of the touch.
#[derive(Debug, Clone)]
pub struct TouchResult<V> {
    /// The committed value at touch time, or `None` if the key is absent.
    pub value: Option<V>,
    /// The committed version at touch time.
    pub version: Version,
}
