//! The per-key transactional entry (Section 3 of the specification).

use jacis_core::ids::Version;

/// Whether a tx entry's original-at-touch value is being tracked.
///
/// Tracking is a per-store option (`StoreSpec::track_original_value`)
/// because it costs an extra adapter conversion on every first touch; views
/// that never dirty-check or diff old/new values can skip it.
#[derive(Debug, Clone)]
pub enum OrigValue<W> {
    /// The store is not configured to track originals.
    NotTracked,
    /// The value observed at first touch. `None` means the key was absent
    /// at first touch.
    Tracked(Option<W>),
}

impl<W> OrigValue<W> {
    /// The tracked original, if tracking is enabled for this store.
    pub fn as_ref(&self) -> Option<&Option<W>> {
        match self {
            OrigValue::NotTracked => None,
            OrigValue::Tracked(v) => Some(v),
        }
    }
}

/// One key's state inside a single transaction's view.
///
/// A tx entry is created on first access (by `get`, `get_read_only` when
/// not aliasing, `lock_read_only`, or `update`) and lives until the owning
/// transaction ends or `refresh` discards it.
#[derive(Debug, Clone)]
pub struct TxEntry<W> {
    /// The working copy visible to this transaction. `None` represents a
    /// buffered remove (or a key that is still absent).
    pub value: Option<W>,
    /// Snapshot of the value at first touch, if the store tracks
    /// originals.
    pub orig_value: OrigValue<W>,
    /// Version of the committed entry observed at first touch.
    pub orig_version: Version,
    /// Set when the application called `update`/`remove` on this key.
    pub updated: bool,
    /// Set when the application performed a locking read
    /// (`lock_read_only`).
    pub read_locked: bool,
    /// Set during prepare if this entry would fail the stale-object check;
    /// kept for diagnostics (`getObjectInfo`) even though the prepare call
    /// itself reports the error immediately.
    pub stale: bool,
}

impl<W> TxEntry<W> {
    /// A fresh entry created by touching the committed store.
    pub fn from_touch(value: Option<W>, version: Version, track_original: bool) -> Self
    where
        W: Clone,
    {
        let orig_value = if track_original {
            OrigValue::Tracked(value.clone())
        } else {
            OrigValue::NotTracked
        };
        TxEntry {
            value,
            orig_value,
            orig_version: version,
            updated: false,
            read_locked: false,
            stale: false,
        }
    }
}
