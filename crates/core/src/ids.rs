//! Identifiers used throughout the transactional engine.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a store within a container.
///
/// A store is uniquely identified by (key-type tag, value-type tag) per the
/// specification; in this Rust encoding the tag pair collapses to a single
/// caller-chosen name, since the key/value *types* are already enforced at
/// compile time by `Container::get_store::<K, A>(name)` — two stores can only
/// share a name if they also share `K` and `A`, which Rust's type system
/// already guarantees are consistent at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreId(String);

impl StoreId {
    /// Build a store id from any string-like name.
    pub fn new(name: impl Into<String>) -> Self {
        StoreId(name.into())
    }

    /// The underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<String>> From<T> for StoreId {
    fn from(value: T) -> Self {
        StoreId::new(value)
    }
}

/// Unique handle for one transaction.
///
/// The specification describes `txId` as "a unique string"; here it is a
/// monotonically allocated integer wrapped in a type that prints the same
/// way a generated string id would (`tx-<n>`), which keeps it unique and
/// log-friendly without paying for string allocation on every `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(u64);

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

impl TxId {
    /// Allocate a fresh, process-unique transaction id.
    pub fn allocate() -> Self {
        TxId(NEXT_TX_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for callers that need a stable sort key.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// A committed entry's monotonically non-decreasing version counter.
///
/// `Version(0)` is reserved for "never committed" (the version of a fresh
/// tombstone entry, per the specification's committed-entry invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Version(u64);

impl Version {
    /// The initial version of a freshly created tombstone entry.
    pub const INITIAL: Version = Version(0);

    /// Wrap a raw version number (used when reconstructing from storage).
    pub fn new(raw: u64) -> Self {
        Version(raw)
    }

    /// Raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The next version after this one.
    #[must_use]
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}
