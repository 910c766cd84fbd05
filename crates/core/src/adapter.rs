//! The value adapter contract (Section 4.1 of the specification).
//!
//! A `ValueAdapter` converts values between the committed representation
//! (what the committed store keeps) and the transactional representation
//! (what a running transaction reads and mutates). The core engine is
//! written entirely against this trait and never special-cases any of the
//! three required implementations below.

use std::marker::PhantomData;
use std::sync::Arc;

/// Converts values between the committed and transactional representations.
///
/// `Committed` and `Writable` are allowed to differ (the serialization-based
/// adapter keeps committed values as bytes and transactional values as the
/// live structure); for the clone-based and identity adapters they are the
/// same type.
pub trait ValueAdapter: Send + Sync + 'static {
    /// The representation kept in the committed store.
    type Committed: Send + Sync + 'static;
    /// The representation a transaction works with.
    type Writable: Send + Sync + 'static;

    /// Produce an independent mutable copy for a TxView, from a committed
    /// value.
    fn committed_to_writable(&self, value: &Self::Committed) -> Self::Writable;

    /// Produce an independent snapshot to install as the new committed
    /// value, from a TxView's working copy.
    fn writable_to_committed(&self, value: &Self::Writable) -> Self::Committed;

    /// Produce a non-mutating view of a committed value, for reads outside
    /// or inside a transaction that do not need a private working copy.
    fn committed_to_read_only(&self, value: &Self::Committed) -> Self::Writable;

    /// Produce a non-mutating view of a TxView's working copy.
    fn writable_to_read_only(&self, value: &Self::Writable) -> Self::Writable;

    /// Whether this adapter toggles a per-value read-only capability when
    /// producing read-only handles. Stores configured with
    /// `StoreSpec::strict_read_only` reject `get_read_only` calls with
    /// `ReadOnlyNotSupported` when this returns `false`.
    fn supports_read_only(&self) -> bool {
        false
    }
}

/// A value type that can assert or clear its own read-only flag.
///
/// Implemented by application value types that want a runtime guard against
/// accidental mutation of committed-side aliases, per the specification's
/// design note on per-value read-only mode (Section 9).
pub trait ReadOnlyCapable {
    /// Mark this value read-only. Subsequent calls to a value's own
    /// mutating methods should check `is_read_only` and fail fast.
    fn mark_read_only(&mut self);

    /// Mark this value writable again.
    fn mark_writable(&mut self);

    /// Whether this value currently refuses mutation.
    fn is_read_only(&self) -> bool;
}

/// Clone-based adapter: `Committed == Writable == V`, all four conversions
/// are `V::clone()`.
///
/// This is the right choice whenever the value type has a cheap, correct
/// deep copy (derived `Clone`, or `Arc`-of-immutable-parts).
pub struct CloneValueAdapter<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> CloneValueAdapter<V> {
    /// Construct the adapter. Zero-sized; there is no per-instance state.
    pub fn new() -> Self {
        CloneValueAdapter {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for CloneValueAdapter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> ValueAdapter for CloneValueAdapter<V> {
    type Committed = V;
    type Writable = V;

    fn committed_to_writable(&self, value: &V) -> V {
        value.clone()
    }

    fn writable_to_committed(&self, value: &V) -> V {
        value.clone()
    }

    fn committed_to_read_only(&self, value: &V) -> V {
        value.clone()
    }

    fn writable_to_read_only(&self, value: &V) -> V {
        value.clone()
    }
}

/// Clone-based adapter that additionally toggles a [`ReadOnlyCapable`] flag
/// when crossing between the committed (read-only) side and the
/// transactional (writable) side.
pub struct CloneReadOnlyAdapter<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> CloneReadOnlyAdapter<V> {
    /// Construct the adapter.
    pub fn new() -> Self {
        CloneReadOnlyAdapter {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for CloneReadOnlyAdapter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ValueAdapter for CloneReadOnlyAdapter<V>
where
    V: Clone + ReadOnlyCapable + Send + Sync + 'static,
{
    type Committed = V;
    type Writable = V;

    fn committed_to_writable(&self, value: &V) -> V {
        let mut v = value.clone();
        v.mark_writable();
        v
    }

    fn writable_to_committed(&self, value: &V) -> V {
        let mut v = value.clone();
        v.mark_writable();
        v
    }

    fn committed_to_read_only(&self, value: &V) -> V {
        let mut v = value.clone();
        v.mark_read_only();
        v
    }

    fn writable_to_read_only(&self, value: &V) -> V {
        let mut v = value.clone();
        v.mark_read_only();
        v
    }

    fn supports_read_only(&self) -> bool {
        true
    }
}

/// Serialization-based adapter: the committed representation is an opaque
/// MessagePack byte buffer, the transactional representation is the live
/// structure. Round-tripping through bytes guarantees committed and
/// transactional copies never alias.
pub struct SerdeValueAdapter<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> SerdeValueAdapter<V> {
    /// Construct the adapter.
    pub fn new() -> Self {
        SerdeValueAdapter {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for SerdeValueAdapter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ValueAdapter for SerdeValueAdapter<V>
where
    V: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    type Committed = Vec<u8>;
    type Writable = V;

    fn committed_to_writable(&self, bytes: &Vec<u8>) -> V {
        rmp_serde::from_slice(bytes).expect("committed bytes were written by this adapter")
    }

    fn writable_to_committed(&self, value: &V) -> Vec<u8> {
        rmp_serde::to_vec(value).expect("value type serializes without error")
    }

    fn committed_to_read_only(&self, bytes: &Vec<u8>) -> V {
        self.committed_to_writable(bytes)
    }

    fn writable_to_read_only(&self, value: &V) -> V {
        // Round-trip through bytes so the returned handle never aliases the
        // caller's working copy, matching the spirit of a read-only view.
        let bytes = self.writable_to_committed(value);
        self.committed_to_writable(&bytes)
    }
}

/// Immutable adapter: values are never actually copied, only the `Arc`
/// handle is cloned. Appropriate only for value types the caller guarantees
/// are never mutated in place once shared.
pub struct IdentityValueAdapter<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> IdentityValueAdapter<V> {
    /// Construct the adapter.
    pub fn new() -> Self {
        IdentityValueAdapter {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for IdentityValueAdapter<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Send + Sync + 'static> ValueAdapter for IdentityValueAdapter<V> {
    type Committed = Arc<V>;
    type Writable = Arc<V>;

    fn committed_to_writable(&self, value: &Arc<V>) -> Arc<V> {
        Arc::clone(value)
    }

    fn writable_to_committed(&self, value: &Arc<V>) -> Arc<V> {
        Arc::clone(value)
    }

    fn committed_to_read_only(&self, value: &Arc<V>) -> Arc<V> {
        Arc::clone(value)
    }

    fn writable_to_read_only(&self, value: &Arc<V>) -> Arc<V> {
        Arc::clone(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        balance: i64,
    }

    #[derive(Debug, Clone, Default)]
    struct Flagged {
        value: i64,
        read_only: bool,
    }

    impl ReadOnlyCapable for Flagged {
        fn mark_read_only(&mut self) {
            self.read_only = true;
        }
        fn mark_writable(&mut self) {
            self.read_only = false;
        }
        fn is_read_only(&self) -> bool {
            self.read_only
        }
    }

    #[test]
    fn clone_adapter_round_trips_without_read_only_support() {
        let adapter = CloneValueAdapter::<Account>::new();
        let committed = Account { balance: 100 };
        let writable = adapter.committed_to_writable(&committed);
        assert_eq!(writable, committed);
        assert_eq!(adapter.writable_to_committed(&writable), committed);
        assert!(!adapter.supports_read_only());
    }

    #[test]
    fn clone_read_only_adapter_toggles_flag() {
        let adapter = CloneReadOnlyAdapter::<Flagged>::new();
        let committed = Flagged {
            value: 7,
            read_only: true,
        };
        let writable = adapter.committed_to_writable(&committed);
        assert!(!writable.is_read_only());
        assert_eq!(writable.value, 7);

        let read_only = adapter.writable_to_read_only(&writable);
        assert!(read_only.is_read_only());
        assert!(adapter.supports_read_only());
    }

    #[test]
    fn serde_adapter_round_trips_through_bytes() {
        let adapter = SerdeValueAdapter::<Account>::new();
        let committed_bytes = adapter.writable_to_committed(&Account { balance: 42 });
        let restored = adapter.committed_to_writable(&committed_bytes);
        assert_eq!(restored, Account { balance: 42 });

        let read_only = adapter.writable_to_read_only(&restored);
        assert_eq!(read_only, restored);
    }

    #[test]
    fn identity_adapter_shares_the_arc() {
        let adapter = IdentityValueAdapter::<Account>::new();
        let committed = Arc::new(Account { balance: 5 });
        let writable = adapter.committed_to_writable(&committed);
        assert!(Arc::ptr_eq(&committed, &writable));
    }
}
