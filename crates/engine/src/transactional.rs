//! The non-generic commit-protocol seam a `Container` drives across every
//! participating store (Section 4.6, 4.7).
//!
//! A `Container` coordinates two-phase commit across an arbitrary number of
//! `StoreEngine<K, A>` instances with different `K`/`A` at once. It cannot
//! be generic over all of them simultaneously, so each store is also handed
//! to the container as `Arc<dyn TransactionalStore>` — mirroring the
//! type-erasure the teacher's `Database` uses for its `extensions` map, but
//! as a trait object rather than `Any`, since the container only ever needs
//! to *call* prepare/commit/rollback, never recover the concrete type.

use jacis_concurrency::TransactionHandle;
use jacis_core::error::JacisResult;
use jacis_core::ids::{StoreId, TxId};

/// Implemented by every `StoreEngine`. Keyed only by `TxId`: all of a
/// transaction's per-store state (its `TxView`) lives inside the store
/// itself, found by this id.
pub trait TransactionalStore: Send + Sync {
    /// This store's identity.
    fn store_id(&self) -> &StoreId;

    /// Eagerly touch every key currently present in this store's committed
    /// snapshot into `tx`'s `TxView`, so later reads against `tx` observe
    /// the instant this was called rather than whatever is committed at
    /// first-touch time. Used by `Container::create_read_only_transaction_view`
    /// when there is no current transaction to adopt: without this, the
    /// freshly begun handle would lazily pick up each key's committed value
    /// at whatever later moment a reader happens to touch it.
    fn capture_snapshot(&self, tx: &TransactionHandle);

    /// Run the prepare phase for `tx` against this store (Section 4.6).
    /// On success, the store's per-key locks for this transaction's
    /// modified/locked keys are held until `commit` or `rollback`.
    fn prepare(&self, tx: TxId) -> JacisResult<()>;

    /// Run the commit phase for `tx`: install values, maintain indexes and
    /// tracked views, notify listeners, release locks, discard the TxView.
    /// Only valid after a successful `prepare`.
    fn commit(&self, tx: TxId) -> JacisResult<()>;

    /// Discard `tx`'s TxView and release any locks it acquired during
    /// prepare. Valid from any state prior to a successful `commit`.
    fn rollback(&self, tx: TxId) -> JacisResult<()>;

    /// Drop all committed state. Only safe with no transactions
    /// outstanding; used by `Container::clear_all_stores`.
    fn clear(&self);
}
