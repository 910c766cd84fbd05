//! Error types for the Jacis transactional store.
//!
//! `JacisError` is the unified error type surfaced by every public
//! operation. Each variant corresponds to one row of the error table in the
//! specification (Section 7: Error Handling Design).

use crate::ids::{StoreId, TxId, Version};
use std::fmt;
use thiserror::Error;

/// Result type alias for Jacis operations.
pub type JacisResult<T> = std::result::Result<T, JacisError>;

/// Unified error type for the Jacis core.
#[derive(Debug, Error)]
pub enum JacisError {
    /// No transaction is bound to the calling thread, but the operation
    /// requires one.
    #[error("no transaction bound to the current thread")]
    NoTransaction,

    /// `begin_local_transaction` was called while a transaction was already
    /// bound to the calling thread.
    #[error("a transaction is already bound to the current thread")]
    TxAlreadyStarted,

    /// A mutation was attempted after the transaction entered the prepared
    /// state.
    #[error("transaction {tx_id} is already prepared")]
    TxAlreadyPrepared {
        /// The transaction that already prepared.
        tx_id: TxId,
    },

    /// Prepare observed `version != origVersion` for a touched or
    /// read-locked key: another transaction committed over it first.
    #[error(
        "stale object on store {store_id}, key {key}: expected version {expected}, found {actual}"
    )]
    StaleObject {
        /// The store the conflict occurred in.
        store_id: StoreId,
        /// Debug-formatted key, for diagnostics.
        key: String,
        /// Version this transaction observed at first touch.
        expected: Version,
        /// Version currently committed.
        actual: Version,
    },

    /// Another transaction currently holds the optimistic lock on this key.
    #[error("lock contention on store {store_id}, key {key}: held by {holder}")]
    LockContention {
        /// The store the conflict occurred in.
        store_id: StoreId,
        /// Debug-formatted key, for diagnostics.
        key: String,
        /// The transaction currently holding the lock.
        holder: TxId,
    },

    /// A unique index would be violated by the pending change, either at
    /// index creation time or at commit time.
    #[error("unique index {index_name:?} on store {store_id} violated by key {key}")]
    UniqueIndexViolation {
        /// The store the index belongs to.
        store_id: StoreId,
        /// The index name.
        index_name: String,
        /// Debug-formatted secondary key that collided.
        key: String,
    },

    /// A modification listener vetoed a pending change during prepare.
    #[error("modification to store {store_id}, key {key} vetoed: {reason}")]
    ModificationVeto {
        /// The store the veto occurred in.
        store_id: StoreId,
        /// Debug-formatted key.
        key: String,
        /// Listener-supplied reason.
        reason: String,
    },

    /// A tracked view failed to apply a modification during commit.
    #[error("tracked view {view_name:?} on store {store_id} failed: {reason}")]
    TrackedViewFailure {
        /// The store the view belongs to.
        store_id: StoreId,
        /// The view name.
        view_name: String,
        /// Failure reason reported by the view.
        reason: String,
    },

    /// A mutation was attempted on a value in read-only mode.
    #[error("attempted mutation of a read-only value on store {store_id}, key {key}")]
    ReadOnlyViolation {
        /// The store the violation occurred in.
        store_id: StoreId,
        /// Debug-formatted key.
        key: String,
    },

    /// `get_read_only` was called in strict mode on a store whose adapter
    /// does not support the read-only capability.
    #[error("store {store_id} requires read-only support, but its adapter does not provide it")]
    ReadOnlyNotSupported {
        /// The store in question.
        store_id: StoreId,
    },

    /// Aggregate error surfaced by the container when a transaction's
    /// commit is rolled back because some participating store's prepare
    /// phase failed.
    #[error("transaction {tx_id} rolled back: {cause}")]
    TxRollback {
        /// The transaction that was rolled back.
        tx_id: TxId,
        /// The underlying error that triggered the rollback.
        #[source]
        cause: Box<JacisError>,
    },

    /// An invariant of the engine was violated. Indicates a bug rather than
    /// a caller error.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl JacisError {
    /// Whether retrying the whole transaction (e.g. via
    /// `with_local_tx_and_retry`) is a reasonable recovery strategy.
    ///
    /// Per the specification's error table, only `STALE_OBJECT` and
    /// `LOCK_CONTENTION` are meant to be retried; every other kind reflects
    /// either caller error or a structural conflict that retrying alone will
    /// not resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JacisError::StaleObject { .. } | JacisError::LockContention { .. })
    }

    /// Wrap this error as the cause of a `TxRollback` for the given
    /// transaction, unless it already is one.
    #[must_use]
    pub fn into_rollback(self, tx_id: TxId) -> JacisError {
        match self {
            JacisError::TxRollback { .. } => self,
            other => JacisError::TxRollback {
                tx_id,
                cause: Box::new(other),
            },
        }
    }
}

/// Helper for formatting arbitrary `Debug` keys into error messages without
/// requiring `K: Display` everywhere the generic engine constructs an error.
pub fn debug_key<K: fmt::Debug>(key: &K) -> String {
    format!("{key:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StoreId;

    #[test]
    fn only_stale_object_and_lock_contention_are_retryable() {
        let stale = JacisError::StaleObject {
            store_id: StoreId::new("accounts"),
            key: "1".into(),
            expected: Version::INITIAL,
            actual: Version::INITIAL.next(),
        };
        assert!(stale.is_retryable());

        let contention = JacisError::LockContention {
            store_id: StoreId::new("accounts"),
            key: "1".into(),
            holder: TxId::allocate(),
        };
        assert!(contention.is_retryable());

        assert!(!JacisError::NoTransaction.is_retryable());
        assert!(!JacisError::TxAlreadyStarted.is_retryable());
    }

    #[test]
    fn into_rollback_wraps_once() {
        let tx = TxId::allocate();
        let wrapped = JacisError::NoTransaction.into_rollback(tx);
        match &wrapped {
            JacisError::TxRollback { tx_id, cause } => {
                assert_eq!(*tx_id, tx);
                assert!(matches!(**cause, JacisError::NoTransaction));
            }
            other => panic!("expected TxRollback, got {other:?}"),
        }

        // Wrapping an already-wrapped error keeps the original tx_id/cause.
        let double = wrapped.into_rollback(TxId::allocate());
        match double {
            JacisError::TxRollback { tx_id, .. } => assert_eq!(tx_id, tx),
            other => panic!("expected TxRollback, got {other:?}"),
        }
    }
}
