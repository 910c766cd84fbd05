//! The transaction handle (Section 3 of the specification).

use jacis_core::ids::{StoreId, TxId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;

/// A transaction's lifecycle state.
///
/// Transitions: `Active -> Preparing -> Prepared -> Committing -> Terminated`
/// on the happy path, or `Active|Preparing|Prepared -> RollingBack ->
/// Terminated` on abort. `Terminated` is absorbing: every operation on a
/// terminated handle fails with `NoTransaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Executing: reads and writes are accepted.
    Active,
    /// Running the prepare phase across participating stores.
    Preparing,
    /// Every participating store's prepare succeeded; per-key locks are
    /// held, awaiting commit.
    Prepared,
    /// Running the commit phase across participating stores.
    Committing,
    /// Running rollback across participating stores.
    RollingBack,
    /// Finished (committed or rolled back). No further operations allowed.
    Terminated,
}

/// A running (or just-finished) transaction.
///
/// Holds no generic TxView state directly — those live inside each
/// `StoreEngine`'s own per-transaction map, keyed by this handle's
/// [`TxId`] — which is what lets one non-generic handle coordinate an
/// arbitrary number of differently-typed stores (see `jacis::Container`).
pub struct TransactionHandle {
    tx_id: TxId,
    description: String,
    /// Opaque token identifying an externally-managed transaction this
    /// handle is bound to (Section 4.7's "external transaction bridge").
    /// `None` for a purely local transaction.
    external_token: Option<String>,
    state: Mutex<TxState>,
    participating_stores: Mutex<HashSet<StoreId>>,
}

impl TransactionHandle {
    /// Begin a new local transaction.
    pub fn begin_local(description: impl Into<String>) -> Self {
        TransactionHandle {
            tx_id: TxId::allocate(),
            description: description.into(),
            external_token: None,
            state: Mutex::new(TxState::Active),
            participating_stores: Mutex::new(HashSet::new()),
        }
    }

    /// Bind a handle to an externally-managed transaction token, for the
    /// external transaction bridge.
    pub fn begin_external(description: impl Into<String>, token: impl Into<String>) -> Self {
        TransactionHandle {
            tx_id: TxId::allocate(),
            description: description.into(),
            external_token: Some(token.into()),
            state: Mutex::new(TxState::Active),
            participating_stores: Mutex::new(HashSet::new()),
        }
    }

    /// This transaction's unique id.
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// Human-readable description supplied at `begin`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The external transaction token, if this handle is bridged.
    pub fn external_token(&self) -> Option<&str> {
        self.external_token.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TxState {
        *self.state.lock()
    }

    /// Overwrite the lifecycle state. Used by the store engine and
    /// container as the transaction moves through prepare/commit/rollback.
    pub fn set_state(&self, state: TxState) {
        *self.state.lock() = state;
    }

    /// Record that this store participates in the transaction (has created
    /// a TxView for it). Idempotent.
    pub fn register_store(&self, store_id: StoreId) {
        self.participating_stores.lock().insert(store_id);
    }

    /// Every store that has a TxView for this transaction, in the order
    /// needed to drive prepare/commit (insertion order is not significant;
    /// the container sorts for deterministic rollback ordering).
    pub fn participating_stores(&self) -> Vec<StoreId> {
        self.participating_stores.lock().iter().cloned().collect()
    }

    /// Whether the transaction is still accepting reads/writes.
    pub fn is_active(&self) -> bool {
        self.state() == TxState::Active
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("tx_id", &self.tx_id)
            .field("description", &self.description)
            .field("state", &self.state())
            .finish()
    }
}
