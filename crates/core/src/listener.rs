//! Modification listeners and the persistence collaborator contract.
//!
//! Both traits are consumed only at the documented lifecycle points (Section
//! 4.6 and 6 of the specification); this crate defines the contract, not an
//! implementation — persistence in particular is explicitly out of scope for
//! the core (Section 1, Non-goals).

use crate::ids::TxId;

/// Observes and can veto modifications as they move through the two-phase
/// commit protocol.
///
/// All methods have no-op default implementations, so a listener only needs
/// to implement the hooks it cares about.
pub trait ModificationListener<K, C>: Send + Sync {
    /// Called during prepare, before `on_prepare_modification`, with a
    /// chance to adjust the value that will be committed.
    fn on_adjust_before_prepare(&self, _key: &K, _old: Option<&C>, _new_value: &mut C, _tx: TxId) {}

    /// Called during prepare. Returning `Err` vetoes the change with
    /// `MODIFICATION_VETO`; the reason is carried into the error.
    fn on_prepare_modification(
        &self,
        _key: &K,
        _old: Option<&C>,
        _new_value: &C,
        _tx: TxId,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Called during commit, after the new value has been installed, with
    /// the final old/new pair.
    fn on_modification(&self, _key: &K, _old: Option<&C>, _new: Option<&C>, _tx: TxId) {}

    /// Called when a transaction that touched this store is rolled back.
    fn after_rollback(&self, _tx: TxId) {}
}

/// Optional persistence collaborator.
///
/// The core makes no durability claim; it only guarantees these hooks fire
/// in the documented order (`initialize_store` once at store creation,
/// `on_modification` during commit for each modified key, then the
/// lifecycle callbacks around prepare/commit/rollback).
pub trait PersistenceAdapter<K, C>: Send + Sync {
    /// Restore committed state at store creation time. The engine installs
    /// every returned `(key, value)` pair as already-committed before
    /// accepting transactions.
    fn initialize_store(&self) -> Vec<(K, C)> {
        Vec::new()
    }

    /// Forwarded once per modified key, after the key's new value is
    /// installed in the committed store but before locks are released.
    fn on_modification(&self, _key: &K, _old: Option<&C>, _new: Option<&C>, _tx: TxId) {}

    /// Fired for this store after its prepare phase succeeds.
    fn after_prepare_for_store(&self, _tx: TxId) {}

    /// Fired for this store after its commit phase completes.
    fn after_commit_for_store(&self, _tx: TxId) {}

    /// Fired for this store after its rollback completes.
    fn after_rollback_for_store(&self, _tx: TxId) {}

    /// Fired once, container-wide, after every participating store has
    /// committed.
    fn after_commit(&self, _tx: TxId) {}

    /// Fired once, container-wide, after every participating store has
    /// rolled back.
    fn after_rollback(&self, _tx: TxId) {}
}
