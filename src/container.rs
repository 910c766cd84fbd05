//! The container: owns stores, binds a thread to a transaction handle, and
//! drives two-phase commit across every store the transaction touched
//! (Section 4.7).

use jacis_core::adapter::ValueAdapter;
use jacis_core::error::{JacisError, JacisResult};
use jacis_core::ids::{StoreId, TxId};
use jacis_core::{ContainerConfig, StoreSpec};
use jacis_concurrency::{TransactionHandle, TxState};
use jacis_engine::{StoreEngine, TransactionalStore};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

thread_local! {
    static CURRENT_TX: RefCell<Option<Arc<TransactionHandle>>> = const { RefCell::new(None) };
}

/// Observes transaction lifecycle events container-wide, independent of any
/// single store's `ModificationListener`.
pub trait TransactionListener: Send + Sync {
    /// Fired after a transaction begins.
    fn on_begin(&self, _tx_id: TxId) {}
    /// Fired after every participating store has committed.
    fn on_commit(&self, _tx_id: TxId) {}
    /// Fired after every participating store has rolled back.
    fn on_rollback(&self, _tx_id: TxId) {}
}

/// Diagnostic snapshot of a transaction, returned by `get_transaction_info`
/// and `get_last_finished_transaction_info`.
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    /// The transaction's id.
    pub tx_id: TxId,
    /// Human-readable description supplied at `begin`.
    pub description: String,
    /// Lifecycle state at the moment this snapshot was taken.
    pub state: TxState,
    /// Stores this transaction has touched.
    pub participating_stores: Vec<StoreId>,
}

impl TransactionInfo {
    fn from_handle(handle: &TransactionHandle) -> Self {
        TransactionInfo {
            tx_id: handle.tx_id(),
            description: handle.description().to_string(),
            state: handle.state(),
            participating_stores: handle.participating_stores(),
        }
    }
}

/// Owns every store created in this process and coordinates transactions
/// across them.
pub struct Container {
    config: ContainerConfig,
    stores: DashMap<StoreId, Arc<dyn Any + Send + Sync>>,
    transactional: DashMap<StoreId, Arc<dyn TransactionalStore>>,
    listeners: RwLock<Vec<Arc<dyn TransactionListener>>>,
    read_only_views: DashMap<String, Arc<TransactionHandle>>,
    last_finished: Mutex<Option<TransactionInfo>>,
    prepared: DashMap<TxId, Vec<Arc<dyn TransactionalStore>>>,
}

impl Default for Container {
    fn default() -> Self {
        Container::new(ContainerConfig::default())
    }
}

impl Container {
    /// Create an empty container with the given defaults.
    pub fn new(config: ContainerConfig) -> Self {
        Container {
            config,
            stores: DashMap::new(),
            transactional: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            read_only_views: DashMap::new(),
            last_finished: Mutex::new(None),
            prepared: DashMap::new(),
        }
    }

    /// The container-wide configuration defaults.
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    // -- Store registration ------------------------------------------------

    /// Build and register a store from `spec`. Fails if a store with this
    /// name is already registered.
    pub fn create_store<K, A>(&self, spec: StoreSpec<K, A>) -> JacisResult<Arc<StoreEngine<K, A>>>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        A: ValueAdapter + 'static,
        A::Writable: Clone,
        A::Committed: Clone,
    {
        let store = Arc::new(StoreEngine::new(spec));
        self.register_store(store.clone())?;
        Ok(store)
    }

    /// Register an already-built store. Fails if its name is already taken.
    pub fn register_store<K, A>(&self, store: Arc<StoreEngine<K, A>>) -> JacisResult<()>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        A: ValueAdapter + 'static,
        A::Writable: Clone,
        A::Committed: Clone,
    {
        let name = store.store_id().clone();
        if self.stores.contains_key(&name) {
            return Err(JacisError::Internal(format!("store '{name}' already registered")));
        }
        self.stores.insert(name.clone(), store.clone() as Arc<dyn Any + Send + Sync>);
        self.transactional.insert(name, store as Arc<dyn TransactionalStore>);
        Ok(())
    }

    /// Fetch a previously registered store by name, downcasting to the
    /// caller's expected `K`/`A`. `None` if the name is unused or was
    /// registered with different types.
    pub fn get_store<K, A>(&self, name: &str) -> Option<Arc<StoreEngine<K, A>>>
    where
        K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
        A: ValueAdapter + 'static,
        A::Writable: Clone,
        A::Committed: Clone,
    {
        self.stores.get(name)?.value().clone().downcast::<StoreEngine<K, A>>().ok()
    }

    /// Drop all committed state in every registered store. Only safe with
    /// no transactions outstanding.
    pub fn clear_all_stores(&self) {
        for entry in self.transactional.iter() {
            entry.value().clear();
        }
    }

    // -- Thread-local transaction binding -----------------------------------

    /// Begin a new local transaction on the calling thread. Fails with
    /// `TxAlreadyStarted` if one is already bound.
    pub fn begin_local_transaction(&self, description: impl Into<String>) -> JacisResult<Arc<TransactionHandle>> {
        CURRENT_TX.with(|cell| {
            if cell.borrow().is_some() {
                return Err(JacisError::TxAlreadyStarted);
            }
            let handle = Arc::new(TransactionHandle::begin_local(description));
            tracing::debug!(tx = %handle.tx_id(), description = %handle.description(), "transaction begun");
            *cell.borrow_mut() = Some(handle.clone());
            for listener in self.listeners.read().iter() {
                listener.on_begin(handle.tx_id());
            }
            Ok(handle)
        })
    }

    /// Begin a transaction bound to an externally-managed transaction
    /// identified by `token` (Section 4.7's "external transaction bridge").
    /// Application code on the calling thread reads and writes exactly as
    /// with a local transaction; the bridge collaborator is responsible for
    /// calling `prepare`/`commit`/`rollback` with the returned handle from
    /// the external transaction manager's `beforeCompletion`/
    /// `afterCompletion` synchronization callbacks, instead of this
    /// container ever calling `commit_transaction`/`rollback_transaction`
    /// for it.
    pub fn begin_external_transaction(
        &self,
        description: impl Into<String>,
        token: impl Into<String>,
    ) -> JacisResult<Arc<TransactionHandle>> {
        CURRENT_TX.with(|cell| {
            if cell.borrow().is_some() {
                return Err(JacisError::TxAlreadyStarted);
            }
            let handle = Arc::new(TransactionHandle::begin_external(description, token));
            tracing::debug!(tx = %handle.tx_id(), "external transaction begun");
            *cell.borrow_mut() = Some(handle.clone());
            for listener in self.listeners.read().iter() {
                listener.on_begin(handle.tx_id());
            }
            Ok(handle)
        })
    }

    /// The transaction bound to the calling thread, if any.
    pub fn current_transaction(&self) -> Option<Arc<TransactionHandle>> {
        CURRENT_TX.with(|cell| cell.borrow().clone())
    }

    /// Whether the calling thread currently has a bound transaction.
    pub fn is_in_transaction(&self) -> bool {
        self.current_transaction().is_some()
    }

    fn take_current(&self) -> JacisResult<Arc<TransactionHandle>> {
        CURRENT_TX.with(|cell| cell.borrow_mut().take()).ok_or(JacisError::NoTransaction)
    }

    /// Diagnostic snapshot of the calling thread's current transaction.
    pub fn transaction_info(&self) -> Option<TransactionInfo> {
        self.current_transaction().map(|h| TransactionInfo::from_handle(&h))
    }

    /// Diagnostic snapshot of the most recently terminated transaction,
    /// across all threads.
    pub fn last_finished_transaction_info(&self) -> Option<TransactionInfo> {
        self.last_finished.lock().clone()
    }

    fn ordered_stores(&self, handle: &TransactionHandle) -> Vec<StoreId> {
        let mut stores = handle.participating_stores();
        stores.sort();
        stores
    }

    fn transactional_for(&self, store_id: &StoreId) -> Option<Arc<dyn TransactionalStore>> {
        self.transactional.get(store_id).map(|e| e.value().clone())
    }

    /// Run the prepare phase for `handle` across every store it
    /// participates in, rolling back everything already prepared if any
    /// store's prepare fails (Section 4.6/4.7). On success, `handle` is left
    /// in `Prepared` state holding every participating store's per-key
    /// locks, and stays that way until `commit` or `rollback` is called with
    /// the same handle.
    ///
    /// This, `commit`, and `rollback` are the explicit, handle-based entry
    /// points an external transaction bridge's synchronization callback
    /// drives directly (Section 4.7's "external transaction bridge", Section
    /// 9's design note): `prepare` from `beforeCompletion`, `commit` or
    /// `rollback` from `afterCompletion`. They do not touch the thread-local
    /// binding, so the two callbacks are free to run on different threads.
    pub fn prepare(&self, handle: &Arc<TransactionHandle>) -> JacisResult<()> {
        handle.set_state(TxState::Preparing);
        let stores = self.ordered_stores(handle);

        let mut prepared = Vec::new();
        for store_id in &stores {
            let Some(store) = self.transactional_for(store_id) else { continue };
            match store.prepare(handle.tx_id()) {
                Ok(()) => prepared.push(store),
                Err(err) => {
                    tracing::warn!(
                        tx = %handle.tx_id(),
                        store_id = %store_id,
                        error = %err,
                        "prepare failed, rolling back already-prepared stores"
                    );
                    for already in prepared.iter().rev() {
                        let _ = already.rollback(handle.tx_id());
                    }
                    handle.set_state(TxState::RollingBack);
                    self.finish(handle, TxState::Terminated);
                    for listener in self.listeners.read().iter() {
                        listener.on_rollback(handle.tx_id());
                    }
                    return Err(err.into_rollback(handle.tx_id()));
                }
            }
        }

        handle.set_state(TxState::Prepared);
        self.prepared.insert(handle.tx_id(), prepared);
        Ok(())
    }

    /// Commit `handle` after a successful `prepare`: commits every store
    /// that prepared, in the same order, then terminates the handle.
    pub fn commit(&self, handle: &Arc<TransactionHandle>) -> JacisResult<()> {
        let prepared = self.prepared.remove(&handle.tx_id()).map(|(_, v)| v).unwrap_or_default();
        handle.set_state(TxState::Committing);
        for store in &prepared {
            store.commit(handle.tx_id())?;
        }
        self.finish(handle, TxState::Terminated);
        tracing::debug!(tx = %handle.tx_id(), stores = prepared.len(), "transaction committed");
        for listener in self.listeners.read().iter() {
            listener.on_commit(handle.tx_id());
        }
        Ok(())
    }

    /// Roll back `handle`: every participating store (whether or not it had
    /// prepared) discards its `TxView` and releases any locks it holds.
    pub fn rollback(&self, handle: &Arc<TransactionHandle>) -> JacisResult<()> {
        self.prepared.remove(&handle.tx_id());
        handle.set_state(TxState::RollingBack);
        for store_id in self.ordered_stores(handle) {
            if let Some(store) = self.transactional_for(&store_id) {
                store.rollback(handle.tx_id())?;
            }
        }
        self.finish(handle, TxState::Terminated);
        for listener in self.listeners.read().iter() {
            listener.on_rollback(handle.tx_id());
        }
        Ok(())
    }

    /// Commit the calling thread's current transaction: `prepare` followed
    /// by `commit` against the thread-bound handle.
    pub fn commit_transaction(&self) -> JacisResult<()> {
        let handle = self.take_current()?;
        if let Err(err) = self.prepare(&handle) {
            return Err(err);
        }
        self.commit(&handle)
    }

    /// Roll back the calling thread's current transaction.
    pub fn rollback_transaction(&self) -> JacisResult<()> {
        let handle = self.take_current()?;
        self.rollback(&handle)
    }

    fn finish(&self, handle: &TransactionHandle, state: TxState) {
        handle.set_state(state);
        *self.last_finished.lock() = Some(TransactionInfo::from_handle(handle));
    }

    /// Run `f` inside a fresh local transaction: commits on `Ok`, rolls back
    /// on `Err`. The transaction binding is always released before
    /// returning.
    pub fn with_local_tx<T>(
        &self,
        description: impl Into<String>,
        f: impl FnOnce(&Arc<TransactionHandle>) -> JacisResult<T>,
    ) -> JacisResult<T> {
        let handle = self.begin_local_transaction(description)?;
        match f(&handle) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback_transaction();
                Err(err)
            }
        }
    }

    /// As `with_local_tx`, but retries the whole transaction (with a fresh
    /// handle) up to `retries` additional times if the failure is
    /// `is_retryable()` (`StaleObject`/`LockContention`).
    pub fn with_local_tx_and_retry<T>(
        &self,
        description: impl Into<String> + Clone,
        retries: u32,
        f: impl Fn(&Arc<TransactionHandle>) -> JacisResult<T>,
    ) -> JacisResult<T> {
        let mut attempt = 0;
        loop {
            match self.with_local_tx(description.clone(), &f) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < retries => {
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    // -- Read-only transaction views ----------------------------------------

    /// Capture a named, adoptable read-only view: the calling thread's
    /// current transaction if one is bound, otherwise a fresh local
    /// transaction begun for this purpose. Because every store's `get`
    /// caches its first-touch value for the lifetime of a `TxView`, adopting
    /// the returned handle on another thread (via
    /// `start_read_only_transaction_with_context`) gives that thread the
    /// same repeatable-read instant this call captured.
    pub fn create_read_only_transaction_view(&self, name: impl Into<String>) -> JacisResult<()> {
        let name = name.into();
        let handle = match self.current_transaction() {
            Some(handle) => handle,
            None => {
                let handle = Arc::new(TransactionHandle::begin_local(format!("read-only:{name}")));
                for entry in self.transactional.iter() {
                    entry.value().capture_snapshot(&handle);
                }
                handle
            }
        };
        self.read_only_views.insert(name, handle);
        Ok(())
    }

    /// Bind the calling thread to a previously captured read-only view.
    /// Fails with `TxAlreadyStarted` if this thread already has a
    /// transaction bound, or `NoTransaction` if `name` is unknown.
    pub fn start_read_only_transaction_with_context(&self, name: &str) -> JacisResult<Arc<TransactionHandle>> {
        let handle = self.read_only_views.get(name).ok_or(JacisError::NoTransaction)?.clone();
        CURRENT_TX.with(|cell| {
            if cell.borrow().is_some() {
                return Err(JacisError::TxAlreadyStarted);
            }
            *cell.borrow_mut() = Some(handle.clone());
            Ok(())
        })?;
        Ok(handle)
    }

    /// Register a container-wide transaction lifecycle listener.
    pub fn register_transaction_listener(&self, listener: Arc<dyn TransactionListener>) {
        self.listeners.write().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jacis_core::adapter::CloneValueAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn accounts(container: &Container) -> Arc<StoreEngine<String, CloneValueAdapter<i64>>> {
        let store = container
            .create_store(StoreSpec::new("accounts", CloneValueAdapter::<i64>::new()))
            .unwrap();
        store.init_store_non_transactional(vec![100i64], |_| "a".to_string(), 1);
        store
    }

    #[test]
    fn commit_transaction_installs_values_and_releases_the_thread_local_binding() {
        let container = Container::default();
        let store = accounts(&container);

        container
            .with_local_tx("deposit", |handle| {
                let balance = store.get(handle, &"a".to_string()).unwrap();
                store.update(handle, &"a".to_string(), balance + 50);
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_committed_value(&"a".to_string()), Some(150));
        assert!(container.current_transaction().is_none());
    }

    #[test]
    fn rollback_transaction_discards_pending_changes() {
        let container = Container::default();
        let store = accounts(&container);

        let handle = container.begin_local_transaction("doomed").unwrap();
        store.update(&handle, &"a".to_string(), 999);
        container.rollback_transaction().unwrap();

        assert_eq!(store.get_committed_value(&"a".to_string()), Some(100));
    }

    #[test]
    fn uncommitted_writes_are_invisible_to_committed_reads() {
        let container = Container::default();
        let store = accounts(&container);

        let handle = container.begin_local_transaction("writer").unwrap();
        store.update(&handle, &"a".to_string(), 500);
        // Still in-flight: a read that bypasses the TxView sees the old value.
        assert_eq!(store.get_committed_value(&"a".to_string()), Some(100));
        container.commit_transaction().unwrap();
        assert_eq!(store.get_committed_value(&"a".to_string()), Some(500));
    }

    #[test]
    fn repeated_get_within_a_transaction_is_stable_despite_a_concurrent_commit() {
        let container = Container::default();
        let store = accounts(&container);

        let handle = container.begin_local_transaction("reader").unwrap();
        assert_eq!(store.get(&handle, &"a".to_string()), Some(100));

        // A second, independent transaction commits a new value in between.
        let other = Arc::new(TransactionHandle::begin_local("writer"));
        store.update(&other, &"a".to_string(), 777);
        store.prepare(other.tx_id()).unwrap();
        store.commit(other.tx_id()).unwrap();

        // The reader's repeated get still observes its first-touch value.
        assert_eq!(store.get(&handle, &"a".to_string()), Some(100));
        container.rollback_transaction().unwrap();
    }

    #[test]
    fn with_local_tx_and_retry_retries_after_a_stale_object() {
        let container = Container::default();
        let store = accounts(&container);
        let attempts = AtomicUsize::new(0);

        let result = container.with_local_tx_and_retry("retry", 2, |handle| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let current = store.get(handle, &"a".to_string()).unwrap();
            if attempt == 0 {
                // A racing transaction commits over this key before we prepare.
                let racer = Arc::new(TransactionHandle::begin_local("racer"));
                store.update(&racer, &"a".to_string(), current + 1);
                store.prepare(racer.tx_id()).unwrap();
                store.commit(racer.tx_id()).unwrap();
            }
            store.update(handle, &"a".to_string(), current + 10);
            Ok(())
        });

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_committed_value(&"a".to_string()), Some(111));
    }

    #[test]
    fn begin_local_transaction_rejects_a_second_concurrent_begin() {
        let container = Container::default();
        let _handle = container.begin_local_transaction("first").unwrap();
        let err = container.begin_local_transaction("second").unwrap_err();
        assert!(matches!(err, JacisError::TxAlreadyStarted));
        container.rollback_transaction().unwrap();
    }

    #[test]
    fn register_store_rejects_a_duplicate_name() {
        let container = Container::default();
        accounts(&container);
        let err = container
            .create_store(StoreSpec::new("accounts", CloneValueAdapter::<i64>::new()))
            .unwrap_err();
        assert!(matches!(err, JacisError::Internal(_)));
    }

    #[test]
    fn get_store_returns_none_for_an_unknown_name() {
        let container = Container::default();
        accounts(&container);
        let missing = container.get_store::<String, CloneValueAdapter<i64>>("widgets");
        assert!(missing.is_none());
    }

    #[test]
    fn external_transaction_bridge_drives_prepare_commit_without_the_thread_local_binding() {
        let container = Container::default();
        let store = accounts(&container);

        let handle = container
            .begin_external_transaction("bridged", "xid-1")
            .unwrap();
        store.update(&handle, &"a".to_string(), 42);

        // The bridge calls prepare/commit directly; commit_transaction is
        // never invoked, and the thread-local binding is left untouched by
        // these explicit calls (the container still needs take_current to be
        // separately released since begin_external_transaction did bind it).
        container.prepare(&handle).unwrap();
        container.commit(&handle).unwrap();

        assert_eq!(store.get_committed_value(&"a".to_string()), Some(42));
        assert_eq!(handle.state(), TxState::Terminated);
    }
}
