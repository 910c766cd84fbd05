//! # JACIS
//!
//! An in-memory, transactional object store providing Atomicity,
//! Consistency, and Isolation (no Durability) over plain Rust values.
//!
//! A [`Container`] owns any number of stores and coordinates optimistic,
//! two-phase commit across however many of them a single transaction
//! touches. Each store is generic over its key type and a [`ValueAdapter`]
//! that governs how values move between the committed side and a running
//! transaction's working copy.
//!
//! # Quick Start
//!
//! ```no_run
//! use jacis::Container;
//! use jacis_core::adapter::CloneValueAdapter;
//! use jacis_core::StoreSpec;
//!
//! let container = Container::default();
//! let accounts = container
//!     .create_store(StoreSpec::new("accounts", CloneValueAdapter::<i64>::new()))
//!     .expect("store name is free");
//!
//! container
//!     .with_local_tx("open account", |tx| {
//!         accounts.update(tx, &1, 100);
//!         Ok(())
//!     })
//!     .expect("commit succeeds");
//!
//! container
//!     .with_local_tx("read balance", |tx| {
//!         assert_eq!(accounts.get(tx, &1), Some(100));
//!         Ok(())
//!     })
//!     .unwrap();
//! ```
//!
//! # Layout
//!
//! | Crate | Responsibility |
//! |-------|----------------|
//! | `jacis-core` | Value adapters, errors, ids, `StoreSpec`/`ContainerConfig` |
//! | `jacis-storage` | The committed store: sharded, versioned, ref-counted |
//! | `jacis-concurrency` | `TransactionHandle` and per-store `TxView` |
//! | `jacis-engine` | `StoreEngine`, indexes, tracked views, two-phase commit |
//!
//! Only [`Container`] and the re-exports below are meant for application
//! code; the crates above are implementation detail reachable directly only
//! for advanced composition (custom adapters, custom persistence
//! collaborators).

#![warn(missing_docs)]
#![warn(clippy::all)]

mod container;

pub use container::{Container, TransactionInfo, TransactionListener};

pub use jacis_concurrency::{TransactionHandle, TxState};
pub use jacis_core::adapter::{
    CloneReadOnlyAdapter, CloneValueAdapter, IdentityValueAdapter, ReadOnlyCapable,
    SerdeValueAdapter, ValueAdapter,
};
pub use jacis_core::error::{JacisError, JacisResult};
pub use jacis_core::ids::{StoreId, TxId, Version};
pub use jacis_core::listener::{ModificationListener, PersistenceAdapter};
pub use jacis_core::{ContainerConfig, StoreSpec};
pub use jacis_engine::{
    IndexMaintainer, IndexRegistry, NonUniqueIndex, NonUniqueMultiIndex, ObjectInfo, StoreEngine,
    TrackedView, TrackedViewRegistry, TransactionalStore, UniqueIndex,
};
