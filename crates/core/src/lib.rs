//! Core types and traits shared across the Jacis workspace.
//!
//! This crate defines the foundational, generics-free contract that the rest
//! of the workspace builds on:
//! - [`ids`]: identifiers for stores, transactions, and the monotonic version
//!   counter carried by every committed entry.
//! - [`error`]: the unified `JacisError` enum (one variant per failure kind
//!   named in the specification).
//! - [`adapter`]: the `ValueAdapter` trait and its clone/serde/identity
//!   implementations.
//! - [`listener`]: modification listener and persistence collaborator traits.
//! - [`config`]: per-store configuration (`StoreSpec`) and container-level
//!   defaults.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod ids;
pub mod listener;

pub use adapter::{
    CloneReadOnlyAdapter, CloneValueAdapter, IdentityValueAdapter, ReadOnlyCapable,
    SerdeValueAdapter, ValueAdapter,
};
pub use config::{ContainerConfig, StoreSpec};
pub use error::{JacisError, JacisResult};
pub use ids::{StoreId, TxId, Version};
pub use listener::{ModificationListener, PersistenceAdapter};
