//! The committed store (Section 4.2 of the specification).
//!
//! A [`CommittedStore`] is the shared, keyed map every transaction's view is
//! reconciled against during prepare/commit. It holds exactly one value per
//! key (no version chain — JACIS keeps only the current committed value),
//! plus the bookkeeping the two-phase commit protocol needs: a monotonic
//! version, an optimistic lock holder, and a reference count used to garbage
//! collect tombstones.
//!
//! Grounded on `strata-storage::ShardedStore`
//! (`DashMap` + per-shard locking for sharded, mostly-lock-free access),
//! generalized from that crate's fixed `Key`/`Value` types to arbitrary
//! `K`/`V`, and simplified from a multi-version chain to the single
//! current-value-plus-version model the specification describes.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod committed_store;
pub mod entry;

pub use committed_store::CommittedStore;
pub use entry::{CommittedEntry, TouchResult};
