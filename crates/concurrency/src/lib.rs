//! Transaction handles and per-store transactional views.
//!
//! A [`TransactionHandle`] is the non-generic part of a running
//! transaction: its id, lifecycle state, and the set of stores it
//! participates in. Each participating store keeps its own generic
//! [`TxView`], keyed by the handle's `TxId`, so one handle can coordinate
//! an arbitrary number of differently `K`/`V`-typed stores without this
//! crate itself being generic over them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handle;
pub mod tx_entry;
pub mod tx_view;

pub use handle::{TransactionHandle, TxState};
pub use tx_entry::{OrigValue, TxEntry};
pub use tx_view::{TxEntryGuard, TxView, TxViewPolicy};
