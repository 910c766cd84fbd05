//! The store engine: secondary indexes, tracked views, and the two-phase
//! commit protocol that reconciles a `TxView` with a `CommittedStore`
//! (Sections 4.4, 4.5, 4.6 of the specification).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod store;
pub mod tracked_view;
pub mod transactional;

pub use index::{IndexMaintainer, IndexRegistry, NonUniqueIndex, NonUniqueMultiIndex, UniqueIndex};
pub use store::{ObjectInfo, StoreEngine};
pub use tracked_view::{TrackedView, TrackedViewRegistry};
pub use transactional::TransactionalStore;
