//! Per-store and container-level configuration.
//!
//! `StoreSpec` gathers the options the specification's Section 6 calls out
//! as "recognized by a store spec": `trackOriginalValue`,
//! `checkViewsOnCommit`, `valueAdapter`, `persistenceAdapter`, `dirtyCheck`.
//! Built with the same incremental-builder style the teacher repository uses
//! for `DatabaseBuilder`.

use crate::adapter::ValueAdapter;
use crate::ids::StoreId;
use crate::listener::PersistenceAdapter;
use std::sync::Arc;

/// Configuration for one store, fixed at `create_store` time.
pub struct StoreSpec<K, A: ValueAdapter> {
    /// The store's identity within its container.
    pub name: StoreId,
    /// The value adapter used for every committed/transactional conversion.
    pub value_adapter: Arc<A>,
    /// Keep `orig_value` on tx entries, enabling dirty-check and
    /// before/after diffing in listeners. Costs one extra adapter
    /// conversion per first touch.
    pub track_original_value: bool,
    /// Run each registered tracked view's `check_view` audit hook after
    /// commit.
    pub check_views_on_commit: bool,
    /// Reject `get_read_only` with `ReadOnlyNotSupported` unless the value
    /// adapter reports `supports_read_only() == true`.
    pub strict_read_only: bool,
    /// Optional predicate promoting a non-`update`d tx entry to `updated`
    /// if it detects an in-place mutation (requires
    /// `track_original_value = true` to have an original to compare
    /// against).
    pub dirty_check: Option<Arc<dyn Fn(&A::Writable, &A::Writable) -> bool + Send + Sync>>,
    /// Optional persistence collaborator.
    pub persistence_adapter: Option<Arc<dyn PersistenceAdapter<K, A::Committed>>>,
}

impl<K, A: ValueAdapter> StoreSpec<K, A> {
    /// Start building a spec for `name` with the given adapter. All other
    /// options default to off.
    pub fn new(name: impl Into<StoreId>, value_adapter: A) -> Self {
        StoreSpec {
            name: name.into(),
            value_adapter: Arc::new(value_adapter),
            track_original_value: false,
            check_views_on_commit: false,
            strict_read_only: false,
            dirty_check: None,
            persistence_adapter: None,
        }
    }

    /// Keep the value observed at first touch alongside the working copy.
    #[must_use]
    pub fn track_original_value(mut self, yes: bool) -> Self {
        self.track_original_value = yes;
        self
    }

    /// Audit tracked views after every commit.
    #[must_use]
    pub fn check_views_on_commit(mut self, yes: bool) -> Self {
        self.check_views_on_commit = yes;
        self
    }

    /// Require the adapter to support read-only mode.
    #[must_use]
    pub fn strict_read_only(mut self, yes: bool) -> Self {
        self.strict_read_only = yes;
        self
    }

    /// Install a dirty-check predicate. Implies `track_original_value`.
    #[must_use]
    pub fn dirty_check<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&A::Writable, &A::Writable) -> bool + Send + Sync + 'static,
    {
        self.dirty_check = Some(Arc::new(predicate));
        self.track_original_value = true;
        self
    }

    /// Attach a persistence collaborator.
    #[must_use]
    pub fn persistence_adapter(
        mut self,
        adapter: Arc<dyn PersistenceAdapter<K, A::Committed>>,
    ) -> Self {
        self.persistence_adapter = Some(adapter);
        self
    }
}

/// Container-wide defaults applied when a `StoreSpec` does not override
/// them explicitly.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Default for `StoreSpec::track_original_value` on stores created
    /// through `Container::create_store` without an explicit spec.
    pub default_track_original_value: bool,
    /// Default retry count for `with_local_tx_and_retry` when the caller
    /// does not specify one.
    pub default_retry_attempts: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig {
            default_track_original_value: false,
            default_retry_attempts: 3,
        }
    }
}
