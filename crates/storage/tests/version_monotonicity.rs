//! Property-based check of the committed store's core versioning invariant
//! (spec.md §8: "the installed `version` values form a strictly increasing
//! sequence"), across arbitrary sequences of single-key installs.

use jacis_core::ids::{StoreId, TxId, Version};
use jacis_storage::CommittedStore;
use proptest::prelude::*;

proptest! {
    #[test]
    fn version_strictly_increases_across_any_install_sequence(values in proptest::collection::vec(any::<i64>(), 1..200)) {
        let store: CommittedStore<String, i64> = CommittedStore::new(StoreId::new("accounts"));
        let key = "k".to_string();
        store.touch(&key);

        let mut last = Version::INITIAL;
        for value in values {
            let tx = TxId::allocate();
            store.try_lock(&key, tx).unwrap();
            let version = store.install(&key, Some(value), tx).unwrap();
            prop_assert!(version > last);
            last = version;
            store.unlock(&key, tx);
            prop_assert_eq!(store.current(&key).value, Some(value));
        }
    }
}
