//! # Netsaga Testing
//!
//! Testing utilities for the networks coordinator.
//!
//! This crate provides:
//! - In-memory implementations of the bus and key-value seams
//! - Fixture builders for aggregates and bus payloads
//! - A Given-When-Then harness for reducers
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use netsaga_testing::{InMemoryEventBus, InMemoryKeyValueStore, fixtures};
//!
//! #[tokio::test]
//! async fn request_is_dispatched() {
//!     let bus = InMemoryEventBus::new();
//!     let kv = InMemoryKeyValueStore::new();
//!     let handler = request_handler(&bus, &kv);
//!
//!     handler
//!         .handle(Operation::Create, &fixtures::request_payload(&fixtures::aggregate("svc-1", 2)))
//!         .await?;
//!
//!     assert_eq!(bus.published_on("network.create").len(), 2);
//! }
//! ```

pub mod fixtures;
pub mod mocks;
pub mod reducer_test;

/// Property-based testing strategies using proptest.
pub mod properties {
    use netsaga_core::aggregate::{Aggregate, Item, ItemStatus};
    use proptest::prelude::*;

    /// Any item status.
    pub fn item_status() -> impl Strategy<Value = ItemStatus> {
        prop_oneof![
            Just(ItemStatus::Pending),
            Just(ItemStatus::Processing),
            Just(ItemStatus::Completed),
            Just(ItemStatus::Errored),
        ]
    }

    /// A valid item with a unique-enough name and a random status.
    pub fn item() -> impl Strategy<Value = Item> {
        ("[a-z]{1,8}", any::<u8>(), item_status()).prop_map(|(name, octet, status)| Item {
            range: format!("10.{octet}.0.0/24"),
            status,
            ..Item::new(name, "dc-1")
        })
    }

    /// A pending aggregate of `1..=max` valid items with distinct names.
    pub fn pending_aggregate(max: usize) -> impl Strategy<Value = Aggregate> {
        (1..=max, any::<bool>()).prop_map(|(count, sequential)| {
            let items = (0..count)
                .map(|index| Item {
                    range: format!("10.{}.0.0/24", index % 256),
                    ..Item::new(format!("net-{index}"), "dc-1")
                })
                .collect();
            Aggregate {
                sequential_processing: sequential,
                ..Aggregate::new("svc-prop", items)
            }
        })
    }
}

pub use mocks::{InMemoryEventBus, InMemoryKeyValueStore};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::properties;
    use netsaga_core::aggregate::{Aggregate, AggregateStatus, Resolution};
    use netsaga_core::reducer::Reducer;
    use netsaga_core::saga::{NetworkSaga, SagaAction};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn submit_never_completes_a_pending_aggregate(mut aggregate in properties::pending_aggregate(16)) {
            let effects = NetworkSaga.reduce(&mut aggregate, SagaAction::Submit, &crate::fixtures::create_subjects());

            prop_assert_eq!(aggregate.status, AggregateStatus::Processing);
            prop_assert!(!crate::assertions::provisioned_items(&effects).is_empty());
        }

        #[test]
        fn parallel_submit_provisions_exactly_the_pending_items(
            items in proptest::collection::vec(properties::item(), 1..8)
        ) {
            let pending: Vec<String> = items.iter().filter(|item| item.is_pending()).map(|item| item.name.clone()).collect();
            let mut aggregate = Aggregate::new("svc-prop", items);

            let effects = NetworkSaga.reduce(&mut aggregate, SagaAction::Submit, &crate::fixtures::create_subjects());

            prop_assert_eq!(crate::assertions::provisioned_items(&effects), pending);
        }

        #[test]
        fn resolve_leaves_terminal_items_untouched(mut item in properties::item()) {
            let before = item.clone();

            let changed = item.resolve(Resolution::Completed);

            prop_assert_eq!(changed, !before.is_terminal());
            if before.is_terminal() {
                prop_assert_eq!(item, before);
            } else {
                prop_assert!(item.is_terminal());
            }
        }
    }
}
