//! In-memory implementations of the bus and store seams.
//!
//! - [`InMemoryEventBus`]: records every published message and fans it out
//!   to matching subscribers
//! - [`InMemoryKeyValueStore`]: `HashMap`-backed store with failure and
//!   conflict injection

use futures::StreamExt;
use netsaga_core::event_bus::{BusMessage, EventBus, EventBusError, EventStream};
use netsaga_core::kv::{CasOutcome, KeyValueStore, StoreError, StoreFuture};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;

type Subscriber = (Vec<String>, mpsc::UnboundedSender<BusMessage>);

/// In-memory bus for tests.
///
/// Cloning shares the underlying state, so a clone handed to the code under
/// test can be inspected from the test.
///
/// # Example
///
/// ```
/// use netsaga_core::event_bus::{BusMessage, EventBus};
/// use netsaga_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// bus.publish(&BusMessage::new("networks.create.done", b"{}".to_vec())).await.unwrap();
///
/// assert_eq!(bus.subjects(), vec!["networks.create.done"]);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    published: Arc<RwLock<Vec<BusMessage>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every published message, in publish order.
    #[must_use]
    pub fn messages(&self) -> Vec<BusMessage> {
        self.published.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Subjects of every published message, in publish order.
    #[must_use]
    pub fn subjects(&self) -> Vec<String> {
        self.messages().into_iter().map(|message| message.subject).collect()
    }

    /// Messages published on one subject.
    #[must_use]
    pub fn published_on(&self, subject: &str) -> Vec<BusMessage> {
        self.messages()
            .into_iter()
            .filter(|message| message.subject == subject)
            .collect()
    }

    /// Forget recorded messages.
    pub fn clear(&self) {
        self.published.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Make every publish fail (or succeed again).
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// End every open subscription stream.
    pub fn close_subscriptions(&self) {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Number of open subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers.len()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        message: &BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let message = message.clone();
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    subject: message.subject,
                    reason: "publishing disabled".to_string(),
                });
            }

            self.published
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.clone());

            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|(subjects, sender)| {
                if subjects.contains(&message.subject) {
                    sender.send(message.clone()).is_ok()
                } else {
                    !sender.is_closed()
                }
            });
            Ok(())
        })
    }

    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subjects: Vec<String> = subjects.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let (sender, mut receiver) = mpsc::unbounded_channel();
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((subjects, sender));

            let stream = async_stream::stream! {
                while let Some(message) = receiver.recv().await {
                    yield Ok::<_, EventBusError>(message);
                }
            };
            Ok(stream.boxed())
        })
    }
}

/// In-memory key-value store for tests.
///
/// Supports two kinds of injected trouble:
/// - [`inject_conflicts`](Self::inject_conflicts): the next `n`
///   compare-and-set calls report a conflict without writing
/// - [`set_unavailable`](Self::set_unavailable): every call fails
#[derive(Clone, Debug, Default)]
pub struct InMemoryKeyValueStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    pending_conflicts: Arc<AtomicUsize>,
    cas_calls: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value without going through the trait.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Decode a stored value as JSON.
    #[must_use]
    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        self.raw(key).and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    /// Seed a value.
    pub fn insert(&self, key: impl Into<String>, value: Vec<u8>) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value);
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `count` compare-and-set calls lose their race.
    pub fn inject_conflicts(&self, count: usize) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Compare-and-set calls made so far.
    #[must_use]
    pub fn cas_calls(&self) -> usize {
        self.cas_calls.load(Ordering::SeqCst)
    }

    /// Successful writes (plain and conditional) so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self, operation: &'static str, key: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::OperationFailed {
                operation,
                key: key.to_string(),
                reason: "store unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn take_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.check_available("get", key)?;
            Ok(self.raw(key))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.check_available("set", key)?;
            self.insert(key, value);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn compare_and_set<'a>(
        &'a self,
        key: &'a str,
        expected: Option<Vec<u8>>,
        value: Vec<u8>,
    ) -> StoreFuture<'a, CasOutcome> {
        Box::pin(async move {
            self.check_available("compare_and_set", key)?;
            self.cas_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_conflict() {
                return Ok(CasOutcome::Conflict);
            }

            let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
            if data.get(key) != expected.as_ref() {
                return Ok(CasOutcome::Conflict);
            }
            data.insert(key.to_string(), value);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(CasOutcome::Written)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_only_their_subjects() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["networks.create"]).await.unwrap();

        bus.publish(&BusMessage::new("network.create", b"skip".to_vec())).await.unwrap();
        bus.publish(&BusMessage::new("networks.create", b"take".to_vec())).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.payload, b"take");
        assert_eq!(bus.subjects(), vec!["network.create", "networks.create"]);
    }

    #[tokio::test]
    async fn closing_subscriptions_ends_streams() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe(&["a"]).await.unwrap();
        assert_eq!(bus.subscription_count(), 1);

        bus.close_subscriptions();

        assert!(stream.next().await.is_none());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn failing_bus_records_nothing() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes(true);

        let result = bus.publish(&BusMessage::new("a", vec![])).await;

        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
        assert!(bus.messages().is_empty());
    }

    #[tokio::test]
    async fn compare_and_set_checks_expected_bytes() {
        let store = InMemoryKeyValueStore::new();
        store.insert("k", b"v1".to_vec());

        let stale = store.compare_and_set("k", Some(b"v0".to_vec()), b"x".to_vec()).await.unwrap();
        let fresh = store.compare_and_set("k", Some(b"v1".to_vec()), b"v2".to_vec()).await.unwrap();
        let absent = store.compare_and_set("new", None, b"n".to_vec()).await.unwrap();

        assert_eq!(stale, CasOutcome::Conflict);
        assert_eq!(fresh, CasOutcome::Written);
        assert_eq!(absent, CasOutcome::Written);
        assert_eq!(store.raw("k").unwrap(), b"v2");
        assert_eq!(store.cas_calls(), 3);
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryKeyValueStore::new();
        store.insert("k", b"v".to_vec());
        store.inject_conflicts(1);

        let first = store.compare_and_set("k", Some(b"v".to_vec()), b"w".to_vec()).await.unwrap();
        let second = store.compare_and_set("k", Some(b"v".to_vec()), b"w".to_vec()).await.unwrap();

        assert_eq!(first, CasOutcome::Conflict);
        assert_eq!(second, CasOutcome::Written);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryKeyValueStore::new();
        store.set_unavailable(true);

        assert!(store.get("k").await.is_err());
        assert!(store.set("k", vec![]).await.is_err());
        assert!(store.is_empty());
    }
}
