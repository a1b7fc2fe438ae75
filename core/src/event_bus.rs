//! Message bus abstraction.
//!
//! The coordinator talks to the provisioning services over subject-addressed
//! JSON messages. This module provides the [`EventBus`] trait the runtime
//! publishes through and the dispatcher subscribes with.
//!
//! # Key Principles
//!
//! - **Persist first**: handlers publish only after the aggregate is stored
//! - **At-least-once delivery**: messages may be delivered multiple times
//! - **Idempotency**: duplicate item outcomes leave the aggregate unchanged
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (netsaga-testing) - For tests
//! - `RedpandaEventBus` (netsaga-redpanda) - For production (Kafka-compatible)

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message on a subject
    #[error("Publish failed for subject '{subject}': {reason}")]
    PublishFailed {
        /// The subject that failed
        subject: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to subjects
    #[error("Subscription failed for subjects {subjects:?}: {reason}")]
    SubscriptionFailed {
        /// The subjects that failed to subscribe
        subjects: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// One message on the bus: a subject and an opaque payload.
#[derive(Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Subject the message was published on
    pub subject: String,
    /// Raw payload (JSON for every subject the coordinator uses)
    pub payload: Vec<u8>,
}

impl BusMessage {
    /// Create a message.
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
        }
    }
}

impl fmt::Debug for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusMessage")
            .field("subject", &self.subject)
            .field("size", &self.payload.len())
            .finish()
    }
}

/// Stream of messages from subscriptions.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BusMessage, EventBusError>> + Send>>;

/// Trait for bus implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so handlers can hold an `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    /// Publish a message on its subject.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the publish operation fails.
    fn publish(
        &self,
        message: &BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more subjects and receive a stream of messages.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}
