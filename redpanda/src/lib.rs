//! Redpanda message bus for the networks coordinator.
//!
//! This crate implements the [`EventBus`] trait from `netsaga-core` on top of
//! rdkafka, so it works against Redpanda or any Kafka-compatible broker.
//!
//! # Subject mapping
//!
//! Each bus subject is one topic with the same name (`networks.create`,
//! `network.create.done`, ...). Payloads travel as-is: the coordinator and
//! the provisioners exchange JSON, and this crate never looks inside it. The
//! subject is also used as the record key, so messages on one subject stay
//! in order within their partition.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed AFTER the message reached the subscriber's channel
//! - A crash before the commit redelivers the message
//! - The coordinator tolerates this: duplicate item outcomes are no-ops
//!
//! # Example
//!
//! ```no_run
//! use netsaga_core::event_bus::{BusMessage, EventBus};
//! use netsaga_redpanda::RedpandaEventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("networks-coordinator")
//!     .build()?;
//!
//! bus.publish(&BusMessage::new("networks.create", br#"{"service":"svc-1"}"#.to_vec()))
//!     .await?;
//!
//! let mut stream = bus.subscribe(&["networks.create"]).await?;
//! while let Some(result) = stream.next().await {
//!     let message = result?;
//!     println!("{} bytes on {}", message.payload.len(), message.subject);
//! }
//! # Ok(())
//! # }
//! ```

use netsaga_core::event_bus::{BusMessage, EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redpanda-backed [`EventBus`].
///
/// One producer is shared by every publish. Each call to
/// [`subscribe`](EventBus::subscribe) creates its own consumer, owned by a
/// background task that forwards messages through a bounded channel.
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Comma-separated broker list.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Bound on a single publish, both locally and inside librdkafka.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consumer group used by subscriptions.
    ///
    /// Without an explicit group, one is derived from the sorted subjects so
    /// that restarted coordinators resume from the same offsets.
    #[must_use]
    pub fn group_for(&self, subjects: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = subjects.to_vec();
            sorted.sort();
            format!("netsaga-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated broker addresses (e.g. `localhost:9092`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgment mode: `0`, `1` or `all`. Default: `1`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec. Default: `none`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Explicit consumer group shared by every coordinator instance.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Messages buffered between a consumer and its subscriber. Default: 1000.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where new consumer groups start reading: `earliest` or `latest` (default).
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] when no brokers are set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "1".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let producer: FutureProducer = producer_config(&brokers, &acks, &compression, timeout)
            .create()
            .map_err(|e| EventBusError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        let bus = RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "latest".to_string()),
        };

        tracing::info!(
            brokers = %bus.brokers,
            acks = %acks,
            compression = %compression,
            buffer_size = bus.buffer_size,
            auto_offset_reset = %bus.auto_offset_reset,
            "RedpandaEventBus created"
        );
        Ok(bus)
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        message: &BusMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let message = message.clone();

        Box::pin(async move {
            let record = FutureRecord::to(&message.subject)
                .payload(&message.payload)
                .key(&message.subject);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        subject = %message.subject,
                        partition,
                        offset,
                        size = message.payload.len(),
                        "Message published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(subject = %message.subject, error = %kafka_error, "Failed to publish message");
                    Err(EventBusError::PublishFailed {
                        subject: message.subject,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        subjects: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subjects: Vec<String> = subjects.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let group = self.group_for(&subjects);
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                subjects: subjects.clone(),
                reason,
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            let topics: Vec<&str> = subjects.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topics)
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                subjects = ?subjects,
                consumer_group = %group,
                buffer_size = self.buffer_size,
                "Subscribed to subjects"
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(self.buffer_size);

            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                while let Some(received) = stream.next().await {
                    match received {
                        Ok(message) => {
                            // Commit only once the subscriber holds the message.
                            if tx.send(Ok(to_bus_message(&message))).await.is_err() {
                                tracing::debug!("Subscriber dropped, exiting consumer task");
                                break;
                            }
                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    subject = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (message may be redelivered)"
                                );
                            }
                        },
                        Err(e) => {
                            let error = EventBusError::TransportError(format!("Failed to receive message: {e}"));
                            if tx.send(Err(error)).await.is_err() {
                                break;
                            }
                        },
                    }
                }
                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// A record without payload becomes an empty message; the handlers treat
/// it like any other undecodable body.
/// Producer settings; librdkafka's delivery timeout matches the send timeout.
fn producer_config(brokers: &str, acks: &str, compression: &str, timeout: Duration) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", timeout.as_millis().to_string())
        .set("acks", acks)
        .set("compression.type", compression);
    config
}

fn to_bus_message(message: &BorrowedMessage<'_>) -> BusMessage {
    tracing::trace!(
        subject = message.topic(),
        partition = message.partition(),
        offset = message.offset(),
        "Received message"
    );
    BusMessage::new(message.topic(), message.payload().map(<[u8]>::to_vec).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn delivery_timeout_follows_send_timeout() {
        let config = producer_config("localhost:9092", "1", "none", Duration::from_millis(2500));
        assert_eq!(config.get("message.timeout.ms"), Some("2500"));

        let Ok(bus) = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .timeout(Duration::from_secs(12))
            .build()
        else {
            return;
        };
        assert_eq!(bus.timeout(), Duration::from_secs(12));
    }

    #[test]
    fn derived_group_does_not_depend_on_subject_order() {
        let Ok(bus) = RedpandaEventBus::new("localhost:9092") else {
            return;
        };
        let a = bus.group_for(&["networks.create".to_string(), "network.create.done".to_string()]);
        let b = bus.group_for(&["network.create.done".to_string(), "networks.create".to_string()]);

        assert_eq!(a, b);
        assert_eq!(a, "netsaga-network.create.done-networks.create");
    }

    #[test]
    fn explicit_group_wins() {
        let Ok(bus) = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("networks-coordinator")
            .build()
        else {
            return;
        };

        assert_eq!(bus.group_for(&["networks.create".to_string()]), "networks-coordinator");
    }
}
