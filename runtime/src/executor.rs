//! Effect execution.
//!
//! The executor turns the reducer's effect descriptions into bus messages.
//! It runs only after the aggregate has been persisted.

use crate::error::HandlerError;
use crate::metrics::EventBusMetrics;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use netsaga_core::effect::Effect;
use netsaga_core::event_bus::{BusMessage, EventBus};
use std::sync::Arc;
use std::time::Instant;

/// Publishes effects through an [`EventBus`].
#[derive(Clone)]
pub struct EffectExecutor {
    bus: Arc<dyn EventBus>,
}

impl EffectExecutor {
    /// Create an executor over a bus.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Execute every effect in order.
    ///
    /// Returns the number of messages published.
    ///
    /// # Errors
    ///
    /// Returns the first encode or publish failure. Messages published
    /// before the failure stay published.
    pub async fn execute(&self, effects: Vec<Effect>) -> Result<usize, HandlerError> {
        let mut published = 0;
        for effect in effects {
            published += self.execute_effect(effect).await?;
        }
        Ok(published)
    }

    fn execute_effect(&self, effect: Effect) -> BoxFuture<'_, Result<usize, HandlerError>> {
        async move {
            match effect {
                Effect::None => Ok(0),
                Effect::Publish { subject, event } => {
                    let message = BusMessage::new(subject, event.encode()?);
                    self.publish(&message).await?;
                    Ok(1)
                },
                Effect::Parallel(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Parallel");
                    let counts = try_join_all(effects.into_iter().map(|effect| self.execute_effect(effect))).await?;
                    Ok(counts.into_iter().sum())
                },
                Effect::Sequential(effects) => {
                    tracing::trace!(count = effects.len(), "Executing Effect::Sequential");
                    let mut published = 0;
                    for effect in effects {
                        published += self.execute_effect(effect).await?;
                    }
                    Ok(published)
                },
            }
        }
        .boxed()
    }

    async fn publish(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let started = Instant::now();
        match self.bus.publish(message).await {
            Ok(()) => {
                EventBusMetrics::record_publish(&message.subject, started.elapsed());
                tracing::debug!(subject = %message.subject, size = message.payload.len(), "Published message");
                Ok(())
            },
            Err(error) => {
                EventBusMetrics::record_publish_error(&message.subject);
                tracing::error!(subject = %message.subject, error = %error, "Failed to publish message");
                Err(error.into())
            },
        }
    }
}
