//! Handling of inbound aggregate requests (`<plural>.<op>`).

use crate::aggregate_store::AggregateStore;
use crate::error::HandlerError;
use crate::executor::EffectExecutor;
use crate::metrics::{HandlerMetrics, SagaMetrics};
use netsaga_core::aggregate::{Aggregate, AggregateStatus, ErrorCode};
use netsaga_core::codec::JsonCodec;
use netsaga_core::effect::{Effect, OutboundEvent};
use netsaga_core::reducer::Reducer;
use netsaga_core::saga::{NetworkSaga, SagaAction};
use netsaga_core::subject::{Operation, SubjectTable};
use std::time::Instant;

/// Validates a new aggregate, records it and dispatches its first items.
#[derive(Clone)]
pub struct RequestHandler {
    store: AggregateStore,
    executor: EffectExecutor,
    subjects: SubjectTable,
}

impl RequestHandler {
    /// Create a request handler.
    #[must_use]
    pub const fn new(store: AggregateStore, executor: EffectExecutor, subjects: SubjectTable) -> Self {
        Self {
            store,
            executor,
            subjects,
        }
    }

    /// Handle one request payload.
    ///
    /// 1. Decode the aggregate (an undecodable body becomes an empty aggregate)
    /// 2. Store it as received
    /// 3. Run [`SagaAction::Submit`]
    /// 4. Store the scheduled aggregate unless the request settled immediately
    /// 5. Publish
    ///
    /// Returns the aggregate as it stands after handling.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Persist`] with
    /// [`PersistError::MissingServiceId`](crate::error::PersistError::MissingServiceId)
    /// when the request names no service (nothing is written or published),
    /// or any store or bus failure.
    #[tracing::instrument(skip(self, payload), fields(service))]
    pub async fn handle(&self, operation: Operation, payload: &[u8]) -> Result<Aggregate, HandlerError> {
        let started = Instant::now();
        let subjects = self.subjects.get(operation);

        let mut aggregate = Aggregate::from_json_bytes(payload).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Undecodable request, continuing with an empty aggregate");
            Aggregate::default()
        });
        tracing::Span::current().record("service", aggregate.service_id.as_str());

        self.store.save(&aggregate).await?;

        let effects = NetworkSaga.reduce(&mut aggregate, SagaAction::Submit, subjects);

        // A request that settles on arrival keeps the record as received.
        if !aggregate.is_terminal() {
            self.store.save(&aggregate).await?;
        }

        let provisions = count_provisions(&effects);
        self.executor.execute(effects).await?;

        record_outcome(&aggregate, provisions);
        HandlerMetrics::record_request(operation.as_str(), started.elapsed());
        tracing::info!(
            status = %aggregate.status,
            provisions,
            items = aggregate.items.len(),
            "Request handled"
        );
        Ok(aggregate)
    }
}

pub(crate) fn count_provisions(effects: &[Effect]) -> usize {
    effects
        .iter()
        .flat_map(Effect::publications)
        .filter(|(_, event)| matches!(event, OutboundEvent::Provision(_)))
        .count()
}

pub(crate) fn record_outcome(aggregate: &Aggregate, provisions: usize) {
    SagaMetrics::record_provisions(provisions);
    match (aggregate.status, aggregate.error_code) {
        (AggregateStatus::Completed, _) => SagaMetrics::record_completed(),
        (AggregateStatus::Error, Some(code)) => {
            if code == ErrorCode::Validation {
                SagaMetrics::record_validation_failure();
            }
            SagaMetrics::record_failed(code.as_str());
        },
        _ => {},
    }
}
