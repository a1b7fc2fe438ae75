//! Handling of item outcomes (`<singular>.<op>.done` / `<singular>.<op>.error`).
//!
//! Outcomes for items of the same aggregate may be handled concurrently.
//! Every write is a compare-and-set against the bytes that were read, and a
//! lost race re-runs the whole read → reduce → write cycle, so no outcome
//! is ever overwritten by a stale copy.

use crate::aggregate_store::{AggregateStore, StoredAggregate};
use crate::error::HandlerError;
use crate::executor::EffectExecutor;
use crate::metrics::HandlerMetrics;
use crate::request::{count_provisions, record_outcome};
use crate::retry::{RetryPolicy, retry_with_predicate};
use netsaga_core::aggregate::{Aggregate, Resolution};
use netsaga_core::codec::{ItemLifecycleEvent, JsonCodec};
use netsaga_core::effect::Effect;
use netsaga_core::kv::CasOutcome;
use netsaga_core::reducer::Reducer;
use netsaga_core::saga::{NetworkSaga, SagaAction};
use netsaga_core::subject::{Operation, SubjectTable, Subjects};
use std::time::Instant;

/// Records item outcomes and advances the owning aggregate.
#[derive(Clone)]
pub struct ResponseHandler {
    store: AggregateStore,
    executor: EffectExecutor,
    subjects: SubjectTable,
    retry: RetryPolicy,
}

/// What one successful pass decided.
struct Pass {
    aggregate: Aggregate,
    effects: Vec<Effect>,
}

impl ResponseHandler {
    /// Create a response handler.
    #[must_use]
    pub const fn new(
        store: AggregateStore,
        executor: EffectExecutor,
        subjects: SubjectTable,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            executor,
            subjects,
            retry,
        }
    }

    /// Handle one item outcome; `failed` is true on the error subject.
    ///
    /// Returns the aggregate as stored after handling, or `None` when the
    /// event was dropped (undecodable body, or no stored aggregate).
    ///
    /// # Errors
    ///
    /// Returns a store, codec or bus error, or [`HandlerError::Conflict`]
    /// once the retry policy is exhausted.
    #[tracing::instrument(skip(self, payload), fields(service, item))]
    pub async fn handle(
        &self,
        operation: Operation,
        failed: bool,
        payload: &[u8],
    ) -> Result<Option<Aggregate>, HandlerError> {
        let started = Instant::now();

        let event = match ItemLifecycleEvent::from_json_bytes(payload) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(error = %error, "Dropping undecodable item outcome");
                return Ok(None);
            },
        };
        let span = tracing::Span::current();
        span.record("service", event.service.as_str());
        span.record("item", event.network_name.as_str());

        let subjects = self.subjects.get(operation);
        let resolution = event.resolution(failed);

        let pass = retry_with_predicate(
            self.retry.clone(),
            || self.attempt(subjects, &event, resolution.clone()),
            HandlerError::is_conflict,
        )
        .await?;

        let Some(Pass { aggregate, effects }) = pass else {
            return Ok(None);
        };

        let provisions = count_provisions(&effects);
        let published = self.executor.execute(effects).await?;
        if published > 0 {
            record_outcome(&aggregate, provisions);
        }
        HandlerMetrics::record_response(operation.as_str(), failed, started.elapsed());
        tracing::info!(status = %aggregate.status, published, "Item outcome handled");
        Ok(Some(aggregate))
    }

    /// One read → reduce → conditional write cycle.
    async fn attempt(
        &self,
        subjects: &Subjects,
        event: &ItemLifecycleEvent,
        resolution: Resolution,
    ) -> Result<Option<Pass>, HandlerError> {
        let Some(stored) = self.store.load(&event.service).await? else {
            tracing::warn!("No aggregate stored for this service, dropping item outcome");
            return Ok(None);
        };

        let StoredAggregate { aggregate: before, .. } = &stored;
        let mut aggregate = before.clone();
        let effects = NetworkSaga.reduce(
            &mut aggregate,
            SagaAction::Resolve {
                name: event.network_name.clone(),
                resolution,
            },
            subjects,
        );

        if aggregate == *before {
            return Ok(Some(Pass { aggregate, effects }));
        }

        match self.store.save_if_unchanged(&aggregate, &stored).await? {
            CasOutcome::Written => Ok(Some(Pass { aggregate, effects })),
            CasOutcome::Conflict => Err(HandlerError::Conflict {
                service: aggregate.service_id,
                attempts: self.retry.max_attempts(),
            }),
        }
    }
}
