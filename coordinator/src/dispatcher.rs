//! Routing of inbound bus messages to the handlers.
//!
//! ```text
//! subscribe(inbound subjects)
//!      │
//!      ▼
//! ┌──────────┐   <plural>.<op>               ┌────────────────┐
//! │  stream  │ ────────────────────────────► │ RequestHandler │
//! │          │   <singular>.<op>.done|error  ├────────────────┤
//! │          │ ────────────────────────────► │ResponseHandler │
//! └──────────┘                               └────────────────┘
//!      │ ended / failed
//!      ▼
//! sleep(resubscribe delay) ──► subscribe again
//! ```
//!
//! Every message is handled in its own task, so outcomes for the same
//! aggregate may be processed concurrently. The response handler's
//! compare-and-set writes keep that safe.

use futures::StreamExt;
use netsaga_core::aggregate::Aggregate;
use netsaga_core::event_bus::{BusMessage, EventBus, EventBusError};
use netsaga_core::subject::{Route, SubjectTable};
use netsaga_runtime::error::{HandlerError, PersistError};
use netsaga_runtime::metrics::{EventBusMetrics, HandlerMetrics};
use netsaga_runtime::{AggregateStore, EffectExecutor, RequestHandler, ResponseHandler, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(5);

/// What handling one message produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// A request was handled; the aggregate as it now stands
    Request(Aggregate),
    /// An item outcome was handled; `None` when it was dropped
    Response(Option<Aggregate>),
    /// The subject is not one the coordinator handles
    Ignored,
}

/// Subscribes to the inbound subjects and feeds the handlers.
pub struct Dispatcher {
    bus: Arc<dyn EventBus>,
    subjects: SubjectTable,
    requests: RequestHandler,
    responses: ResponseHandler,
    resubscribe_delay: Duration,
}

impl Dispatcher {
    /// Wire the handlers over one bus and one store.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, store: AggregateStore, subjects: SubjectTable, retry: RetryPolicy) -> Self {
        let executor = EffectExecutor::new(Arc::clone(&bus));
        Self {
            requests: RequestHandler::new(store.clone(), executor.clone(), subjects.clone()),
            responses: ResponseHandler::new(store, executor, subjects.clone(), retry),
            bus,
            subjects,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }

    /// Pause between subscription attempts.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Handle one message inline.
    ///
    /// # Errors
    ///
    /// Returns whatever the handler for the message's subject returned.
    pub async fn dispatch(&self, message: &BusMessage) -> Result<Dispatched, HandlerError> {
        match self.subjects.route(&message.subject) {
            Some(Route::Request(operation)) => self
                .requests
                .handle(operation, &message.payload)
                .await
                .map(Dispatched::Request),
            Some(Route::ItemDone(operation)) => self
                .responses
                .handle(operation, false, &message.payload)
                .await
                .map(Dispatched::Response),
            Some(Route::ItemError(operation)) => self
                .responses
                .handle(operation, true, &message.payload)
                .await
                .map(Dispatched::Response),
            None => {
                warn!(subject = %message.subject, "Ignoring message on unhandled subject");
                Ok(Dispatched::Ignored)
            },
        }
    }

    /// Handle one message in its own task; failures are logged and counted.
    pub fn spawn(self: &Arc<Self>, message: BusMessage) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            EventBusMetrics::record_consume(&message.subject);
            if let Err(e) = dispatcher.dispatch(&message).await {
                HandlerMetrics::record_error(e.kind());
                match e {
                    HandlerError::Persist(PersistError::MissingServiceId) => {
                        error!(subject = %message.subject, "Rejected message without service id");
                    },
                    e => error!(subject = %message.subject, error = %e, "Failed to handle message"),
                }
            }
        })
    }

    /// Subscribe once and handle messages until the stream ends.
    ///
    /// # Errors
    ///
    /// Returns the subscription error if subscribing fails.
    pub async fn run_once(self: &Arc<Self>) -> Result<(), EventBusError> {
        let inbound = self.subjects.inbound();
        let mut stream = self.bus.subscribe(&inbound).await?;
        info!(subjects = ?inbound, "Dispatcher subscribed");

        while let Some(result) = stream.next().await {
            match result {
                Ok(message) => {
                    self.spawn(message);
                },
                Err(e) => error!(error = %e, "Error receiving message from stream"),
            }
        }
        Ok(())
    }

    /// Run until the task is dropped, subscribing again whenever the stream
    /// ends or the subscription fails.
    pub async fn run(self: Arc<Self>) {
        let delay_secs = self.resubscribe_delay.as_secs_f64();
        loop {
            match self.run_once().await {
                Ok(()) => warn!(delay_secs, "Message stream ended, resubscribing"),
                Err(e) => error!(error = %e, delay_secs, "Failed to subscribe, retrying"),
            }
            tokio::time::sleep(self.resubscribe_delay).await;
        }
    }
}
