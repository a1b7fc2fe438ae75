//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the coordinator:
//! - Inbound message handling (requests and item outcomes)
//! - Bus publishing
//! - Store reads, writes and compare-and-set conflicts
//! - Aggregate outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use netsaga_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Serve metrics on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address to bind to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and start serving `/metrics`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built (e.g. the address is in
    /// use) or the recorder cannot be installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this
    /// logs a warning and leaves the existing recorder in place.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        match metrics::set_global_recorder(recorder) {
            Ok(()) => {
                tokio::spawn(async move {
                    if exporter.await.is_err() {
                        tracing::error!("Metrics exporter stopped");
                    }
                });
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics server started - available at http://{}/metrics", self.addr);
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!("coordinator_requests_total", "Aggregate requests handled, by operation");
    describe_counter!("coordinator_responses_total", "Item outcomes handled, by operation and result");
    describe_counter!("coordinator_handler_errors_total", "Handler failures, by error kind");
    describe_histogram!("coordinator_handler_duration_seconds", "Time taken to handle one inbound message");

    describe_counter!("saga_provisions_published_total", "Provision events published");
    describe_counter!("saga_aggregates_completed_total", "Aggregates that reached completed");
    describe_counter!("saga_aggregates_failed_total", "Aggregates that reached error, by error code");
    describe_counter!("saga_validation_failures_total", "Requests rejected by validation");

    describe_counter!("event_bus_messages_published_total", "Messages published, by subject");
    describe_counter!("event_bus_messages_consumed_total", "Messages consumed, by subject");
    describe_counter!("event_bus_publish_errors_total", "Publish failures, by subject");
    describe_histogram!("event_bus_publish_duration_seconds", "Time taken to publish messages");

    describe_counter!("store_conflicts_total", "Compare-and-set writes that lost a race");
    describe_histogram!("store_load_duration_seconds", "Time taken to load an aggregate");
    describe_histogram!("store_save_duration_seconds", "Time taken to save an aggregate");
}

/// Inbound handling metrics recorder.
pub struct HandlerMetrics;

impl HandlerMetrics {
    /// Record a handled request.
    pub fn record_request(operation: &'static str, duration: Duration) {
        counter!("coordinator_requests_total", "operation" => operation).increment(1);
        histogram!("coordinator_handler_duration_seconds", "handler" => "request").record(duration.as_secs_f64());
    }

    /// Record a handled item outcome.
    pub fn record_response(operation: &'static str, failed: bool, duration: Duration) {
        let result = if failed { "error" } else { "done" };
        counter!("coordinator_responses_total", "operation" => operation, "result" => result).increment(1);
        histogram!("coordinator_handler_duration_seconds", "handler" => "response").record(duration.as_secs_f64());
    }

    /// Record a handler failure.
    pub fn record_error(kind: &'static str) {
        counter!("coordinator_handler_errors_total", "kind" => kind).increment(1);
    }
}

/// Saga outcome metrics recorder.
pub struct SagaMetrics;

impl SagaMetrics {
    /// Record provision events leaving the coordinator.
    pub fn record_provisions(count: usize) {
        counter!("saga_provisions_published_total").increment(count as u64);
    }

    /// Record an aggregate reaching `completed`.
    pub fn record_completed() {
        counter!("saga_aggregates_completed_total").increment(1);
    }

    /// Record an aggregate reaching `error`.
    pub fn record_failed(code: &'static str) {
        counter!("saga_aggregates_failed_total", "code" => code).increment(1);
    }

    /// Record a request rejected by validation.
    pub fn record_validation_failure() {
        counter!("saga_validation_failures_total").increment(1);
    }
}

/// Event bus metrics recorder.
pub struct EventBusMetrics;

impl EventBusMetrics {
    /// Record a message publish.
    pub fn record_publish(subject: &str, duration: Duration) {
        counter!("event_bus_messages_published_total", "subject" => subject.to_string()).increment(1);
        histogram!("event_bus_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a message consumption.
    pub fn record_consume(subject: &str) {
        counter!("event_bus_messages_consumed_total", "subject" => subject.to_string()).increment(1);
    }

    /// Record a publish error.
    pub fn record_publish_error(subject: &str) {
        counter!("event_bus_publish_errors_total", "subject" => subject.to_string()).increment(1);
    }
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record an aggregate load.
    pub fn record_load(duration: Duration) {
        histogram!("store_load_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an aggregate save.
    pub fn record_save(duration: Duration) {
        histogram!("store_save_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a lost compare-and-set race.
    pub fn record_conflict() {
        counter!("store_conflicts_total").increment(1);
    }
}
