//! # Netsaga Runtime
//!
//! The imperative shell around the pure saga in `netsaga-core`.
//!
//! ## Core Components
//!
//! - **`AggregateStore`**: key derivation and optimistic reads/writes of aggregates
//! - **`EffectExecutor`**: turns effect descriptions into bus messages
//! - **`RequestHandler`**: `<plural>.<op>` → validate, store, dispatch
//! - **`ResponseHandler`**: `<singular>.<op>.done|error` → resolve, store, advance
//!
//! Both handlers follow the same order: reduce, persist, then publish. A
//! provision event therefore never leaves the coordinator before the record
//! that expects its outcome has been written.
//!
//! ## Example
//!
//! ```ignore
//! use netsaga_runtime::{AggregateStore, EffectExecutor, RequestHandler};
//! use netsaga_core::subject::{Operation, ResourceKind, SubjectTable};
//!
//! let handler = RequestHandler::new(
//!     AggregateStore::new(kv),
//!     EffectExecutor::new(bus),
//!     SubjectTable::new(&ResourceKind::networks()),
//! );
//!
//! handler.handle(Operation::Create, &payload).await?;
//! ```

pub mod aggregate_store;
pub mod error;
pub mod executor;
pub mod request;
pub mod response;

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

pub use aggregate_store::{AggregateStore, StoredAggregate};
pub use error::{HandlerError, PersistError};
pub use executor::EffectExecutor;
pub use request::RequestHandler;
pub use response::ResponseHandler;
pub use retry::RetryPolicy;
