//! Error types for store access and message handling.

use netsaga_core::codec::CodecError;
use netsaga_core::event_bus::EventBusError;
use netsaga_core::kv::StoreError;
use thiserror::Error;

/// Errors from [`AggregateStore`](crate::aggregate_store::AggregateStore).
#[derive(Error, Debug, Clone)]
pub enum PersistError {
    /// The aggregate has no service id, so it has no key.
    ///
    /// Nothing is written; the message carrying it is rejected.
    #[error("Aggregate has no service id")]
    MissingServiceId,

    /// The stored bytes could not be decoded, or the aggregate encoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The underlying store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by the request and response handlers.
///
/// None of these stop the coordinator: the dispatcher logs and counts them.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// Reading or writing the aggregate failed
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// A payload could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Publishing an effect failed
    #[error(transparent)]
    Bus(#[from] EventBusError),

    /// Concurrent writers kept changing the aggregate
    #[error("Aggregate '{service}' kept changing after {attempts} write attempts")]
    Conflict {
        /// Service id of the contended aggregate
        service: String,
        /// Number of write attempts made
        attempts: usize,
    },
}

impl HandlerError {
    /// Whether the error is a compare-and-set conflict worth retrying.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Persist(PersistError::MissingServiceId) => "missing_service_id",
            Self::Persist(PersistError::Codec(_)) | Self::Codec(_) => "codec",
            Self::Persist(PersistError::Store(_)) => "store",
            Self::Bus(_) => "bus",
            Self::Conflict { .. } => "conflict",
        }
    }
}
