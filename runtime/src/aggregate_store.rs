//! Aggregate persistence over a [`KeyValueStore`].
//!
//! One key per aggregate: a fixed prefix followed by the service id. The
//! record is the aggregate's JSON. Reads return the raw bytes alongside the
//! decoded value so a later write can be made conditional on them.

use crate::error::PersistError;
use crate::metrics::StoreMetrics;
use netsaga_core::aggregate::Aggregate;
use netsaga_core::codec::JsonCodec;
use netsaga_core::kv::{CasOutcome, KeyValueStore};
use std::sync::Arc;
use std::time::Instant;

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "GPBNetworks_";

/// An aggregate together with the exact bytes it was decoded from.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredAggregate {
    /// Decoded aggregate
    pub aggregate: Aggregate,
    /// Stored record, used as the compare-and-set expectation
    pub raw: Vec<u8>,
}

/// Typed access to stored aggregates.
#[derive(Clone)]
pub struct AggregateStore {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl AggregateStore {
    /// Create a store with the default key prefix.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(kv, DEFAULT_KEY_PREFIX)
    }

    /// Create a store with a custom key prefix.
    #[must_use]
    pub fn with_prefix(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    /// Store key for a service id.
    #[must_use]
    pub fn key(&self, service_id: &str) -> String {
        format!("{}{service_id}", self.prefix)
    }

    /// Load the latest aggregate for a service id.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Store`] if the store fails and
    /// [`PersistError::Codec`] if the record is not a valid aggregate.
    pub async fn load(&self, service_id: &str) -> Result<Option<StoredAggregate>, PersistError> {
        let started = Instant::now();
        let key = self.key(service_id);
        let raw = self.kv.get(&key).await?;
        StoreMetrics::record_load(started.elapsed());

        let Some(raw) = raw else {
            return Ok(None);
        };
        let aggregate = Aggregate::from_json_bytes(&raw)?;
        Ok(Some(StoredAggregate { aggregate, raw }))
    }

    /// Write the aggregate unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::MissingServiceId`] (and writes nothing) when the
    /// aggregate has no service id, or a codec/store error.
    pub async fn save(&self, aggregate: &Aggregate) -> Result<(), PersistError> {
        let key = self.key_for(aggregate)?;
        let bytes = aggregate.to_json_bytes()?;
        let started = Instant::now();
        self.kv.set(&key, bytes).await?;
        StoreMetrics::record_save(started.elapsed());
        Ok(())
    }

    /// Write the aggregate only if the record still equals `previous`.
    ///
    /// # Errors
    ///
    /// Same as [`AggregateStore::save`]. A lost race is not an error: it is
    /// reported as [`CasOutcome::Conflict`].
    pub async fn save_if_unchanged(
        &self,
        aggregate: &Aggregate,
        previous: &StoredAggregate,
    ) -> Result<CasOutcome, PersistError> {
        let key = self.key_for(aggregate)?;
        let bytes = aggregate.to_json_bytes()?;
        let started = Instant::now();
        let outcome = self
            .kv
            .compare_and_set(&key, Some(previous.raw.clone()), bytes)
            .await?;
        StoreMetrics::record_save(started.elapsed());
        if outcome == CasOutcome::Conflict {
            StoreMetrics::record_conflict();
        }
        Ok(outcome)
    }

    fn key_for(&self, aggregate: &Aggregate) -> Result<String, PersistError> {
        if aggregate.service_id.is_empty() {
            return Err(PersistError::MissingServiceId);
        }
        Ok(self.key(&aggregate.service_id))
    }
}
