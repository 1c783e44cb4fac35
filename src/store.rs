use crate::record::{JobId, JobRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by a [`JobStore`] or the enqueue path.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error(transparent)]
    Encode(#[from] bincode::error::EncodeError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable queue the enqueue surface and the scheduler operate against.
///
/// Every operation is atomic at single-record granularity; no multi-record
/// transaction is required. `fetch_due` does not claim the records it
/// returns, so exactly one scheduler instance may run against a given
/// store.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created record.
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError>;

    /// Up to `limit` non-abandoned records with `next_try_time <= now`,
    /// ordered by priority (highest first), then by `next_try_time`
    /// (earliest first).
    async fn fetch_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Overwrite the stored record with the given mutated copy.
    async fn update(&self, record: JobRecord) -> Result<(), StoreError>;

    /// Remove a record, normally after a successful execution.
    async fn delete(&self, id: JobId) -> Result<(), StoreError>;
}
