use crate::job::BackgroundJob;
use crate::record::{JobId, JobPriority, JobRecord};
use crate::store::{JobStore, StoreError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::instrument;

/// Knobs for a single enqueue call.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub priority: JobPriority,
    /// Wait this long before the job becomes eligible for its first
    /// attempt. Without a delay the job is due on the next poll.
    pub delay: Option<Duration>,
}

/// Producer-side surface: serializes job state and hands it to the store.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    bincode_config: bincode::config::Configuration,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            bincode_config: bincode::config::standard(),
        }
    }

    /// Enqueue a job with normal priority for immediate execution.
    pub async fn enqueue<J>(&self, state: J::State) -> Result<JobId, StoreError>
    where
        J: BackgroundJob,
    {
        self.enqueue_with::<J>(state, EnqueueOptions::default()).await
    }

    /// Enqueue a job with normal priority, delayed by `delay`.
    pub async fn enqueue_in<J>(&self, state: J::State, delay: Duration) -> Result<JobId, StoreError>
    where
        J: BackgroundJob,
    {
        self.enqueue_with::<J>(
            state,
            EnqueueOptions {
                delay: Some(delay),
                ..EnqueueOptions::default()
            },
        )
        .await
    }

    /// Enqueue a job with explicit priority and delay. Store failures
    /// propagate to the caller; the enqueue path never retries.
    #[instrument(skip_all, err, ret, fields(job_type = J::name(), payload_size))]
    pub async fn enqueue_with<J>(
        &self,
        state: J::State,
        options: EnqueueOptions,
    ) -> Result<JobId, StoreError>
    where
        J: BackgroundJob,
    {
        let payload = bincode::encode_to_vec(&state, self.bincode_config)?;
        tracing::Span::current().record("payload_size", payload.len());

        let record = JobRecord::new(J::name(), payload, options.priority, Utc::now(), options.delay);
        let id = record.id;
        self.store.insert(record).await?;

        Ok(id)
    }

    /// Remove a job that has not executed yet. Fails with
    /// [`StoreError::JobNotFound`] when no such record exists, including
    /// when the job already completed.
    #[instrument(skip(self), err)]
    pub async fn cancel(&self, id: JobId) -> Result<(), StoreError> {
        self.store.delete(id).await
    }
}
