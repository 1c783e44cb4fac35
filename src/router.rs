use crate::job::BackgroundJob;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Why a single execution attempt failed.
///
/// Every variant is handled inside the scheduler: an attempt failure feeds
/// the retry policy and never propagates further.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no handler registered for job type `{0}`")]
    UnknownJobType(String),
    #[error("failed to decode job state: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error(transparent)]
    Handler(anyhow::Error),
}

#[async_trait]
trait ErasedJob: Send + Sync {
    async fn execute(&self, state: &[u8]) -> Result<(), ExecutionError>;
}

/// Adapts a typed [`BackgroundJob`] to the erased dispatch interface. The
/// decoded state only lives for the duration of one attempt.
struct WrappedJob<J> {
    job: J,
    bincode_config: bincode::config::Configuration,
}

#[async_trait]
impl<J> ErasedJob for WrappedJob<J>
where
    J: BackgroundJob,
{
    async fn execute(&self, state: &[u8]) -> Result<(), ExecutionError> {
        let (state, _) = bincode::decode_from_slice(state, self.bincode_config)?;
        self.job
            .execute(state)
            .await
            .map_err(|error| ExecutionError::Handler(error.into()))
    }
}

/// Maps the `job_type` stored on a record back to a registered handler.
#[derive(Default)]
pub struct JobRouter {
    handlers: HashMap<&'static str, Box<dyn ErasedJob>>,
}

impl JobRouter {
    /// Register a handler under its [`BackgroundJob::name`]. Registering a
    /// second handler for the same name replaces the first.
    pub fn add_job_handler<J>(&mut self, job: J)
    where
        J: BackgroundJob,
    {
        let wrapped = WrappedJob {
            job,
            bincode_config: bincode::config::standard(),
        };
        if self.handlers.insert(J::name(), Box::new(wrapped)).is_some() {
            tracing::warn!(job_type = J::name(), "replaced existing handler registration");
        }
    }

    /// Job types this router can dispatch.
    pub fn job_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub(crate) async fn dispatch(
        &self,
        job_type: &str,
        state: &[u8],
    ) -> Result<(), ExecutionError> {
        let handler = self
            .handlers
            .get(job_type)
            .ok_or_else(|| ExecutionError::UnknownJobType(job_type.to_string()))?;
        handler.execute(state).await
    }
}
