use async_trait::async_trait;
use bincode::{Decode, Encode};

/// A background job implementation.
///
/// The `name()` key is stored on every enqueued record and later used to
/// route the record back to this handler, so it must stay stable across
/// versions of the host application. Handlers are not resolved at enqueue
/// time; enqueueing a job whose handler is missing fails at execution and
/// is charged against the retry budget.
#[async_trait]
pub trait BackgroundJob: Send + Sync + 'static {
    /// State carried from the enqueue site to the execution site.
    type State: Encode + Decode<()> + Send + 'static;
    /// Error produced by a failed execution attempt.
    type Error: Into<anyhow::Error> + Send;

    fn name() -> &'static str
    where
        Self: Sized;

    async fn execute(&self, state: Self::State) -> Result<(), Self::Error>;
}
