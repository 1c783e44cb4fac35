use crate::record::JobRecord;
use crate::retry::RetryPolicy;
use crate::router::JobRouter;
use crate::store::JobStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

/// Tuning for the poll loop.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How often the store is polled for due jobs.
    pub poll_interval: Duration,
    /// Maximum records pulled per cycle.
    pub batch_size: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 1000,
        }
    }
}

/// Polls the store on a fixed period and executes whatever is due.
///
/// Records are dispatched sequentially within a cycle, in the order the
/// store returns them (priority, then due time). A failing record never
/// aborts the rest of its cycle; a failing store query aborts the cycle
/// and the next tick retries it. Nothing that happens during execution
/// terminates the loop.
pub struct JobScheduler {
    store: Arc<dyn JobStore>,
    router: JobRouter,
    retry_policy: RetryPolicy,
    options: SchedulerOptions,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        router: JobRouter,
        retry_policy: RetryPolicy,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            store,
            router,
            retry_policy,
            options,
        }
    }

    /// Run until `shutdown` completes. An in-flight cycle always finishes
    /// before the loop exits, so no job is interrupted mid-execution.
    pub async fn run_with_shutdown<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            poll_interval = ?self.options.poll_interval,
            job_types = ?self.router.job_types(),
            "job scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once(Utc::now()).await;
                }
                _ = &mut shutdown => {
                    info!("job scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Run a single poll cycle at the given instant and return how many
    /// records were dispatched. Public so hosts and tests can drive cycles
    /// with their own cadence and clock.
    #[instrument(skip(self), fields(due = tracing::field::Empty))]
    pub async fn poll_once(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.fetch_due(self.options.batch_size, now).await {
            Ok(due) => due,
            Err(error) => {
                warn!(%error, "failed to fetch due jobs, cycle skipped");
                return 0;
            }
        };
        tracing::Span::current().record("due", due.len());

        let dispatched = due.len();
        for record in due {
            self.process_record(record, now).await;
        }
        dispatched
    }

    /// One attempt for one record. Every failure mode ends in the retry
    /// policy; nothing escapes to the caller.
    #[instrument(
        skip(self, record),
        fields(job_id = %record.id, job_type = %record.job_type, try_count = record.try_count + 1)
    )]
    async fn process_record(&self, mut record: JobRecord, now: DateTime<Utc>) {
        // The attempt is counted before resolution: an unknown job type or
        // an undecodable payload burns a try like any handler error.
        record.try_count += 1;
        record.last_try_time = Some(now);

        match self.router.dispatch(&record.job_type, &record.state).await {
            Ok(()) => {
                debug!("job succeeded");
                if let Err(error) = self.store.delete(record.id).await {
                    warn!(%error, "failed to delete completed job, it may be delivered again");
                }
            }
            Err(error) => {
                warn!(%error, "job attempt failed");
                match self
                    .retry_policy
                    .next_try_time(record.try_count, record.enqueued_at, now)
                {
                    Some(next_try_time) => {
                        record.next_try_time = next_try_time;
                        debug!(%next_try_time, "job rescheduled");
                    }
                    None => {
                        record.is_abandoned = true;
                        warn!("job abandoned after exhausting its retry budget");
                    }
                }
                if let Err(error) = self.store.update(record).await {
                    warn!(%error, "failed to persist attempt, record keeps its last stored state");
                }
            }
        }
    }
}
