use async_trait::async_trait;
use chrono::{DateTime, Utc};
use estafette::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Fails every attempt before `succeed_on_try`, then succeeds.
struct FlakyJob {
    calls: Arc<AtomicU32>,
    succeed_on_try: u32,
}

#[async_trait]
impl BackgroundJob for FlakyJob {
    type State = u64;
    type Error = anyhow::Error;

    fn name() -> &'static str {
        "flaky"
    }

    async fn execute(&self, _state: Self::State) -> Result<(), Self::Error> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt < self.succeed_on_try {
            anyhow::bail!("attempt {attempt} failed");
        }
        Ok(())
    }
}

/// Appends its state to a shared log on every successful execution.
struct RecordingJob {
    executed: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl BackgroundJob for RecordingJob {
    type State = u64;
    type Error = anyhow::Error;

    fn name() -> &'static str {
        "recording"
    }

    async fn execute(&self, state: Self::State) -> Result<(), Self::Error> {
        self.executed.lock().unwrap().push(state);
        Ok(())
    }
}

fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        first_backoff: Duration::seconds(60),
        backoff_factor: 2.0,
        max_backoff: Duration::hours(1),
        max_age: Duration::days(2),
    }
}

fn scheduler_with(
    store: &MemoryJobStore,
    router: JobRouter,
    retry_policy: RetryPolicy,
) -> JobScheduler {
    JobScheduler::new(
        Arc::new(store.clone()),
        router,
        retry_policy,
        SchedulerOptions::default(),
    )
}

#[tokio::test]
async fn successful_job_is_removed_and_not_redelivered() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: 1,
    });
    let scheduler = scheduler_with(&store, router, test_policy());

    queue.enqueue::<FlakyJob>(1).await.unwrap();

    let now = Utc::now();
    assert_eq!(scheduler.poll_once(now).await, 1);
    assert!(store.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(scheduler.poll_once(now + Duration::hours(1)).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn delayed_job_waits_for_its_delay() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: 1,
    });
    let scheduler = scheduler_with(&store, router, test_policy());

    let id = queue
        .enqueue_in::<FlakyJob>(1, Duration::seconds(60))
        .await
        .unwrap();

    let now = Utc::now();
    assert_eq!(scheduler.poll_once(now).await, 0);
    assert_eq!(store.get(id).unwrap().try_count, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(scheduler.poll_once(now + Duration::seconds(61)).await, 1);
    assert!(store.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_job_is_retried_with_backoff_until_it_succeeds() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: 4,
    });
    let scheduler = scheduler_with(&store, router, test_policy());

    let id = queue.enqueue::<FlakyJob>(1).await.unwrap();

    // Attempt 1 fails; the record is rescheduled 60s out.
    let t1 = Utc::now();
    scheduler.poll_once(t1).await;
    let record = store.get(id).unwrap();
    assert_eq!(record.try_count, 1);
    assert_eq!(record.last_try_time, Some(t1));
    assert_eq!(record.next_try_time, t1 + Duration::seconds(60));
    assert!(!record.is_abandoned);

    // Not due again before its backoff elapses.
    assert_eq!(scheduler.poll_once(t1 + Duration::seconds(30)).await, 0);

    // Attempt 2 fails; backoff doubles.
    let t2 = t1 + Duration::seconds(61);
    scheduler.poll_once(t2).await;
    let record = store.get(id).unwrap();
    assert_eq!(record.try_count, 2);
    assert_eq!(record.next_try_time, t2 + Duration::seconds(120));

    // Attempt 3 fails.
    let t3 = t2 + Duration::seconds(121);
    scheduler.poll_once(t3).await;
    assert_eq!(store.get(id).unwrap().try_count, 3);

    // Attempt 4 succeeds and the record is gone.
    let t4 = t3 + Duration::seconds(241);
    assert_eq!(scheduler.poll_once(t4).await, 1);
    assert!(store.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn job_is_abandoned_after_max_attempts_and_never_refetched() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: u32::MAX,
    });
    let scheduler = scheduler_with(
        &store,
        router,
        RetryPolicy {
            max_attempts: 3,
            ..test_policy()
        },
    );

    let id = queue.enqueue::<FlakyJob>(1).await.unwrap();

    let t1 = Utc::now();
    scheduler.poll_once(t1).await;
    let t2 = t1 + Duration::seconds(61);
    scheduler.poll_once(t2).await;
    let t3 = t2 + Duration::seconds(121);
    scheduler.poll_once(t3).await;

    let record = store.get(id).expect("abandoned record is retained");
    assert!(record.is_abandoned);
    assert_eq!(record.try_count, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Abandoned records are invisible to later cycles.
    assert_eq!(scheduler.poll_once(t3 + Duration::days(30)).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_job_type_counts_as_a_failed_attempt() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));

    // No handler registered at all.
    let scheduler = scheduler_with(&store, JobRouter::default(), test_policy());

    let id = queue.enqueue::<FlakyJob>(1).await.unwrap();

    let now = Utc::now();
    assert_eq!(scheduler.poll_once(now).await, 1);

    let record = store.get(id).unwrap();
    assert_eq!(record.try_count, 1);
    assert_eq!(record.last_try_time, Some(now));
    assert_eq!(record.next_try_time, now + Duration::seconds(60));
    assert!(!record.is_abandoned);
}

#[tokio::test]
async fn one_failing_record_does_not_abort_the_cycle() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let executed = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(RecordingJob {
        executed: executed.clone(),
    });
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: u32::MAX,
    });
    let scheduler = scheduler_with(&store, router, test_policy());

    queue.enqueue::<RecordingJob>(1).await.unwrap();
    let failing = queue.enqueue::<FlakyJob>(0).await.unwrap();
    queue.enqueue::<RecordingJob>(2).await.unwrap();

    assert_eq!(scheduler.poll_once(Utc::now()).await, 3);

    let mut seen = executed.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2]);

    // Only the failing record remains, rescheduled for a later cycle.
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(failing).unwrap().try_count, 1);
}

#[tokio::test]
async fn records_run_in_priority_then_due_time_order() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let executed = Arc::new(Mutex::new(Vec::new()));

    let mut router = JobRouter::default();
    router.add_job_handler(RecordingJob {
        executed: executed.clone(),
    });
    let scheduler = scheduler_with(&store, router, test_policy());

    for (state, priority) in [
        (1, JobPriority::Low),
        (2, JobPriority::Urgent),
        (3, JobPriority::Normal),
        (4, JobPriority::High),
    ] {
        queue
            .enqueue_with::<RecordingJob>(
                state,
                EnqueueOptions {
                    priority,
                    delay: None,
                },
            )
            .await
            .unwrap();
    }

    scheduler.poll_once(Utc::now() + Duration::seconds(1)).await;
    assert_eq!(*executed.lock().unwrap(), vec![2, 4, 3, 1]);
}

/// Store wrapper whose `fetch_due` can be switched to fail.
#[derive(Clone)]
struct OutageStore {
    inner: MemoryJobStore,
    offline: Arc<AtomicBool>,
}

#[async_trait]
impl JobStore for OutageStore {
    async fn insert(&self, record: JobRecord) -> Result<(), StoreError> {
        self.inner.insert(record).await
    }

    async fn fetch_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<JobRecord>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Other(anyhow::anyhow!("store offline")));
        }
        self.inner.fetch_due(limit, now).await
    }

    async fn update(&self, record: JobRecord) -> Result<(), StoreError> {
        self.inner.update(record).await
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn fetch_failure_skips_the_cycle_and_the_next_one_recovers() {
    let inner = MemoryJobStore::new();
    let offline = Arc::new(AtomicBool::new(true));
    let store = OutageStore {
        inner: inner.clone(),
        offline: offline.clone(),
    };
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: 1,
    });
    let scheduler = JobScheduler::new(
        Arc::new(store),
        router,
        test_policy(),
        SchedulerOptions::default(),
    );

    let id = queue.enqueue::<FlakyJob>(1).await.unwrap();

    // The outage aborts the cycle without touching the record.
    let now = Utc::now();
    assert_eq!(scheduler.poll_once(now).await, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(inner.get(id).unwrap().try_count, 0);

    // Back online, the next cycle picks the job up.
    offline.store(false, Ordering::SeqCst);
    assert_eq!(scheduler.poll_once(now + Duration::seconds(5)).await, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(inner.is_empty());
}

#[tokio::test]
async fn run_with_shutdown_polls_until_the_future_completes() {
    let store = MemoryJobStore::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let mut router = JobRouter::default();
    router.add_job_handler(FlakyJob {
        calls: calls.clone(),
        succeed_on_try: 1,
    });
    let scheduler = JobScheduler::new(
        Arc::new(store.clone()),
        router,
        test_policy(),
        SchedulerOptions {
            poll_interval: std::time::Duration::from_millis(10),
            batch_size: 100,
        },
    );

    queue.enqueue::<FlakyJob>(1).await.unwrap();

    scheduler
        .run_with_shutdown(async {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}
