use estafette::prelude::*;
use std::sync::Arc;

struct PrintJob;

#[async_trait::async_trait]
impl BackgroundJob for PrintJob {
    type State = Vec<u32>;
    type Error = anyhow::Error;

    fn name() -> &'static str {
        "print_job"
    }

    async fn execute(&self, state: Self::State) -> Result<(), Self::Error> {
        println!("state: {state:?}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let store = Arc::new(MemoryJobStore::new());
    let queue = JobQueue::new(store.clone());

    // Add a job to run on the next poll, and one for a minute from now.
    queue.enqueue::<PrintJob>(vec![1, 2, 3]).await?;
    queue
        .enqueue_in::<PrintJob>(vec![4, 5, 6], Duration::minutes(1))
        .await?;

    let router = {
        let mut r = JobRouter::default();
        r.add_job_handler(PrintJob);
        r
    };

    let scheduler = JobScheduler::new(
        store,
        router,
        RetryPolicy::default(),
        SchedulerOptions {
            poll_interval: std::time::Duration::from_millis(250),
            batch_size: 100,
        },
    );

    // Poll until the shutdown future completes. In a real application this
    // would wait for a ctrl-c or similar signal instead of a timer.
    scheduler
        .run_with_shutdown(async {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        })
        .await;

    Ok(())
}
