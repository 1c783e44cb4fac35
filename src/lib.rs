//! Persistent background job scheduling.
//!
//! A job is enqueued as a serialized record into a [`store::JobStore`]; a
//! [`scheduler::JobScheduler`] polls the store on a fixed period, routes
//! each due record to its registered handler, deletes the record on
//! success, and applies a [`retry::RetryPolicy`] with exponential backoff
//! when an attempt fails. Jobs that exhaust their retry budget stay in the
//! store, flagged as abandoned, for later inspection.
//!
//! Stores are pluggable: [`memory::MemoryJobStore`] keeps records in
//! process, [`mongo::MongoJobStore`] (feature `mongodb`, on by default)
//! persists them to a MongoDB collection, and any other backend can
//! implement the [`store::JobStore`] trait.
//!
//! ```rust,ignore
//! use estafette::prelude::*;
//! use std::sync::Arc;
//!
//! struct SendWelcomeEmail;
//!
//! #[async_trait::async_trait]
//! impl BackgroundJob for SendWelcomeEmail {
//!     type State = String;
//!     type Error = anyhow::Error;
//!
//!     fn name() -> &'static str {
//!         "send_welcome_email"
//!     }
//!
//!     async fn execute(&self, address: Self::State) -> Result<(), Self::Error> {
//!         println!("sending welcome email to {address}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryJobStore::new());
//!
//!     let queue = JobQueue::new(store.clone());
//!     queue.enqueue::<SendWelcomeEmail>("user@example.com".into()).await?;
//!
//!     let router = {
//!         let mut r = JobRouter::default();
//!         r.add_job_handler(SendWelcomeEmail);
//!         r
//!     };
//!
//!     let scheduler = JobScheduler::new(
//!         store,
//!         router,
//!         RetryPolicy::default(),
//!         SchedulerOptions::default(),
//!     );
//!     scheduler
//!         .run_with_shutdown(async {
//!             tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod job;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod queue;
pub mod record;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod store;

/// Re-exports to simplify importing this crate's types.
pub mod prelude {
    pub use crate::job::BackgroundJob;
    pub use crate::memory::MemoryJobStore;
    #[cfg(feature = "mongodb")]
    pub use crate::mongo::MongoJobStore;
    pub use crate::queue::{EnqueueOptions, JobQueue};
    pub use crate::record::{JobId, JobPriority, JobRecord};
    pub use crate::retry::RetryPolicy;
    pub use crate::router::{ExecutionError, JobRouter};
    pub use crate::scheduler::{JobScheduler, SchedulerOptions};
    pub use crate::store::{JobStore, StoreError};
    pub use chrono::Duration;
}
