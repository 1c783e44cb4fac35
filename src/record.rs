use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a persisted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Execution priority. Within a poll cycle, higher priorities are
/// dispatched first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl JobPriority {
    /// Ordinal encoding used by stores that persist priority as a number.
    pub fn as_i64(self) -> i64 {
        match self {
            JobPriority::Low => 0,
            JobPriority::Normal => 1,
            JobPriority::High => 2,
            JobPriority::Urgent => 3,
        }
    }

    /// Inverse of [`as_i64`](Self::as_i64). Out-of-range values are clamped.
    pub fn from_i64(value: i64) -> Self {
        match value {
            v if v <= 0 => JobPriority::Low,
            1 => JobPriority::Normal,
            2 => JobPriority::High,
            _ => JobPriority::Urgent,
        }
    }
}

/// Durable representation of one pending unit of background work.
///
/// The store owns the persisted record; the scheduler only ever holds a
/// transient copy during a poll cycle. `id`, `job_type`, `state` and
/// `priority` never change after creation; `try_count` only increases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Key the scheduler uses to route the record back to its handler.
    pub job_type: String,
    /// Opaque serialized handler state, decoded again at execution time.
    pub state: Vec<u8>,
    pub priority: JobPriority,
    /// Attempts made so far, resolution failures included.
    pub try_count: u32,
    pub enqueued_at: DateTime<Utc>,
    /// The record becomes eligible once the current time reaches this.
    pub next_try_time: DateTime<Utc>,
    pub last_try_time: Option<DateTime<Utc>>,
    /// Terminal flag, set when the retry budget is exhausted. Abandoned
    /// records are kept for inspection and never executed again.
    pub is_abandoned: bool,
}

impl JobRecord {
    pub fn new(
        job_type: impl Into<String>,
        state: Vec<u8>,
        priority: JobPriority,
        now: DateTime<Utc>,
        delay: Option<Duration>,
    ) -> Self {
        let next_try_time = match delay {
            Some(delay) => now + delay,
            None => now,
        };

        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            state,
            priority,
            try_count: 0,
            enqueued_at: now,
            next_try_time,
            last_try_time: None,
            is_abandoned: false,
        }
    }

    /// Whether this record should be handed to the scheduler at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_abandoned && self.next_try_time <= now
    }
}
