use chrono::{DateTime, Duration, Utc};

/// Backoff and abandonment policy applied after a failed attempt.
///
/// A pure function of its inputs: the same `(try_count, enqueued_at,
/// last_try_time)` always yields the same answer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after which the job is abandoned.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub first_backoff: Duration,
    /// Multiplier applied to the backoff for each further attempt.
    /// Values below 1.0 are treated as 1.0.
    pub backoff_factor: f64,
    /// Upper bound on a single backoff interval.
    pub max_backoff: Duration,
    /// Total time budget, measured from when the job was enqueued.
    pub max_age: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            first_backoff: Duration::minutes(1),
            backoff_factor: 2.0,
            max_backoff: Duration::hours(1),
            max_age: Duration::days(2),
        }
    }
}

impl RetryPolicy {
    /// Next eligible time after attempt number `try_count` failed at
    /// `last_try_time`, or `None` when the job should be abandoned.
    pub fn next_try_time(
        &self,
        try_count: u32,
        enqueued_at: DateTime<Utc>,
        last_try_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if try_count >= self.max_attempts {
            return None;
        }

        let next = last_try_time + self.backoff(try_count);
        if next - enqueued_at > self.max_age {
            return None;
        }

        Some(next)
    }

    /// Backoff after `try_count` attempts: `first_backoff *
    /// backoff_factor^(try_count - 1)`, capped at `max_backoff`.
    fn backoff(&self, try_count: u32) -> Duration {
        let exponent = try_count.saturating_sub(1).min(64) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let millis = (self.first_backoff.num_milliseconds() as f64 * factor)
            .min(self.max_backoff.num_milliseconds() as f64);
        Duration::milliseconds(millis as i64)
    }
}
