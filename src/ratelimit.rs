//! Fixed-interval rate limiter for the SQL-translation collaborator
//!
//! The translation endpoint allows N requests per minute; callers must keep
//! a minimum spacing of 60/N seconds between calls. The limiter is a
//! per-process singleton: built once at startup, shared via `Arc`, and
//! passed explicitly to the one flow that needs it. It is process-local,
//! not distributed.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct FixedIntervalLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl FixedIntervalLimiter {
    /// Limiter allowing `requests_per_minute` calls, evenly spaced.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rpm = requests_per_minute.max(1);
        Self {
            min_interval: Duration::from_secs_f64(60.0 / rpm as f64),
            last_call: Mutex::new(None),
        }
    }

    /// Block the calling flow until the minimum spacing since the previous
    /// acquisition has elapsed. The slot is claimed before sleeping, so
    /// concurrent callers queue up rather than stampede.
    pub async fn acquire(&self) {
        let wait = {
            let mut last = self.last_call.lock().await;
            let now = Instant::now();
            let wait = match *last {
                Some(prev) => {
                    let ready_at = prev + self.min_interval;
                    *last = Some(ready_at.max(now));
                    ready_at.saturating_duration_since(now)
                }
                None => {
                    *last = Some(now);
                    Duration::ZERO
                }
            };
            wait
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter pacing call");
            tokio::time::sleep(wait).await;
        }
    }
}
