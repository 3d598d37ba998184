use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Fixed-cadence pacer for outbound quote requests.
///
/// Hands out at most one permit per `interval`. Waiters queue in arrival
/// order. Idle time does not bank permits: after a quiet period exactly one
/// permit is available immediately and the cadence resumes from there.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_permit: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_permit: Mutex::new(None),
        }
    }

    /// Waits for the next fetch permit.
    ///
    /// Dropping the future before it completes gives the permit back.
    pub async fn acquire(&self) {
        let mut next_permit = self.next_permit.lock().await;
        let now = Instant::now();
        let permit_at = next_permit.map_or(now, |at| at.max(now));
        if permit_at > now {
            debug!("Waiting {:?} for a fetch permit", permit_at - now);
            sleep_until(permit_at).await;
        }
        *next_permit = Some(permit_at + self.interval);
    }
}
