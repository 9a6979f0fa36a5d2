//! Rate limiter for Telegram API calls.
//!
//! Spaces out sends and deletes so bursts of scheduled deletions do not
//! trip Telegram's flood protection, and honours `FLOOD_WAIT` when it
//! happens anyway.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rate limiter that enforces minimum intervals between API calls.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum duration between two calls.
    min_interval: Duration,

    /// Earliest moment the next call may go out.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the specified minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Creates a rate limiter from milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// Waits for the next free slot and takes it.
    ///
    /// Returns the duration waited (0 if no wait was needed).
    pub async fn wait_and_acquire(&self) -> Duration {
        let mut next = self.next_slot.lock().await;
        let now = Instant::now();

        let wait_duration = next.map_or(Duration::ZERO, |slot| slot.saturating_duration_since(now));

        if !wait_duration.is_zero() {
            debug!(
                "Rate limiter: waiting {:?} before next API call",
                wait_duration
            );
            tokio::time::sleep(wait_duration).await;
        }

        *next = Some(Instant::now() + self.min_interval);
        wait_duration
    }

    /// Pushes the next slot out after a flood wait from Telegram.
    ///
    /// Does not sleep; the next [`wait_and_acquire`](Self::wait_and_acquire) does.
    pub async fn handle_flood_wait(&self, wait_seconds: u32) {
        warn!(
            "Received flood wait from Telegram: {} seconds",
            wait_seconds
        );
        let until = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        let mut next = self.next_slot.lock().await;
        if next.is_none_or(|slot| slot < until) {
            *next = Some(until);
        }
    }
}
