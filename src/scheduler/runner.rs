//! Deferred message deletion.
//!
//! Every scheduled deletion gets its own tokio task:
//! 1. The entry is recorded in the pending table (under the table lock)
//! 2. The task sleeps until the deadline
//! 3. The task claims its entry; if it is gone the deletion was cancelled or flushed
//! 4. The message is deleted; failures are logged and dropped
//!
//! The caller never waits for any of this. Deletions do not touch
//! conversation state and are not ordered relative to each other.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::{DeletionId, PendingDeletions, PendingEntry, ScheduledDeletion};
use crate::telegram::MessageTransport;

/// Schedules one-shot message deletions on a shared transport.
pub struct DeletionScheduler<T: MessageTransport> {
    /// Long-lived transport shared with the rest of the bot.
    transport: Arc<T>,

    /// Deletions that have not fired yet.
    pending: Arc<Mutex<PendingDeletions<T::Handle>>>,
}

impl<T: MessageTransport> Clone for DeletionScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T: MessageTransport> DeletionScheduler<T> {
    /// Creates a scheduler using the given transport.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(PendingDeletions::new())),
        }
    }

    /// Deletes `handle` once `delay` has elapsed, measured from now.
    ///
    /// Returns as soon as the deletion is recorded.
    pub async fn schedule(&self, handle: T::Handle, delay: Duration) -> DeletionId {
        // Held until the entry is inserted, so even a zero delay cannot
        // let the task look for its entry too early.
        let mut pending = self.pending.lock().await;

        let id = pending.allocate_id();
        let deadline = deadline_after(delay);
        let fire_at = wall_clock_after(delay);

        debug!("Scheduling deletion {} of {:?} at {}", id, handle, fire_at);

        let transport = Arc::clone(&self.transport);
        let table = Arc::clone(&self.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let claimed = table.lock().await.take(id);
            match claimed {
                Some(deletion) => {
                    delete_now(transport.as_ref(), id, &deletion.handle).await;
                }
                None => debug!("Deletion {} was already claimed", id),
            }
        });

        pending.insert(
            id,
            ScheduledDeletion {
                handle,
                fire_at,
                deadline,
                task: task.abort_handle(),
            },
        );

        id
    }

    /// Retracts a pending deletion.
    ///
    /// Returns `false` if it already fired or was never scheduled.
    pub async fn cancel(&self, id: DeletionId) -> bool {
        let claimed = self.pending.lock().await.take(id);
        match claimed {
            Some(deletion) => {
                deletion.task.abort();
                info!("Deletion {} cancelled", id);
                true
            }
            None => false,
        }
    }

    /// Fires every pending deletion immediately.
    ///
    /// Returns the number of messages actually deleted.
    pub async fn flush(&self) -> usize {
        let claimed = self.pending.lock().await.take_all();
        if claimed.is_empty() {
            return 0;
        }

        info!("Flushing {} pending deletion(s)", claimed.len());

        let mut deleted = 0;
        for (id, deletion) in claimed {
            deletion.task.abort();
            if delete_now(self.transport.as_ref(), id, &deletion.handle).await {
                deleted += 1;
            }
        }
        deleted
    }

    /// Number of deletions that have not fired yet.
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Pending deletions, earliest first.
    pub async fn pending_entries(&self) -> Vec<PendingEntry> {
        self.pending.lock().await.snapshot()
    }
}

impl<T: MessageTransport> std::fmt::Debug for DeletionScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionScheduler").finish_non_exhaustive()
    }
}

/// Best-effort delete. Returns whether it succeeded.
async fn delete_now<T: MessageTransport>(
    transport: &T,
    id: DeletionId,
    handle: &T::Handle,
) -> bool {
    match transport.delete_message(handle).await {
        Ok(()) => {
            info!("Deletion {} done: {:?}", id, handle);
            true
        }
        Err(e) => {
            warn!("Deletion {} of {:?} failed: {}", id, handle, e);
            false
        }
    }
}

/// Roughly 30 years; stands in for delays the clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
