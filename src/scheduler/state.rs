//! Bookkeeping for deletions that have not fired yet.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Identifier of a scheduled deletion, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeletionId(pub u64);

impl fmt::Display for DeletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message waiting to be deleted.
///
/// Removing the entry from [`PendingDeletions`] is what claims the right to
/// delete the message, so a deletion can never fire twice.
#[derive(Debug)]
pub struct ScheduledDeletion<H> {
    /// Message to delete.
    pub handle: H,

    /// Wall-clock time the deletion is due (for logs and status).
    pub fire_at: DateTime<Utc>,

    /// Monotonic deadline the task sleeps until.
    pub deadline: Instant,

    /// Handle to the sleeping task.
    pub(super) task: AbortHandle,
}

/// Public view of a pending deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: DeletionId,
    pub fire_at: DateTime<Utc>,
}

/// Table of deletions that have been scheduled but not fired.
#[derive(Debug)]
pub struct PendingDeletions<H> {
    entries: HashMap<DeletionId, ScheduledDeletion<H>>,
    next_id: u64,
}

impl<H> Default for PendingDeletions<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<H> PendingDeletions<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next identifier.
    pub fn allocate_id(&mut self) -> DeletionId {
        let id = DeletionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Records a pending deletion.
    pub fn insert(&mut self, id: DeletionId, deletion: ScheduledDeletion<H>) {
        self.entries.insert(id, deletion);
    }

    /// Claims a pending deletion. Returns `None` if it already fired or was cancelled.
    pub fn take(&mut self, id: DeletionId) -> Option<ScheduledDeletion<H>> {
        self.entries.remove(&id)
    }

    /// Claims every pending deletion, earliest first.
    pub fn take_all(&mut self) -> Vec<(DeletionId, ScheduledDeletion<H>)> {
        let mut all: Vec<_> = self.entries.drain().collect();
        all.sort_by_key(|(id, d)| (d.deadline, *id));
        all
    }

    /// Number of deletions still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of pending deletions, earliest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingEntry> {
        let mut view: Vec<_> = self
            .entries
            .iter()
            .map(|(id, d)| (d.deadline, PendingEntry { id: *id, fire_at: d.fire_at }))
            .collect();
        view.sort_by_key(|(deadline, entry)| (*deadline, entry.id));
        view.into_iter().map(|(_, entry)| entry).collect()
    }
}
