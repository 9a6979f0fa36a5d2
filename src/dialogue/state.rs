//! Per-user conversation state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::DurationSpec;
use crate::telegram::UserId;

/// Step of the `/setup` dialogue a user is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// No dialogue in progress.
    #[default]
    Idle,

    /// Waiting for the user to type a delay.
    AwaitingDuration,

    /// Waiting for the text to echo; carries the delay already collected.
    AwaitingContent { delay: DurationSpec },
}

impl Stage {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingDuration => "awaiting_duration",
            Self::AwaitingContent { .. } => "awaiting_content",
        }
    }
}

/// Dialogue state of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationState {
    /// Owner of this state.
    pub user: UserId,

    /// Current stage, including any data collected so far.
    pub stage: Stage,
}

impl ConversationState {
    /// Creates an idle state for the given user.
    #[must_use]
    pub const fn new(user: UserId) -> Self {
        Self {
            user,
            stage: Stage::Idle,
        }
    }

    /// Whether no dialogue is in progress.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.stage, Stage::Idle)
    }

    /// Delay collected by the dialogue, present only while awaiting content.
    #[must_use]
    pub const fn pending_duration_secs(&self) -> Option<u64> {
        match self.stage {
            Stage::AwaitingContent { delay } => Some(delay.total_seconds()),
            _ => None,
        }
    }

    /// Returns to idle and forgets collected data.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
    }
}

/// Exclusive access to one user's state.
///
/// While a guard is alive no other handler can read or change the same
/// user's state; other users are unaffected.
pub type ConversationGuard = OwnedMutexGuard<ConversationState>;

/// Keyed container of conversation states.
///
/// Entries are created lazily by [`lock`](Self::lock) and dropped again by
/// [`release`](Self::release) once the user is idle and nobody else holds
/// or waits for them. The outer map lock is only held for the lookup; each
/// user has their own mutex for read-modify-write sequences that span
/// `.await` points.
///
/// Lock order is per-user state, then the map. The map lock is never held
/// while waiting for a user.
#[derive(Debug, Default)]
pub struct ConversationStore {
    users: Mutex<HashMap<UserId, Arc<Mutex<ConversationState>>>>,
}

impl ConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user: UserId) -> Arc<Mutex<ConversationState>> {
        let mut users = self.users.lock().await;
        Arc::clone(
            users
                .entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(user)))),
        )
    }

    /// Locks the user's state for the duration of one interaction.
    ///
    /// Hand the guard back through [`release`](Self::release) so idle users
    /// do not linger in the store.
    pub async fn lock(&self, user: UserId) -> ConversationGuard {
        self.slot(user).await.lock_owned().await
    }

    /// Unlocks the user's state, forgetting the user if they are idle.
    ///
    /// An entry another handler holds or is waiting for is kept.
    pub async fn release(&self, guard: ConversationGuard) {
        if !guard.is_idle() {
            return;
        }

        let user = guard.user;
        let mut users = self.users.lock().await;
        drop(guard);

        // New clones are only handed out under the map lock.
        if users.get(&user).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            users.remove(&user);
        }
    }

    /// Returns a snapshot of the user's state (idle if never seen).
    pub async fn get(&self, user: UserId) -> ConversationState {
        let slot = {
            let users = self.users.lock().await;
            users.get(&user).map(Arc::clone)
        };
        match slot {
            Some(slot) => *slot.lock().await,
            None => ConversationState::new(user),
        }
    }

    /// Replaces the user's state.
    pub async fn set(&self, user: UserId, state: ConversationState) {
        let mut guard = self.lock(user).await;
        *guard = ConversationState { user, ..state };
        self.release(guard).await;
    }

    /// Resets the user to idle, dropping collected data.
    pub async fn clear(&self, user: UserId) {
        let mut guard = self.lock(user).await;
        guard.reset();
        self.release(guard).await;
    }

    /// Number of users the store currently tracks.
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    /// Whether the store has no users.
    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }

    /// Number of users currently inside a dialogue.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<_> = self.users.lock().await.values().map(Arc::clone).collect();
        let mut active = 0;
        for slot in slots {
            if !slot.lock().await.is_idle() {
                active += 1;
            }
        }
        active
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_get_defaults_to_idle() {
        let store = ConversationStore::new();
        let state = store.get(UserId(1)).await;
        assert_eq!(state, ConversationState::new(UserId(1)));
        assert!(state.pending_duration_secs().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        let store = ConversationStore::new();
        let user = UserId(7);
        let mut state = ConversationState::new(user);
        state.stage = Stage::AwaitingContent {
            delay: DurationSpec::from_secs(15),
        };
        store.set(user, state).await;

        assert_eq!(store.get(user).await.pending_duration_secs(), Some(15));
        assert_eq!(store.active_count().await, 1);

        store.clear(user).await;
        let cleared = store.get(user).await;
        assert!(cleared.is_idle());
        assert!(cleared.pending_duration_secs().is_none());
        assert_eq!(store.active_count().await, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleared_users_are_forgotten() {
        let store = ConversationStore::new();
        for id in 0..1_000 {
            let mut state = ConversationState::new(UserId(id));
            state.stage = Stage::AwaitingDuration;
            store.set(UserId(id), state).await;
        }
        assert_eq!(store.len().await, 1_000);

        for id in 0..1_000 {
            store.clear(UserId(id)).await;
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_release_keeps_busy_user() {
        let store = ConversationStore::new();
        let mut guard = store.lock(UserId(1)).await;
        guard.stage = Stage::AwaitingDuration;
        store.release(guard).await;
        assert_eq!(store.len().await, 1);

        let mut guard = store.lock(UserId(1)).await;
        guard.reset();
        store.release(guard).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_release_keeps_entry_with_waiter() {
        let store = Arc::new(ConversationStore::new());
        let user = UserId(4);
        let guard = store.lock(user).await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut state = store.lock(user).await;
                state.stage = Stage::AwaitingDuration;
                store.release(state).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Idle, but the waiter already holds the slot.
        store.release(guard).await;
        waiter.await.unwrap();

        assert_eq!(store.get(user).await.stage, Stage::AwaitingDuration);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let store = ConversationStore::new();
        let mut a = store.lock(UserId(1)).await;
        a.stage = Stage::AwaitingDuration;

        // Another user is not blocked by the held guard.
        let b = store.get(UserId(2)).await;
        assert!(b.is_idle());
        drop(a);

        assert_eq!(store.get(UserId(1)).await.stage, Stage::AwaitingDuration);
        // Snapshots do not create entries.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_user_is_serialized() {
        let store = Arc::new(ConversationStore::new());
        let user = UserId(3);
        let guard = store.lock(user).await;

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut state = store.lock(user).await;
                state.stage = Stage::AwaitingDuration;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(store.get(user).await.stage, Stage::AwaitingDuration);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Idle.name(), "idle");
        assert_eq!(Stage::AwaitingDuration.name(), "awaiting_duration");
        let stage = Stage::AwaitingContent {
            delay: DurationSpec::from_secs(1),
        };
        assert_eq!(stage.name(), "awaiting_content");
    }
}
