//! Message routing.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::types::BotCommand;
use crate::dialogue::{
    ConversationState, ConversationStore, DialogueController, DurationSpec, Outcome,
};
use crate::scheduler::DeletionScheduler;
use crate::telegram::{IncomingMessage, MessageTransport, TransportError};

/// Entry point for every inbound message.
///
/// Owns the conversation store and the dialogue controller. Built once at
/// startup and shared by reference with every handler task.
pub struct CommandRouter<T: MessageTransport> {
    /// Per-user dialogue state.
    store: ConversationStore,

    /// Stage transitions and replies.
    dialogue: DialogueController<T>,
}

impl<T: MessageTransport> CommandRouter<T> {
    /// Creates a router around a shared transport.
    ///
    /// `default_delete_after` applies to plain messages outside a dialogue;
    /// `None` ignores them.
    #[must_use]
    pub fn new(transport: Arc<T>, default_delete_after: Option<DurationSpec>) -> Self {
        let scheduler = DeletionScheduler::new(Arc::clone(&transport));
        Self {
            store: ConversationStore::new(),
            dialogue: DialogueController::new(transport, scheduler, default_delete_after),
        }
    }

    /// Handles one inbound message from start to finish.
    ///
    /// The sender's state stays locked for the whole call, so two messages
    /// from the same user are processed one after the other.
    ///
    /// # Errors
    ///
    /// Returns the transport error if a reply or echo could not be sent.
    pub async fn route(
        &self,
        message: &IncomingMessage<T::Chat>,
    ) -> Result<Outcome, TransportError> {
        let mut state = self.store.lock(message.user).await;

        let result = self.dispatch(message, &mut state).await;
        if let Ok(outcome) = &result {
            debug!(
                "User {} now {} after {:?}",
                message.user,
                state.stage.name(),
                outcome
            );
        }

        self.store.release(state).await;
        result
    }

    async fn dispatch(
        &self,
        message: &IncomingMessage<T::Chat>,
        state: &mut ConversationState,
    ) -> Result<Outcome, TransportError> {
        let chat = &message.chat;
        match BotCommand::parse(&message.text) {
            Some(command) => {
                debug!("Handling command {} from user {}", command, message.user);
                self.dialogue
                    .handle_command(chat, state, command, &message.sender_name)
                    .await
            }
            None => self.dialogue.handle_text(chat, state, &message.text).await,
        }
    }

    /// Routes `message` on its own task, tracked in `handlers`.
    ///
    /// Failures are logged; nothing is reported back to the caller.
    pub fn spawn_route(
        self: &Arc<Self>,
        handlers: &mut JoinSet<()>,
        message: IncomingMessage<T::Chat>,
    ) {
        let router = Arc::clone(self);
        handlers.spawn(async move {
            match router.route(&message).await {
                Ok(outcome) => debug!("Message from user {} handled: {:?}", message.user, outcome),
                Err(e) => error!("Failed to handle message from user {}: {}", message.user, e),
            }
        });
    }

    /// Conversation state of every user.
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Scheduler for deferred deletions.
    #[must_use]
    pub fn scheduler(&self) -> &DeletionScheduler<T> {
        self.dialogue.scheduler()
    }

    /// Stops the router, optionally deleting everything still pending.
    ///
    /// Waits for the in-flight `handlers` first, so nothing they schedule
    /// is missed by the flush. Returns the number of messages deleted.
    pub async fn shutdown(&self, mut handlers: JoinSet<()>, flush: bool) -> usize {
        if !handlers.is_empty() {
            info!("Waiting for {} message handler(s) to finish", handlers.len());
        }
        while let Some(result) = handlers.join_next().await {
            if let Err(e) = result {
                warn!("Message handler did not finish: {}", e);
            }
        }

        let pending = self.scheduler().pending().await;
        if flush {
            self.scheduler().flush().await
        } else {
            if pending > 0 {
                info!("Leaving {} pending deletion(s) behind", pending);
            }
            0
        }
    }
}

impl<T: MessageTransport> std::fmt::Debug for CommandRouter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("dialogue", &self.dialogue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::dialogue::{ASK_CONTENT, ASK_DURATION, CANCELLED, NO_ACTIVE_SESSION, Stage};
    use crate::telegram::UserId;
    use crate::telegram::mock::MockTransport;

    fn router(default: Option<u64>) -> (Arc<MockTransport>, Arc<CommandRouter<MockTransport>>) {
        let transport = Arc::new(MockTransport::new());
        let router = CommandRouter::new(
            Arc::clone(&transport),
            default.map(DurationSpec::from_secs),
        );
        (transport, Arc::new(router))
    }

    fn msg(user: i64, text: &str) -> IncomingMessage<i64> {
        IncomingMessage {
            chat: user,
            user: UserId(user),
            sender_name: format!("user{user}"),
            text: text.to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_happy_path() {
        let (transport, router) = router(None);
        let user = UserId(1);

        router.route(&msg(1, "/setup")).await.unwrap();
        assert_eq!(router.store().get(user).await.stage, Stage::AwaitingDuration);
        assert_eq!(transport.last_text(1).as_deref(), Some(ASK_DURATION));

        router.route(&msg(1, "15s")).await.unwrap();
        let state = router.store().get(user).await;
        assert_eq!(state.pending_duration_secs(), Some(15));
        assert_eq!(transport.last_text(1).as_deref(), Some(ASK_CONTENT));

        let outcome = router.route(&msg(1, "hello")).await.unwrap();
        assert!(matches!(outcome, Outcome::Scheduled { .. }));
        assert_eq!(transport.last_text(1).as_deref(), Some("hello"));

        // Back to idle before the deletion happens.
        assert!(router.store().get(user).await.is_idle());
        assert_eq!(router.scheduler().pending().await, 1);
        assert!(transport.deleted().is_empty());

        tokio::time::sleep(Duration::from_secs(16)).await;
        let echo_id = transport.sent().last().map(|s| s.id).unwrap();
        assert_eq!(transport.deleted().len(), 1);
        assert_eq!(transport.deleted()[0].id, echo_id);
        assert!(router.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let (transport, router) = router(None);

        let outcome = router.route(&msg(1, "/cancel")).await.unwrap();

        assert_eq!(outcome, Outcome::NothingToCancel);
        assert_eq!(transport.last_text(1).as_deref(), Some(NO_ACTIVE_SESSION));
        assert!(router.store().get(UserId(1)).await.is_idle());
    }

    #[tokio::test]
    async fn test_cancel_mid_dialogue() {
        let (transport, router) = router(None);

        router.route(&msg(1, "/setup")).await.unwrap();
        router.route(&msg(1, "/cancel")).await.unwrap();
        assert!(router.store().get(UserId(1)).await.is_idle());
        assert_eq!(transport.last_text(1).as_deref(), Some(CANCELLED));

        router.route(&msg(1, "/setup")).await.unwrap();
        router.route(&msg(1, "2m")).await.unwrap();
        router.route(&msg(1, "/cancel")).await.unwrap();
        let state = router.store().get(UserId(1)).await;
        assert!(state.is_idle());
        assert!(state.pending_duration_secs().is_none());
        assert_eq!(router.scheduler().pending().await, 0);
    }

    #[tokio::test]
    async fn test_finished_dialogues_leave_no_state() {
        let (_transport, router) = router(None);

        for user in 1..=50 {
            router.route(&msg(user, "/setup")).await.unwrap();
        }
        assert_eq!(router.store().len().await, 50);

        for user in 1..=50 {
            router.route(&msg(user, "/cancel")).await.unwrap();
        }
        assert_eq!(router.store().len().await, 0);

        // Replies that leave the user idle do not create entries either.
        router.route(&msg(1, "/help")).await.unwrap();
        router.route(&msg(1, "/cancel")).await.unwrap();
        assert!(router.store().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_duration_allows_retry() {
        let (transport, router) = router(None);

        router.route(&msg(1, "/setup")).await.unwrap();
        let outcome = router.route(&msg(1, "soon")).await.unwrap();
        assert!(matches!(outcome, Outcome::DurationRejected(_)));
        assert_eq!(router.store().get(UserId(1)).await.stage, Stage::AwaitingDuration);
        assert!(transport.last_text(1).unwrap().contains("no valid time units"));

        router.route(&msg(1, "1h")).await.unwrap();
        assert_eq!(
            router.store().get(UserId(1)).await.pending_duration_secs(),
            Some(3_600)
        );
    }

    #[tokio::test]
    async fn test_start_and_help_do_not_change_stage() {
        let (transport, router) = router(None);

        router.route(&msg(1, "/setup")).await.unwrap();
        router.route(&msg(1, "/start")).await.unwrap();
        router.route(&msg(1, "/help")).await.unwrap();

        assert_eq!(router.store().get(UserId(1)).await.stage, Stage::AwaitingDuration);
        assert_eq!(transport.sent_texts(1).len(), 3);
    }

    #[tokio::test]
    async fn test_setup_restarts_dialogue() {
        let (_transport, router) = router(None);

        router.route(&msg(1, "/setup")).await.unwrap();
        router.route(&msg(1, "30s")).await.unwrap();
        router.route(&msg(1, "/setup")).await.unwrap();

        let state = router.store().get(UserId(1)).await;
        assert_eq!(state.stage, Stage::AwaitingDuration);
        assert!(state.pending_duration_secs().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_text_uses_default_delay() {
        let (transport, router) = router(Some(60));

        let outcome = router.route(&msg(1, "just passing by")).await.unwrap();

        assert!(matches!(outcome, Outcome::Scheduled { delay, .. } if delay.total_seconds() == 60));
        assert_eq!(transport.last_text(1).as_deref(), Some("just passing by"));
        assert!(router.store().get(UserId(1)).await.is_idle());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(transport.deleted().len(), 1);
    }

    #[tokio::test]
    async fn test_free_text_ignored_without_default() {
        let (transport, router) = router(None);

        let outcome = router.route(&msg(1, "hello")).await.unwrap();

        assert_eq!(outcome, Outcome::Ignored);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failed_echo_is_reported() {
        let (transport, router) = router(Some(10));
        transport.fail_sends.store(true, Ordering::SeqCst);

        let result = router.route(&msg(1, "hello")).await;

        assert!(result.is_err());
        assert_eq!(router.scheduler().pending().await, 0);
        assert!(router.store().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_deletion_is_invisible() {
        let (transport, router) = router(None);
        transport.fail_deletes.store(true, Ordering::SeqCst);

        router.route(&msg(1, "/setup")).await.unwrap();
        router.route(&msg(1, "1s")).await.unwrap();
        router.route(&msg(1, "bye")).await.unwrap();
        let sent_before = transport.sent().len();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(transport.deleted().is_empty());
        assert_eq!(transport.sent().len(), sent_before);
        assert!(router.store().get(UserId(1)).await.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_users_are_isolated() {
        let (transport, router) = router(None);

        let mut tasks = Vec::new();
        for user in 1..=20_i64 {
            let router = Arc::clone(&router);
            tasks.push(tokio::spawn(async move {
                router.route(&msg(user, "/setup")).await.unwrap();
                router.route(&msg(user, &format!("{user}m"))).await.unwrap();
                router.store().get(UserId(user)).await
            }));
        }

        for (i, task) in tasks.into_iter().enumerate() {
            let state = task.await.unwrap();
            let user = i64::try_from(i).unwrap() + 1;
            assert_eq!(state.user, UserId(user));
            assert_eq!(
                state.pending_duration_secs(),
                Some(u64::try_from(user).unwrap() * 60)
            );
            assert_eq!(transport.sent_texts(user), vec![ASK_DURATION, ASK_CONTENT]);
        }
        assert_eq!(router.store().active_count().await, 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_user_messages_are_serialized() {
        let (_transport, router) = router(None);
        router.route(&msg(1, "/setup")).await.unwrap();

        // A cancel racing with a duration: whichever runs second sees the
        // first one's result, never a half-applied state.
        let a = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.route(&msg(1, "10s")).await.unwrap() })
        };
        let b = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.route(&msg(1, "/cancel")).await.unwrap() })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        let state = router.store().get(UserId(1)).await;
        match (a, b) {
            // Duration first, then cancel.
            (Outcome::DurationAccepted(_), Outcome::Cancelled) => assert!(state.is_idle()),
            // Cancel first; the duration text then arrives while idle.
            (Outcome::Ignored, Outcome::Cancelled) => assert!(state.is_idle()),
            other => panic!("unexpected interleaving: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let (transport, router) = router(Some(3_600));

        router.route(&msg(1, "one")).await.unwrap();
        router.route(&msg(2, "two")).await.unwrap();
        assert_eq!(router.scheduler().pending().await, 2);

        assert_eq!(router.shutdown(JoinSet::new(), true).await, 2);
        assert_eq!(transport.deleted().len(), 2);
        assert_eq!(router.shutdown(JoinSet::new(), false).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_handlers() {
        let (transport, router) = router(Some(3_600));
        let mut handlers = JoinSet::new();

        // Keep the user busy so the handler is still running at shutdown.
        let busy = router.store().lock(UserId(1)).await;
        router.spawn_route(&mut handlers, msg(1, "late"));
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(busy);
        });

        assert_eq!(router.shutdown(handlers, true).await, 1);
        assert_eq!(transport.sent_texts(1), vec!["late"]);
        assert_eq!(transport.deleted().len(), 1);
    }
}
