//! Sending a message from the operator to every registered user

use crate::access::AccessError;
use crate::error::UserError;
use crate::prelude::*;
use crate::registry::UserRegistry;
use crate::tg::ChatTransport;
use crate::{err, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, UserId};

/// Delay between consecutive messages to stay within Telegram rate limits
pub(crate) const BROADCAST_PACING: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BroadcastResult {
    pub(crate) success_count: usize,
    pub(crate) failure_count: usize,
}

pub(crate) struct BroadcastEngine {
    transport: Arc<dyn ChatTransport>,
    registry: Arc<UserRegistry>,
    operator: UserId,
    pacing: Duration,
}

impl BroadcastEngine {
    pub(crate) fn new(
        transport: Arc<dyn ChatTransport>,
        registry: Arc<UserRegistry>,
        operator: UserId,
        pacing: Duration,
    ) -> Self {
        Self {
            transport,
            registry,
            operator,
            pacing,
        }
    }

    pub(crate) fn is_operator(&self, user: UserId) -> bool {
        user == self.operator
    }

    /// Sends the text to every registered user once. Failures to deliver
    /// to some of the users are counted, but never stop the broadcast.
    #[instrument(skip_all, fields(sender = sender.0))]
    pub(crate) async fn broadcast(&self, sender: UserId, text: &str) -> Result<BroadcastResult> {
        if !self.is_operator(sender) {
            return Err(err!(AccessError::NotOperator));
        }

        if text.trim().is_empty() {
            return Err(err!(UserError::EmptyBroadcastText));
        }

        let users = self.registry.all().await?;

        info!(recipients = users.len(), "Starting a broadcast");

        let mut result = BroadcastResult::default();

        for (i, &user) in users.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }

            let outcome = match self.transport.send_text(ChatId::from(user), text).await {
                Ok(_) => {
                    result.success_count += 1;
                    "ok"
                }
                Err(err) => {
                    warn!(
                        err = tracing_err(&err),
                        recipient = user.0,
                        "Failed to send a broadcast message"
                    );
                    result.failure_count += 1;
                    "err"
                }
            };

            metrics::increment_counter!("reelgate_broadcast_sends_total", "result" => outcome);
        }

        info!(
            success_count = result.success_count,
            failure_count = result.failure_count,
            "Broadcast finished"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum SessionState {
    #[default]
    Idle,

    /// `/broadcast` was issued without a text, the next message of the
    /// operator in the same chat is the text to send
    AwaitingText { chat: ChatId },

    Sending,
}

/// Broadcast conversation state of every operator
#[derive(Default)]
pub(crate) struct BroadcastSessions {
    states: Mutex<HashMap<UserId, SessionState>>,
}

impl BroadcastSessions {
    pub(crate) fn state(&self, operator: UserId) -> SessionState {
        self.states
            .lock()
            .get(&operator)
            .copied()
            .unwrap_or_default()
    }

    /// `Idle -> AwaitingText`. Repeating `/broadcast` keeps waiting for the text.
    pub(crate) fn await_text(&self, operator: UserId, chat: ChatId) -> Result {
        let mut states = self.states.lock();
        let state = states.entry(operator).or_default();

        if *state == SessionState::Sending {
            return Err(err!(UserError::BroadcastInProgress));
        }

        *state = SessionState::AwaitingText { chat };
        Ok(())
    }

    /// `AwaitingText -> Idle`
    pub(crate) fn cancel(&self, operator: UserId) -> Result {
        let mut states = self.states.lock();

        if !matches!(states.get(&operator), Some(SessionState::AwaitingText { .. })) {
            return Err(err!(UserError::NothingToCancel));
        }

        states.remove(&operator);
        Ok(())
    }

    /// `Idle | AwaitingText -> Sending`. The state returns to `Idle` when
    /// the returned guard is dropped.
    pub(crate) fn start_sending(&self, operator: UserId) -> Result<SendingGuard<'_>> {
        let mut states = self.states.lock();
        let state = states.entry(operator).or_default();

        if *state == SessionState::Sending {
            return Err(err!(UserError::BroadcastInProgress));
        }

        *state = SessionState::Sending;

        Ok(SendingGuard {
            sessions: self,
            operator,
        })
    }
}

#[must_use = "The session returns to idle state once the guard is dropped"]
pub(crate) struct SendingGuard<'a> {
    sessions: &'a BroadcastSessions,
    operator: UserId,
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.sessions.states.lock().remove(&self.operator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockTransport};
    use crate::ErrorKind;
    use assert_matches::assert_matches;
    use std::time::Instant;

    const OPERATOR: UserId = UserId(1);
    const CHAT: ChatId = ChatId(1);

    async fn setup(users: &[u64]) -> (tempfile::TempDir, Arc<MockTransport>, BroadcastEngine) {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::default());
        let registry = Arc::new(UserRegistry::new(dir.path().join("bot_users.json")));

        for &user in users {
            registry.insert(UserId(user)).await.unwrap();
        }

        let engine = BroadcastEngine::new(
            transport.clone(),
            registry,
            OPERATOR,
            Duration::from_millis(10),
        );

        (dir, transport, engine)
    }

    #[test_log::test(tokio::test)]
    async fn failures_dont_stop_the_broadcast() {
        let (_dir, transport, engine) = setup(&[10, 20, 30, 40, 50]).await;
        transport.block_chat(ChatId(20));
        transport.block_chat(ChatId(40));

        let start = Instant::now();
        let result = engine.broadcast(OPERATOR, "Hello!").await.unwrap();

        assert_eq!(
            result,
            BroadcastResult {
                success_count: 3,
                failure_count: 2,
            }
        );

        // Pacing is applied between the messages only
        assert!(start.elapsed() >= Duration::from_millis(40));

        let mut recipients: Vec<_> = transport
            .calls()
            .into_iter()
            .map(|call| match call {
                Call::SendText { chat, text } => {
                    assert_eq!(text, "Hello!");
                    chat.0
                }
                other => panic!("Unexpected call: {other:?}"),
            })
            .collect();

        recipients.sort_unstable();
        assert_eq!(recipients, [10, 20, 30, 40, 50]);
    }

    #[test_log::test(tokio::test)]
    async fn only_operator_can_broadcast() {
        let (_dir, transport, engine) = setup(&[10, 20]).await;

        let err = engine.broadcast(UserId(10), "Hello!").await.unwrap_err();

        assert_matches!(
            err.kind(),
            ErrorKind::Access {
                source: AccessError::NotOperator
            }
        );
        assert!(transport.calls().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn empty_registry_and_empty_text() {
        let (_dir, transport, engine) = setup(&[]).await;

        let result = engine.broadcast(OPERATOR, "Hello!").await.unwrap();
        assert_eq!(result, BroadcastResult::default());

        let err = engine.broadcast(OPERATOR, "  ").await.unwrap_err();
        assert!(err.is_user_error());
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn session_transitions() {
        let sessions = BroadcastSessions::default();
        let op = OPERATOR;

        assert_eq!(sessions.state(op), SessionState::Idle);
        assert!(sessions.cancel(op).is_err());

        sessions.await_text(op, CHAT).unwrap();
        assert_eq!(sessions.state(op), SessionState::AwaitingText { chat: CHAT });

        // Repeating the command moves the prompt to the latest chat
        sessions.await_text(op, ChatId(7)).unwrap();
        assert_eq!(sessions.state(op), SessionState::AwaitingText { chat: ChatId(7) });

        sessions.cancel(op).unwrap();
        assert_eq!(sessions.state(op), SessionState::Idle);

        sessions.await_text(op, CHAT).unwrap();
        let guard = sessions.start_sending(op).unwrap();
        assert_eq!(sessions.state(op), SessionState::Sending);

        // Busy while sending
        assert!(sessions.await_text(op, CHAT).is_err());
        assert!(sessions.start_sending(op).is_err());
        assert!(sessions.cancel(op).is_err());
        assert_eq!(sessions.state(op), SessionState::Sending);

        // Other operators are independent
        assert_eq!(sessions.state(UserId(2)), SessionState::Idle);

        drop(guard);
        assert_eq!(sessions.state(op), SessionState::Idle);

        // Inline text goes straight to sending
        let guard = sessions.start_sending(op).unwrap();
        assert_eq!(sessions.state(op), SessionState::Sending);
        drop(guard);
        assert_eq!(sessions.state(op), SessionState::Idle);
    }
}
