//! Plain text messages. These are either links to download, or the text of
//! a broadcast that the operator was asked for.

use crate::broadcast::{BroadcastSessions, SessionState};
use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Result};
use std::sync::Arc;
use teloxide::types::{ChatId, Message, User, UserId};

/// Commands not handled by other branches aren't treated as links
pub(crate) fn filter(msg: Message) -> bool {
    msg.from().is_some() && matches!(msg.text(), Some(text) if !text.starts_with('/'))
}

pub(crate) async fn handle(ctx: Arc<tg::Ctx>, msg: Message) -> DynResult {
    let span = info_span!(
        "handle_message",
        sender = msg.from().map(User::debug_id).as_deref(),
        chat = %msg.chat.debug_id(),
    );

    async {
        let result = handle_imp(&ctx, &msg).await;
        if let Err(err) = &result {
            tg::cmd::reply_error(&ctx, &msg, err).await;
        }
        result.map_err(Into::into)
    }
    .instrument(span)
    .await
}

async fn handle_imp(ctx: &tg::Ctx, msg: &Message) -> Result {
    let (Some(sender), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };

    match route(&ctx.sessions, sender.id, msg.chat.id) {
        Route::BroadcastText => {
            tg::cmd::operator::run_broadcast(ctx, msg, sender.id, text).await?;
        }
        Route::Download => {
            ctx.download.handle(msg.chat.id, sender.id, text).await?;
        }
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    BroadcastText,
    Download,
}

/// The text is broadcast only if it comes from the chat where the operator
/// was asked for it
fn route(sessions: &BroadcastSessions, sender: UserId, chat: ChatId) -> Route {
    match sessions.state(sender) {
        SessionState::AwaitingText { chat: prompt_chat } if prompt_chat == chat => {
            Route::BroadcastText
        }
        SessionState::Idle | SessionState::AwaitingText { .. } | SessionState::Sending => {
            Route::Download
        }
    }
}
