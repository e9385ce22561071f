pub(crate) mod operator;
pub(crate) mod regular;

use crate::prelude::*;
use crate::util::DynResult;
use crate::{tg, Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use teloxide::types::{Message, User};

#[async_trait]
pub(crate) trait Command: fmt::Debug + Send + Sync + 'static {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result;
}

pub(crate) fn handle<'a, C: Command>(
) -> impl Fn(Arc<tg::Ctx>, Message, C) -> BoxFuture<'a, DynResult> {
    move |ctx, msg, cmd| {
        let info = info_span!(
            "handle_command",
            sender = msg.from().map(User::debug_id).as_deref(),
            chat = %msg.chat.debug_id(),
            cmd = format_args!("{cmd:#?}")
        );

        let fut = async move {
            debug!("Processing command");

            let result = cmd.handle(&ctx, &msg).await;
            if let Err(err) = &result {
                reply_error(&ctx, &msg, err).await;
            }
            result.map_err(Into::into)
        };

        Box::pin(fut.instrument(info))
    }
}

/// Tells the user what went wrong. User errors are shown as is, the rest
/// are shown only by their id, that can be looked up in the logs.
pub(crate) async fn reply_error(ctx: &tg::Ctx, msg: &Message, err: &Error) {
    let span = warn_span!("err", err = tracing_err(err), id = err.id());
    async {
        let reply_msg = if err.is_user_error() {
            format!("❌ {}", err.kind().display_chain())
        } else {
            warn!("Handler returned an error");
            format!(
                "⚠️ An error occurred. Please try again later.\n\nError id: {}",
                err.id()
            )
        };

        if let Err(err) = ctx.bot.reply_text(msg, reply_msg).await {
            warn!(
                err = tracing_err(&err),
                "Failed to reply with the error message to the user"
            );
        }
    }
    .instrument(span)
    .await
}

/// Every command is sent by a user. Only channel posts may have no sender,
/// and those never reach the command handlers.
fn sender(msg: &Message) -> Result<&User> {
    msg.from()
        .fatal_ctx(|| format!("The message {} has no sender", msg.id.0))
}
