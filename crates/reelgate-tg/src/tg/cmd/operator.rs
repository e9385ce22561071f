use crate::access::AccessError;
use crate::broadcast::BroadcastResult;
use crate::prelude::*;
use crate::quota::QuotaStats;
use crate::{err, tg, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

/// Commands available only to the operator of the bot. They are not
/// registered in the bot's command list.
#[derive(BotCommands, Clone, Debug)]
#[command(
    rename_rule = "lowercase",
    description = "The following commands are available to the operator:"
)]
pub(crate) enum Cmd {
    #[command(description = "show the stats of the bot")]
    Adminstats,

    #[command(description = "send a message to all users, asks for the text if it's omitted")]
    Broadcast(String),

    #[command(description = "cancel the broadcast that waits for the text")]
    Cancel,
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let sender = tg::cmd::sender(msg)?;

        if !ctx.broadcast.is_operator(sender.id) {
            info!(user = %sender.debug_id(), "Non-operator user tried to access operator command");
            return Err(err!(AccessError::NotOperator));
        }

        match self {
            Cmd::Adminstats => {
                let total_users = ctx.registry.len().await?;
                let stats = ctx.quota.stats().await?;
                let text = admin_stats_text(
                    total_users,
                    stats,
                    ctx.quota.limit(),
                    &ctx.cfg.channel_invite_link,
                );
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Broadcast(text) => {
                if text.trim().is_empty() {
                    ctx.sessions.await_text(sender.id, msg.chat.id)?;
                    ctx.bot
                        .reply_text(
                            msg,
                            "📢 Broadcast mode\n\n\
                            Please send the message you want to broadcast to all users.\n\n\
                            Use /cancel to abort.",
                        )
                        .await?;
                } else {
                    run_broadcast(ctx, msg, sender.id, &text).await?;
                }
            }
            Cmd::Cancel => {
                ctx.sessions.cancel(sender.id)?;
                ctx.bot.reply_text(msg, "❌ Broadcast cancelled.").await?;
            }
        }

        Ok(())
    }
}

/// Sends the text to all users, keeping the operator's session busy until
/// the broadcast finishes
pub(crate) async fn run_broadcast(
    ctx: &tg::Ctx,
    msg: &Message,
    operator: UserId,
    text: &str,
) -> Result {
    let _sending = ctx.sessions.start_sending(operator)?;

    ctx.bot
        .reply_text(msg, "🚀 Broadcast started... This may take a while.")
        .await?;

    let result = ctx.broadcast.broadcast(operator, text).await?;

    ctx.bot.reply_text(msg, broadcast_report(result)).await?;

    Ok(())
}

fn broadcast_report(result: BroadcastResult) -> String {
    format!(
        "✅ Broadcast completed!\n\n\
        📤 Successfully sent: {}\n\
        ❌ Failed to send: {}",
        result.success_count, result.failure_count
    )
}

fn admin_stats_text(
    total_users: usize,
    stats: QuotaStats,
    limit: u32,
    invite_link: &str,
) -> String {
    format!(
        "📊 Bot statistics:\n\n\
        👥 Total users: {total_users}\n\
        🙋 Active users today: {}\n\
        📥 Downloads today: {}\n\
        ⚙️ Daily limit per user: {limit}\n\n\
        📢 Channel: {invite_link}",
        stats.active_users_today, stats.downloads_today,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn reports() {
        let stats = QuotaStats {
            active_users_today: 4,
            downloads_today: 9,
        };

        expect![[r#"
            📊 Bot statistics:

            👥 Total users: 17
            🙋 Active users today: 4
            📥 Downloads today: 9
            ⚙️ Daily limit per user: 10

            📢 Channel: https://t.me/reelgate"#]]
        .assert_eq(&admin_stats_text(17, stats, 10, "https://t.me/reelgate"));

        let result = BroadcastResult {
            success_count: 3,
            failure_count: 2,
        };

        expect![[r#"
            ✅ Broadcast completed!

            📤 Successfully sent: 3
            ❌ Failed to send: 2"#]]
        .assert_eq(&broadcast_report(result));
    }

    #[test]
    fn parsing() {
        let parse = |text| format!("{:?}", Cmd::parse(text, "reelgate_bot"));

        expect![[r#"Ok(Broadcast("Hello everyone"))"#]]
            .assert_eq(&parse("/broadcast Hello everyone"));
        expect![[r#"Ok(Broadcast(""))"#]].assert_eq(&parse("/broadcast"));
        expect!["Ok(Adminstats)"].assert_eq(&parse("/adminstats@reelgate_bot"));
        expect!["Ok(Cancel)"].assert_eq(&parse("/cancel"));
    }
}
