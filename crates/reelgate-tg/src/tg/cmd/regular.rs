use crate::prelude::*;
use crate::util::display::hours_minutes;
use crate::{tg, Result};
use async_trait::async_trait;
use chrono::Local;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Commands:")]
pub(crate) enum Cmd {
    #[command(description = "start the bot")]
    Start,

    #[command(description = "show this help message")]
    Help,

    #[command(description = "show your usage stats for today")]
    Stats,
}

const SUPPORTED_LINKS: &str = "🔗 Supported links:\n\
    • instagram.com/p/... (Posts)\n\
    • instagram.com/reel/... (Reels)\n\
    • instagram.com/tv/... (IGTV)";

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let sender = tg::cmd::sender(msg)?;
        let invite_link = &ctx.cfg.channel_invite_link;
        let limit = ctx.quota.limit();

        let text = match self {
            Cmd::Start => {
                if ctx.registry.insert(sender.id).await? {
                    info!(user = %sender.debug_id(), "New user started the bot");
                }
                welcome_text(invite_link, limit)
            }
            Cmd::Help => help_text(invite_link, limit),
            Cmd::Stats => {
                let used = ctx.quota.usage(sender.id).await?;
                let until_reset = Local::now().until_next_midnight();
                stats_text(used, limit, until_reset, invite_link)
            }
        };

        ctx.bot.reply_text(msg, text).await?;

        Ok(())
    }
}

fn welcome_text(invite_link: &str, limit: u32) -> String {
    format!(
        "👋 Welcome! I can download posts, reels and IGTV videos from Instagram for you.\n\n\
        📢 But first, you must join our channel: {invite_link}\n\n\
        After joining, send me the Instagram link and I'll download it for you! 📥\n\n\
        📊 Daily limit: {limit} downloads per user\n\n\
        {SUPPORTED_LINKS}"
    )
}

fn help_text(invite_link: &str, limit: u32) -> String {
    format!(
        "🤖 Send any Instagram link to download it.\n\n\
        {}\n\n\
        {SUPPORTED_LINKS}\n\n\
        ⚠️ Important:\n\
        • You must join our channel: {invite_link}\n\
        • Daily download limit: {limit} per user\n\
        • Only public posts can be downloaded",
        Cmd::descriptions()
    )
}

fn stats_text(used: u32, limit: u32, until_reset: Duration, invite_link: &str) -> String {
    format!(
        "📊 Your statistics:\n\n\
        📥 Downloads today: {used}/{limit}\n\
        ⏳ Remaining: {}\n\
        🔄 Resets in: {}\n\n\
        📢 Channel: {invite_link}",
        limit.saturating_sub(used),
        hours_minutes(until_reset),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    const INVITE_LINK: &str = "https://t.me/reelgate";

    #[test]
    fn stats() {
        let until_reset = Duration::from_secs(5 * 3600 + 7 * 60 + 30);

        expect![[r#"
            📊 Your statistics:

            📥 Downloads today: 3/10
            ⏳ Remaining: 7
            🔄 Resets in: 5h 7m

            📢 Channel: https://t.me/reelgate"#]]
        .assert_eq(&stats_text(3, 10, until_reset, INVITE_LINK));

        // The limit may be lowered by the operator after the user has
        // already used more than the new limit
        expect![[r#"
            📊 Your statistics:

            📥 Downloads today: 5/2
            ⏳ Remaining: 0
            🔄 Resets in: 0h 0m

            📢 Channel: https://t.me/reelgate"#]]
        .assert_eq(&stats_text(5, 2, Duration::ZERO, INVITE_LINK));
    }

    #[test]
    fn welcome() {
        expect![[r#"
            👋 Welcome! I can download posts, reels and IGTV videos from Instagram for you.

            📢 But first, you must join our channel: https://t.me/reelgate

            After joining, send me the Instagram link and I'll download it for you! 📥

            📊 Daily limit: 10 downloads per user

            🔗 Supported links:
            • instagram.com/p/... (Posts)
            • instagram.com/reel/... (Reels)
            • instagram.com/tv/... (IGTV)"#]]
        .assert_eq(&welcome_text(INVITE_LINK, 10));
    }
}
