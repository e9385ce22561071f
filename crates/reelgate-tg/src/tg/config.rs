use serde::Deserialize;
use teloxide::types::{ChatId, UserId};

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    /// Channel the users must join before they can download anything
    pub(crate) required_channel: ChatId,

    /// Shown to the users that haven't joined the channel yet
    pub(crate) channel_invite_link: String,

    /// ID of the user, who runs the bot, and may see its stats and
    /// broadcast messages to all users
    pub(crate) operator: UserId,
}
