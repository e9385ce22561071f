//! The subset of Telegram Bot API used by the download pipeline and the
//! broadcasts. It is abstracted away to make the pipeline testable.

use crate::download::OutgoingMedia;
use crate::provider::MediaKind;
use crate::tg::Bot;
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{
    ChatMemberKind, InputFile, InputMedia, InputMediaPhoto, InputMediaVideo, MessageId,
};
use teloxide::{ApiError, RequestError};

/// Membership status of a user in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberStatus {
    Member,
    Administrator,
    Creator,
    Left,
    Kicked,

    /// The user never interacted with the chat
    NotFound,
}

impl MemberStatus {
    pub(crate) fn is_joined(self) -> bool {
        match self {
            Self::Member | Self::Administrator | Self::Creator => true,
            Self::Left | Self::Kicked | Self::NotFound => false,
        }
    }

    fn from_kind(kind: &ChatMemberKind) -> Self {
        match kind {
            ChatMemberKind::Owner { .. } => Self::Creator,
            ChatMemberKind::Administrator { .. } => Self::Administrator,
            ChatMemberKind::Member { .. } => Self::Member,
            ChatMemberKind::Restricted(restricted) if restricted.is_member => Self::Member,
            ChatMemberKind::Restricted { .. } | ChatMemberKind::Left { .. } => Self::Left,
            ChatMemberKind::Banned { .. } => Self::Kicked,
        }
    }
}

#[async_trait]
pub(crate) trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId>;

    async fn send_photo(&self, chat: ChatId, file: &Path, caption: &str) -> Result;

    async fn send_video(&self, chat: ChatId, file: &Path, caption: &str) -> Result;

    /// Sends an album. Telegram requires it to have from 2 to 10 items.
    async fn send_media_group(&self, chat: ChatId, media: Vec<OutgoingMedia>) -> Result;

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result;

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result;

    async fn chat_member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus>;
}

#[async_trait]
impl ChatTransport for Bot {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        Ok(self.send_message(chat, text).await?.id)
    }

    async fn send_photo(&self, chat: ChatId, file: &Path, caption: &str) -> Result {
        let mut request = Requester::send_photo(self, chat, InputFile::file(file));
        if !caption.is_empty() {
            request = request.caption(caption);
        }
        request.await?;
        Ok(())
    }

    async fn send_video(&self, chat: ChatId, file: &Path, caption: &str) -> Result {
        let mut request = Requester::send_video(self, chat, InputFile::file(file));
        if !caption.is_empty() {
            request = request.caption(caption);
        }
        request.await?;
        Ok(())
    }

    async fn send_media_group(&self, chat: ChatId, media: Vec<OutgoingMedia>) -> Result {
        let media = media.into_iter().map(|media| {
            let file = InputFile::file(media.file);
            match media.kind {
                MediaKind::Image => {
                    let photo = InputMediaPhoto::new(file);
                    let photo = if media.caption.is_empty() {
                        photo
                    } else {
                        photo.caption(media.caption)
                    };
                    InputMedia::Photo(photo)
                }
                MediaKind::Video => {
                    let video = InputMediaVideo::new(file).supports_streaming(true);
                    let video = if media.caption.is_empty() {
                        video
                    } else {
                        video.caption(media.caption)
                    };
                    InputMedia::Video(video)
                }
            }
        });

        Requester::send_media_group(self, chat, media).await?;
        Ok(())
    }

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result {
        self.edit_message_text(chat, message, text).await?;
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result {
        Requester::delete_message(self, chat, message).await?;
        Ok(())
    }

    async fn chat_member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus> {
        match self.get_chat_member(chat, user).await {
            Ok(member) => Ok(MemberStatus::from_kind(&member.kind)),
            Err(err) if is_user_not_found(&err) => Ok(MemberStatus::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

fn is_user_not_found(err: &RequestError) -> bool {
    match err {
        RequestError::Api(ApiError::UserNotFound) => true,
        RequestError::Api(ApiError::Unknown(message)) => {
            let message = message.to_lowercase();
            message.contains("user not found") || message.contains("member not found")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership() {
        let joined = [
            MemberStatus::Member,
            MemberStatus::Administrator,
            MemberStatus::Creator,
        ];
        let not_joined = [MemberStatus::Left, MemberStatus::Kicked, MemberStatus::NotFound];

        assert!(joined.into_iter().all(MemberStatus::is_joined));
        assert!(!not_joined.into_iter().any(MemberStatus::is_joined));

        assert_eq!(MemberStatus::from_kind(&ChatMemberKind::Left), MemberStatus::Left);
    }

    #[test]
    fn user_not_found_detection() {
        assert!(is_user_not_found(&RequestError::Api(ApiError::UserNotFound)));
        assert!(is_user_not_found(&RequestError::Api(ApiError::Unknown(
            "Bad Request: member not found".to_owned()
        ))));
        assert!(!is_user_not_found(&RequestError::Api(ApiError::BotBlocked)));
    }
}
