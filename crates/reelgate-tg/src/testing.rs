//! In-memory doubles of the external collaborators for tests

use crate::download::OutgoingMedia;
use crate::link::ContentId;
use crate::provider::{ContentProvider, FetchError, MediaItem, MediaKind};
use crate::quota::Clock;
use crate::tg::{ChatTransport, MemberStatus};
use crate::Result;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use teloxide::types::{ChatId, MessageId, UserId};
use teloxide::{ApiError, RequestError};

pub(crate) struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub(crate) fn new(year: i32, month: u32, day: u32) -> Self {
        Self {
            today: Mutex::new(NaiveDate::from_ymd_opt(year, month, day).unwrap()),
        }
    }

    pub(crate) fn advance_days(&self, days: u64) {
        let mut today = self.today.lock();
        *today = today.checked_add_days(Days::new(days)).unwrap();
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock()
    }
}

/// Media as it was sent to the chat. The file name is recorded instead of
/// the full path, because the working area has a random name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentMedia {
    pub(crate) kind: MediaKind,
    pub(crate) file_name: String,
    pub(crate) caption: String,

    /// Whether the file was present on disk at the moment of sending
    pub(crate) existed: bool,
}

impl SentMedia {
    fn new(kind: MediaKind, file: &Path, caption: &str) -> Self {
        Self {
            kind,
            file_name: file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            caption: caption.to_owned(),
            existed: file.exists(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    SendText { chat: ChatId, text: String },
    SendMedia { chat: ChatId, media: SentMedia },
    SendMediaGroup { chat: ChatId, media: Vec<SentMedia> },
    EditText { chat: ChatId, message: MessageId, text: String },
    DeleteMessage { chat: ChatId, message: MessageId },
    ChatMemberStatus { chat: ChatId, user: UserId },
}

/// Records every call. Failures are injected per recipient chat for text
/// messages, by the ordinal number for media sends and globally for deletes.
pub(crate) struct MockTransport {
    calls: Mutex<Vec<Call>>,
    member_status: Mutex<Option<MemberStatus>>,
    blocked_chats: Mutex<HashSet<ChatId>>,
    failing_media_send: Mutex<Option<usize>>,
    failing_deletes: Mutex<bool>,
    media_sends: Mutex<usize>,
    next_message_id: AtomicI32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            calls: Default::default(),
            member_status: Mutex::new(Some(MemberStatus::Member)),
            blocked_chats: Default::default(),
            failing_media_send: Default::default(),
            failing_deletes: Default::default(),
            media_sends: Default::default(),
            next_message_id: AtomicI32::new(100),
        }
    }
}

impl MockTransport {
    /// `None` makes the membership check fail with a transport error
    pub(crate) fn set_member_status(&self, status: Option<MemberStatus>) {
        *self.member_status.lock() = status;
    }

    /// Text messages sent to this chat fail as if the user blocked the bot
    pub(crate) fn block_chat(&self, chat: ChatId) {
        self.blocked_chats.lock().insert(chat);
    }

    /// Fails the media send (single or group) with the given 0-based ordinal
    pub(crate) fn fail_media_send(&self, ordinal: usize) {
        *self.failing_media_send.lock() = Some(ordinal);
    }

    pub(crate) fn fail_deletes(&self) {
        *self.failing_deletes.lock() = true;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn media_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::SendMedia { .. } | Call::SendMediaGroup { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn media_send(&self, call: Call) -> Result {
        self.record(call);

        let mut sends = self.media_sends.lock();
        let ordinal = *sends;
        *sends += 1;

        if *self.failing_media_send.lock() == Some(ordinal) {
            return Err(transport_error());
        }

        Ok(())
    }
}

fn transport_error() -> crate::Error {
    RequestError::Api(ApiError::Unknown("Bad Request: wrong file".to_owned())).into()
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        self.record(Call::SendText {
            chat,
            text: text.to_owned(),
        });

        if self.blocked_chats.lock().contains(&chat) {
            return Err(RequestError::Api(ApiError::BotBlocked).into());
        }

        Ok(MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn send_photo(&self, chat: ChatId, file: &Path, caption: &str) -> Result {
        let media = SentMedia::new(MediaKind::Image, file, caption);
        self.media_send(Call::SendMedia { chat, media })
    }

    async fn send_video(&self, chat: ChatId, file: &Path, caption: &str) -> Result {
        let media = SentMedia::new(MediaKind::Video, file, caption);
        self.media_send(Call::SendMedia { chat, media })
    }

    async fn send_media_group(&self, chat: ChatId, media: Vec<OutgoingMedia>) -> Result {
        let media = media
            .iter()
            .map(|media| SentMedia::new(media.kind, &media.file, &media.caption))
            .collect();

        self.media_send(Call::SendMediaGroup { chat, media })
    }

    async fn edit_text(&self, chat: ChatId, message: MessageId, text: &str) -> Result {
        self.record(Call::EditText {
            chat,
            message,
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, message: MessageId) -> Result {
        self.record(Call::DeleteMessage { chat, message });

        if *self.failing_deletes.lock() {
            return Err(RequestError::Api(ApiError::MessageToDeleteNotFound).into());
        }

        Ok(())
    }

    async fn chat_member_status(&self, chat: ChatId, user: UserId) -> Result<MemberStatus> {
        self.record(Call::ChatMemberStatus { chat, user });

        let status = *self.member_status.lock();
        status.ok_or_else(|| RequestError::Api(ApiError::Unknown("Bad Gateway".to_owned())).into())
    }
}

/// Serves a fixed list of media. Every downloaded payload is a short text.
pub(crate) struct MockProvider {
    items: Vec<MediaItem>,
    fetch_error: Option<fn() -> FetchError>,
    requests: Mutex<Vec<ContentId>>,
}

impl MockProvider {
    pub(crate) fn new(kinds: &[MediaKind]) -> Self {
        let items = kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| MediaItem {
                kind,
                source: format!("https://cdn.test/{i}.{}", kind.file_extension())
                    .parse()
                    .unwrap(),
            })
            .collect();

        Self {
            items,
            fetch_error: None,
            requests: Default::default(),
        }
    }

    pub(crate) fn failing(error: fn() -> FetchError) -> Self {
        Self {
            items: vec![],
            fetch_error: Some(error),
            requests: Default::default(),
        }
    }

    pub(crate) fn requests(&self) -> Vec<ContentId> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ContentProvider for MockProvider {
    async fn fetch_media(&self, content: &ContentId) -> Result<Vec<MediaItem>> {
        self.requests.lock().push(content.clone());

        if let Some(error) = self.fetch_error {
            return Err(error().into());
        }

        Ok(self.items.clone())
    }

    async fn download(&self, item: &MediaItem, dest: &Path) -> Result<u64> {
        let payload = format!("payload of {}", item.source);
        fs_err::tokio::write(dest, &payload).await?;
        Ok(payload.len() as u64)
    }
}
