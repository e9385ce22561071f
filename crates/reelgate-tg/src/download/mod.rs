//! The pipeline that serves a link sent by the user: validation, access
//! checks, fetching the media, sending it back and cleaning up.

mod delivery;
mod fetcher;
mod working_area;

use crate::access::{AccessError, AccessGate, Admission};
use crate::link::{self, ContentId};
use crate::prelude::*;
use crate::quota::QuotaTracker;
use crate::tg::ChatTransport;
use crate::error::UserError;
use crate::{ErrorKind, Result};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::types::{ChatId, MessageId, UserId};

pub(crate) use delivery::*;
pub(crate) use fetcher::*;
pub(crate) use working_area::*;

/// Final state of a download request. Used for metrics and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Outcome {
    NotALink,
    RejectedNotMember,
    RejectedQuota,
    TransportError,
    ProviderFailed,
    EmptyContent,
    DeliveryFailed,
    PartiallyDelivered,
    Delivered,
    InternalError,
}

pub(crate) struct DownloadServiceOptions {
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) gate: AccessGate,
    pub(crate) quota: Arc<QuotaTracker>,
    pub(crate) fetcher: Fetcher,
    pub(crate) downloads_root: PathBuf,
    pub(crate) invite_link: String,
    pub(crate) refund_on_failure: bool,
}

pub(crate) struct DownloadService {
    transport: Arc<dyn ChatTransport>,
    gate: AccessGate,
    quota: Arc<QuotaTracker>,
    fetcher: Fetcher,
    downloads_root: PathBuf,
    invite_link: String,
    caption: String,
    refund_on_failure: bool,
}

impl DownloadService {
    pub(crate) fn new(opts: DownloadServiceOptions) -> Self {
        let caption = format!(
            "📥 Downloaded by your bot!\n\n\
            📢 Join our channel: {}\n\
            🤖 Made with ❤️",
            opts.invite_link
        );

        Self {
            transport: opts.transport,
            gate: opts.gate,
            quota: opts.quota,
            fetcher: opts.fetcher,
            downloads_root: opts.downloads_root,
            invite_link: opts.invite_link,
            caption,
            refund_on_failure: opts.refund_on_failure,
        }
    }

    #[instrument(skip_all, fields(chat = %chat, user = user.0))]
    pub(crate) async fn handle(&self, chat: ChatId, user: UserId, text: &str) -> Result<Outcome> {
        let result = self.handle_imp(chat, user, text).await;

        let outcome: &'static str = match &result {
            Ok(outcome) => (*outcome).into(),
            Err(_) => "error",
        };

        info!(outcome, "Download request finished");
        metrics::increment_counter!("reelgate_download_requests_total", "outcome" => outcome);

        result
    }

    async fn handle_imp(&self, chat: ChatId, user: UserId, text: &str) -> Result<Outcome> {
        let Some(content) = link::classify(text) else {
            self.transport.send_text(chat, &invalid_link_text()).await?;
            return Ok(Outcome::NotALink);
        };

        let rejection = match self.gate.admit(user).await? {
            Admission::Admitted { used, limit } => {
                debug!(used, limit, "Request admitted");
                None
            }
            Admission::RejectedNotMember => {
                let err = AccessError::NotAMember {
                    invite_link: self.invite_link.clone(),
                };
                Some((Outcome::RejectedNotMember, format!("❌ {err}")))
            }
            Admission::RejectedQuota { limit } => {
                let err = AccessError::QuotaExceeded { limit };
                let text = format!(
                    "❌ {err}\n\n📢 Join our channel for updates: {}",
                    self.invite_link
                );
                Some((Outcome::RejectedQuota, text))
            }
            Admission::RejectedTransportError(err) => {
                let text = format!(
                    "⚠️ An error occurred. Please try again later.\n\nError id: {}",
                    err.id()
                );
                Some((Outcome::TransportError, text))
            }
        };

        if let Some((outcome, text)) = rejection {
            self.transport.send_text(chat, &text).await?;
            return Ok(outcome);
        }

        let result = self.serve(chat, &content).await;

        let delivered = matches!(
            result,
            Ok(Outcome::Delivered | Outcome::PartiallyDelivered)
        );

        if self.refund_on_failure && !delivered {
            if let Err(err) = self.quota.refund(user).await {
                warn!(err = tracing_err(&err), "Failed to refund the download slot");
            }
        }

        result
    }

    /// Runs the request for an admitted user, reporting the progress in a
    /// status message
    async fn serve(&self, chat: ChatId, content: &ContentId) -> Result<Outcome> {
        let status = self
            .transport
            .send_text(chat, "🔄 Processing your request...")
            .await?;

        self.transport
            .edit_text(chat, status, "📥 Downloading from Instagram...")
            .await?;

        let (outcome, text) = match self.fetch_and_deliver(chat, status, content).await {
            Ok(Delivery::Delivered { batches }) => {
                debug!(batches, "Delivered all media");
                self.report_success(chat, status).await;
                return Ok(Outcome::Delivered);
            }
            Ok(Delivery::PartiallyDelivered {
                delivered_batches,
                error,
            }) => {
                let text = format!(
                    "⚠️ Only {delivered_batches} part(s) of the post were sent, \
                    the rest failed to upload.\n\nError id: {}",
                    error.id()
                );
                (Outcome::PartiallyDelivered, text)
            }
            Ok(Delivery::Failed(DeliveryFailure::EmptyContent)) => (
                Outcome::EmptyContent,
                "❌ No media files found in the post.".to_owned(),
            ),
            Ok(Delivery::Failed(DeliveryFailure::Transport(err))) => (
                Outcome::DeliveryFailed,
                format!("❌ Failed to send media files.\n\nError id: {}", err.id()),
            ),
            Err(err) => match err.kind() {
                ErrorKind::Provider { source } => {
                    info!(err = tracing_err(&err), "The content provider failed");
                    (Outcome::ProviderFailed, provider_failure_text(source, &err))
                }
                _ => {
                    error!(err = tracing_err(&err), "Download request failed");
                    let text = format!(
                        "❌ An unexpected error occurred.\n\n\
                        Please try again later or contact support.\n\nError id: {}",
                        err.id()
                    );
                    (Outcome::InternalError, text)
                }
            },
        };

        let report = self.transport.edit_text(chat, status, &text).await;

        match report {
            // The media already reached the user, the request is not failed
            Err(err) if outcome == Outcome::PartiallyDelivered => {
                warn!(err = tracing_err(&err), "Failed to update the status message");
            }
            report => report?,
        }

        Ok(outcome)
    }

    /// Replaces the status message with the success message. Failures are
    /// only logged, because the media was already delivered.
    async fn report_success(&self, chat: ChatId, status: MessageId) {
        if let Err(err) = self.transport.delete_message(chat, status).await {
            warn!(err = tracing_err(&err), "Failed to delete the status message");
        }

        let text = format!(
            "✅ Download completed successfully!\n\n\
            📢 Don't forget to share our channel: {}",
            self.invite_link
        );

        if let Err(err) = self.transport.send_text(chat, &text).await {
            warn!(err = tracing_err(&err), "Failed to send the success message");
        }
    }

    /// The working area lives only within this function. Once the media is
    /// sent, it is removed before the user is notified about the outcome.
    async fn fetch_and_deliver(
        &self,
        chat: ChatId,
        status: MessageId,
        content: &ContentId,
    ) -> Result<Delivery> {
        let deadline = self.fetcher.deadline();

        let items = self.fetcher.fetch(content, deadline).await?;

        if items.is_empty() {
            return Ok(Delivery::Failed(DeliveryFailure::EmptyContent));
        }

        let area = WorkingArea::create(&self.downloads_root, content).await?;

        let media = self.fetcher.download_all(&items, &area, deadline).await?;

        self.transport
            .edit_text(chat, status, "📤 Uploading media...")
            .await?;

        let delivery = deliver(&*self.transport, chat, &media, &self.caption).await;

        area.remove().await;

        Ok(delivery)
    }
}

fn invalid_link_text() -> String {
    format!("❌ {}\n\n{INVALID_LINK_HINT}", UserError::NotAContentLink)
}

const INVALID_LINK_HINT: &str = "✅ Supported formats:\n\
    • instagram.com/p/... (Posts)\n\
    • instagram.com/reel/... (Reels)\n\
    • instagram.com/tv/... (IGTV)\n\n\
    💡 Example:\n\
    https://www.instagram.com/p/ABC123/";

fn provider_failure_text(source: &crate::provider::FetchError, err: &crate::Error) -> String {
    format!(
        "❌ Failed to download the post: {source}.\n\n\
        This could be because:\n\
        • The post is private 🔒\n\
        • The post was deleted 🗑️\n\
        • Instagram is blocking requests 🚫\n\
        • Invalid link format ❌\n\n\
        Please try again or use a different link.\n\nError id: {}",
        err.id()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{FetchError, MediaKind};
    use crate::testing::{Call, ManualClock, MockProvider, MockTransport, SentMedia};
    use crate::tg::MemberStatus;
    use std::time::Duration;

    const CHAT: ChatId = ChatId(42);
    const USER: UserId = UserId(42);
    const CHANNEL: ChatId = ChatId(-1001234567890);

    struct Setup {
        dir: tempfile::TempDir,
        transport: Arc<MockTransport>,
        provider: Arc<MockProvider>,
        quota: Arc<QuotaTracker>,
        service: DownloadService,
    }

    impl Setup {
        fn new(provider: MockProvider, refund_on_failure: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let transport = Arc::new(MockTransport::default());
            let provider = Arc::new(provider);
            let clock = Arc::new(ManualClock::new(2024, 3, 15));
            let quota = Arc::new(QuotaTracker::new(dir.path().join("quota.json"), 3, clock));

            let service = DownloadService::new(DownloadServiceOptions {
                transport: transport.clone(),
                gate: AccessGate::new(transport.clone(), quota.clone(), CHANNEL),
                quota: quota.clone(),
                fetcher: Fetcher::new(provider.clone(), Duration::from_secs(5)),
                downloads_root: dir.path().join("downloads"),
                invite_link: "https://t.me/reelgate".to_owned(),
                refund_on_failure,
            });

            Self {
                dir,
                transport,
                provider,
                quota,
                service,
            }
        }

        fn working_areas(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("downloads"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    #[test_log::test(tokio::test)]
    async fn reel_end_to_end() {
        let setup = Setup::new(MockProvider::new(&[MediaKind::Video]), false);

        let outcome = setup
            .service
            .handle(CHAT, USER, " https://www.instagram.com/reel/XYZ789/ ")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Delivered);

        let requests = setup.provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "XYZ789");

        let status = MessageId(100);
        let calls = setup.transport.calls();

        let expected = [
            Call::ChatMemberStatus {
                chat: CHANNEL,
                user: USER,
            },
            Call::SendText {
                chat: CHAT,
                text: "🔄 Processing your request...".to_owned(),
            },
            Call::EditText {
                chat: CHAT,
                message: status,
                text: "📥 Downloading from Instagram...".to_owned(),
            },
            Call::EditText {
                chat: CHAT,
                message: status,
                text: "📤 Uploading media...".to_owned(),
            },
            Call::SendMedia {
                chat: CHAT,
                media: SentMedia {
                    kind: MediaKind::Video,
                    file_name: "01.mp4".to_owned(),
                    caption: setup.service.caption.clone(),
                    existed: true,
                },
            },
            Call::DeleteMessage {
                chat: CHAT,
                message: status,
            },
        ];

        assert_eq!(calls[..expected.len()], expected);
        assert_eq!(calls.len(), expected.len() + 1);

        let Call::SendText { text, .. } = &calls[expected.len()] else {
            panic!("Expected the success message, got {:?}", calls.last());
        };
        assert!(text.starts_with("✅ Download completed successfully!"), "{text}");

        assert_eq!(setup.working_areas(), 0);
        assert_eq!(setup.quota.usage(USER).await.unwrap(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn working_area_is_removed_after_failed_batch() {
        let setup = Setup::new(MockProvider::new(&[MediaKind::Image; 12]), false);
        setup.transport.fail_media_send(1);

        let outcome = setup
            .service
            .handle(CHAT, USER, "instagram.com/p/ABC123")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::PartiallyDelivered);
        assert_eq!(setup.working_areas(), 0);

        let media_calls = setup.transport.media_calls();
        assert_eq!(media_calls.len(), 2);
        assert!(media_calls.iter().all(|call| match call {
            Call::SendMediaGroup { media, .. } => media.iter().all(|media| media.existed),
            _ => false,
        }));

        let Some(Call::EditText { text, .. }) = setup.transport.calls().last().cloned() else {
            panic!("The status message must be updated last");
        };
        assert!(text.starts_with("⚠️ Only 1 part(s)"), "{text}");
    }

    #[test_log::test(tokio::test)]
    async fn invalid_link_is_rejected_before_access_checks() {
        let setup = Setup::new(MockProvider::new(&[MediaKind::Image]), false);

        let outcome = setup
            .service
            .handle(CHAT, USER, "https://www.instagram.com/some.profile/")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::NotALink);
        assert!(invalid_link_text().starts_with("❌ Please send a valid Instagram link."));
        assert_eq!(
            setup.transport.calls(),
            [Call::SendText {
                chat: CHAT,
                text: invalid_link_text(),
            }]
        );
        assert_eq!(setup.quota.usage(USER).await.unwrap(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn rejections() {
        let setup = Setup::new(MockProvider::new(&[MediaKind::Image]), false);
        let link = "https://www.instagram.com/p/ABC123/";

        setup.transport.set_member_status(Some(MemberStatus::Left));
        let outcome = setup.service.handle(CHAT, USER, link).await.unwrap();
        assert_eq!(outcome, Outcome::RejectedNotMember);

        setup.transport.set_member_status(None);
        let outcome = setup.service.handle(CHAT, USER, link).await.unwrap();
        assert_eq!(outcome, Outcome::TransportError);

        setup.transport.set_member_status(Some(MemberStatus::Member));
        for _ in 0..3 {
            let outcome = setup.service.handle(CHAT, USER, link).await.unwrap();
            assert_eq!(outcome, Outcome::Delivered);
        }

        let outcome = setup.service.handle(CHAT, USER, link).await.unwrap();
        assert_eq!(outcome, Outcome::RejectedQuota);
        assert_eq!(setup.provider.requests().len(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn provider_failure_and_refund() {
        for (refund_on_failure, expected_usage) in [(false, 1), (true, 0)] {
            let setup = Setup::new(MockProvider::failing(|| FetchError::NotFound), refund_on_failure);

            let outcome = setup
                .service
                .handle(CHAT, USER, "instagram.com/tv/CdEf_01")
                .await
                .unwrap();

            assert_eq!(outcome, Outcome::ProviderFailed);
            assert_eq!(setup.quota.usage(USER).await.unwrap(), expected_usage);
            assert_eq!(setup.working_areas(), 0);

            let Some(Call::EditText { text, .. }) = setup.transport.calls().last().cloned() else {
                panic!("The status message must be updated last");
            };
            assert!(
                text.starts_with("❌ Failed to download the post: The post was not found."),
                "{text}"
            );
        }
    }

    #[test_log::test(tokio::test)]
    async fn delivered_media_keeps_its_charge_when_status_cleanup_fails() {
        let setup = Setup::new(MockProvider::new(&[MediaKind::Video]), true);
        setup.transport.fail_deletes();

        let outcome = setup
            .service
            .handle(CHAT, USER, "https://www.instagram.com/reel/XYZ789/")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Delivered);
        assert_eq!(setup.transport.media_calls().len(), 1);
        assert_eq!(setup.quota.usage(USER).await.unwrap(), 1);

        let Some(Call::SendText { text, .. }) = setup.transport.calls().last().cloned() else {
            panic!("The success message must be sent last");
        };
        assert!(text.starts_with("✅ Download completed successfully!"), "{text}");
    }

    #[test_log::test(tokio::test)]
    async fn empty_post() {
        let setup = Setup::new(MockProvider::new(&[]), false);

        let outcome = setup
            .service
            .handle(CHAT, USER, "instagram.com/p/ABC123")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::EmptyContent);
        assert!(setup.transport.media_calls().is_empty());
    }
}
