use super::WorkingArea;
use crate::link::ContentId;
use crate::prelude::*;
use crate::provider::{ContentProvider, FetchError, MediaItem, MediaKind};
use crate::{err, ErrorKind, Result};
use futures::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Media payload downloaded to the working area
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalMedia {
    pub(crate) kind: MediaKind,
    pub(crate) path: PathBuf,
    pub(crate) size: u64,
}

/// Point in time after which the provider is considered unavailable
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(tokio::time::Instant);

pub(crate) struct Fetcher {
    provider: Arc<dyn ContentProvider>,
    timeout: Duration,
}

impl Fetcher {
    pub(crate) fn new(provider: Arc<dyn ContentProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline(tokio::time::Instant::now() + self.timeout)
    }

    /// Lists the media of the post. A single attempt is made, the failures
    /// are always reported as [`FetchError`].
    #[instrument(skip(self, deadline), fields(content = %content))]
    pub(crate) async fn fetch(&self, content: &ContentId, deadline: Deadline) -> Result<Vec<MediaItem>> {
        let start = Instant::now();

        let result = within(deadline, self.provider.fetch_media(content))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::Provider { .. } => err,
                _ => err!(FetchError::ProviderUnavailable { source: Some(err) }),
            });

        let outcome = match &result {
            Ok(_) => "ok",
            Err(_) => "err",
        };

        metrics::register_histogram!(
            "reelgate_provider_fetch_duration_seconds",
            "result" => outcome
        )
        .record(start.elapsed());

        let items = result?;

        info!(items = items.len(), "Fetched the list of media");

        Ok(items)
    }

    /// Downloads the payloads into the working area preserving the order.
    /// The files are named by their position in the post.
    #[instrument(skip_all, fields(items = items.len()))]
    pub(crate) async fn download_all(
        &self,
        items: &[MediaItem],
        area: &WorkingArea,
        deadline: Deadline,
    ) -> Result<Vec<LocalMedia>> {
        let downloads = stream::iter(items.iter().enumerate())
            .then(|(index, item)| self.download(item, area, index))
            .try_collect::<Vec<_>>();

        within(deadline, downloads)
            .with_duration_log("Downloaded all media")
            .await
    }

    async fn download(&self, item: &MediaItem, area: &WorkingArea, index: usize) -> Result<LocalMedia> {
        let path = area.file(&format!("{:02}.{}", index + 1, item.kind.file_extension()));

        let size = self.provider.download(item, &path).await.map_err(|err| match err.kind() {
            ErrorKind::HttpClient { .. } | ErrorKind::Tg { .. } => {
                err!(FetchError::ProviderUnavailable { source: Some(err) })
            }
            _ => err,
        })?;

        Ok(LocalMedia {
            kind: item.kind,
            path,
            size,
        })
    }
}

async fn within<T>(deadline: Deadline, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout_at(deadline.0, fut)
        .await
        .unwrap_or_else(|_| {
            warn!("The content provider didn't respond in time");
            Err(err!(FetchError::ProviderUnavailable { source: None }))
        })
}
