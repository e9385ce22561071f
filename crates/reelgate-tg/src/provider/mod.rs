//! Third-party service that resolves Instagram links to direct media URLs

mod http;

use crate::link::ContentId;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use url::Url;

pub(crate) use self::http::HttpProvider;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    /// Endpoint that accepts the post URL in the `url` query parameter
    pub(crate) api_url: Url,

    /// Upper bound for listing and downloading the media of a single post
    pub(crate) timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub(crate) fn file_extension(self) -> &'static str {
        match self {
            MediaKind::Image => "jpg",
            MediaKind::Video => "mp4",
        }
    }
}

/// Single media of a post. The order of the items returned by the provider
/// matches the order of the carousel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MediaItem {
    pub(crate) kind: MediaKind,
    pub(crate) source: Url,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchError {
    #[error("The post was not found")]
    NotFound,

    #[error("The post is private")]
    Private,

    #[error("The content provider is unavailable")]
    ProviderUnavailable { source: Option<crate::Error> },

    #[error("The content provider returned a malformed response: {reason}")]
    Malformed { reason: String },
}

#[async_trait]
pub(crate) trait ContentProvider: Send + Sync {
    /// Lists the media of the post. An empty list is a valid result.
    async fn fetch_media(&self, content: &ContentId) -> Result<Vec<MediaItem>>;

    /// Downloads the media payload to `dest`, returns its size in bytes.
    async fn download(&self, item: &MediaItem, dest: &Path) -> Result<u64>;
}
