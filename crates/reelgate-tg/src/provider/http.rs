use super::{Config, ContentProvider, FetchError, MediaItem, MediaKind};
use crate::http::HttpClientError;
use crate::link::ContentId;
use crate::prelude::*;
use crate::util::display::human_size;
use crate::util::units::MB;
use crate::{err, ErrorKind, Result};
use async_trait::async_trait;
use fs_err::tokio as fs;
use serde::Deserialize;
use std::path::Path;
use url::Url;

/// Telegram doesn't accept files larger than this from bots anyway
const MAX_MEDIA_SIZE: u64 = 200 * MB;

pub(crate) struct HttpProvider {
    http: crate::http::Client,
    api_url: Url,
}

/// API response in the form of `{"links": [...]}`
#[derive(Deserialize)]
struct LinksResponse {
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Link {
    Plain(String),
    Typed {
        url: String,

        #[serde(rename = "type")]
        kind: LinkKind,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum LinkKind {
    Image,
    Video,
}

impl HttpProvider {
    pub(crate) fn new(config: &Config, http: crate::http::Client) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
        }
    }

    fn request_url(&self, content: &ContentId) -> Url {
        let mut url = self.api_url.clone();
        url.query_pairs_mut()
            .append_pair("url", &content.canonical_url());
        url
    }
}

#[async_trait]
impl ContentProvider for HttpProvider {
    #[instrument(skip_all, fields(content = %content))]
    async fn fetch_media(&self, content: &ContentId) -> Result<Vec<MediaItem>> {
        let response = self
            .http
            .get(self.request_url(content))
            .read_json::<LinksResponse>()
            .await
            .map_err(into_fetch_error)?;

        Ok(parse_links(response)?)
    }

    #[instrument(skip_all, fields(source = %item.source, dest = tracing_path(dest)))]
    async fn download(&self, item: &MediaItem, dest: &Path) -> Result<u64> {
        let response = self
            .http
            .get(item.source.clone())
            .try_send()
            .await
            .map_err(into_fetch_error)?;

        let mut file = fs::File::create(dest).await?;

        let size = response
            .read_to_file_handle(&mut file, MAX_MEDIA_SIZE)
            .await?;

        debug!(size = %human_size(size), "Downloaded media");

        Ok(size)
    }
}

fn parse_links(response: LinksResponse) -> Result<Vec<MediaItem>, FetchError> {
    response.links.into_iter().map(parse_link).collect()
}

fn parse_link(link: Link) -> Result<MediaItem, FetchError> {
    let (url, kind) = match link {
        Link::Plain(url) => {
            let kind = if url.contains(".mp4") {
                MediaKind::Video
            } else {
                MediaKind::Image
            };
            (url, kind)
        }
        Link::Typed { url, kind } => {
            let kind = match kind {
                LinkKind::Image => MediaKind::Image,
                LinkKind::Video => MediaKind::Video,
            };
            (url, kind)
        }
    };

    let source = url.parse().map_err(|err| FetchError::Malformed {
        reason: format!("invalid media URL `{url}`: {err}"),
    })?;

    Ok(MediaItem { kind, source })
}

/// Classifies the failures of the HTTP layer from the point of view of the
/// user. Everything not related to the HTTP layer is left as is.
fn into_fetch_error(err: crate::Error) -> crate::Error {
    let ErrorKind::HttpClient { source } = err.kind() else {
        return err;
    };

    let fetch_error = match source {
        HttpClientError::UnexpectedResponseJsonShape { source } => FetchError::Malformed {
            reason: source.to_string(),
        },
        _ => match source.status().map(|status| status.as_u16()) {
            Some(404) => FetchError::NotFound,
            Some(401 | 403) => FetchError::Private,
            _ => FetchError::ProviderUnavailable {
                source: Some(err.clone()),
            },
        },
    };

    err!(ErrorKind::Provider { source: fetch_error })
}
