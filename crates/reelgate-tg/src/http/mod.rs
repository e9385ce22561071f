mod basic_ext;
mod json_ext;

use crate::prelude::*;
use async_trait::async_trait;
use reqwest_middleware::RequestBuilder;
use reqwest_retry::RetryTransientMiddleware;
use retry_policies::policies::ExponentialBackoff;
use std::time::{Duration, Instant};
use task_local_extensions::Extensions;

pub(crate) mod prelude {
    pub(crate) use super::basic_ext::{RequestBuilderBasicExt as _, ResponseBasicExt as _};
    pub(crate) use super::json_ext::RequestBuilderJsonExt as _;
}

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

pub(crate) fn default_retry_policy() -> ExponentialBackoff {
    // Retry exponentially increasing intervals between attempts.
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
        .build_with_max_retries(3)
}

pub(crate) fn create_client() -> Client {
    reqwest_middleware::ClientBuilder::new(teloxide::net::client_from_env())
        .with(OutermostObservingMiddleware)
        .with(RetryTransientMiddleware::new_with_policy(
            default_retry_policy(),
        ))
        .with(InnermostObservingMiddleware)
        .with_init(|request_builder: RequestBuilder| {
            request_builder.header(
                "User-Agent",
                concat!("ReelgateTelegramBot/", env!("CARGO_PKG_VERSION")),
            )
        })
        .build()
}

struct OutermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for OutermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            version = ?request.version(),
            method = %request.method(),
            url = %request.url(),
        );
        measure_request(
            "http_request_effective_duration_seconds",
            request,
            extensions,
            next,
        )
        .instrument(span)
        .await
    }
}

struct InnermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for InnermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let start = Instant::now();
        let result =
            measure_request("http_request_duration_seconds", request, extensions, next).await;
        let duration = tracing_duration(start.elapsed());

        let response = match &result {
            Ok(response) => response,
            Err(err) => {
                error!(duration, err = tracing_err(err), "Network request failed");
                return result;
            }
        };

        let status = response.status();

        let Err(err) = response.error_for_status_ref() else {
            info!(duration, %status, "Network request succeeded");
            return result;
        };

        warn!(
            err = tracing_err(&err),
            duration,
            %status,
            "Network request failed (error status)"
        );

        result
    }
}

async fn measure_request(
    histogram: &'static str,
    request: reqwest::Request,
    extensions: &mut Extensions,
    next: reqwest_middleware::Next<'_>,
) -> reqwest_middleware::Result<reqwest::Response> {
    let version = format!("{:?}", request.version());
    let method = request.method().to_string();
    let host = request.url().host_str().unwrap_or("{unknown}").to_owned();

    let start = Instant::now();
    let result = next.run(request, extensions).await;
    let elapsed = start.elapsed();

    let status = match &result {
        Ok(response) => response.status().as_u16().to_string(),
        Err(_) => "{fatal}".to_owned(),
    };

    metrics::register_histogram!(
        histogram,
        "version" => version,
        "method" => method,
        "host" => host,
        "status" => status
    )
    .record(elapsed);

    result
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },

    #[error("HTTP request has failed (HTTP status code: {status}):\n{body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Received an unexpected response JSON object")]
    UnexpectedResponseJsonShape { source: serde_json::Error },

    #[error("The response body is larger than the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
}

impl HttpClientError {
    /// Status code of the response if the server responded with an error one
    pub(crate) fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::BadResponseStatusCode { status, .. } => Some(*status),
            Self::Request { .. }
            | Self::ReadPayload { .. }
            | Self::UnexpectedResponseJsonShape { .. }
            | Self::PayloadTooLarge { .. } => None,
        }
    }
}
