use super::HttpClientError;
use crate::prelude::*;
use crate::{err, err_ctx, Result};
use async_trait::async_trait;
use bytes::Bytes;
use easy_ext::ext;
use futures::prelude::*;
use reqwest::Response;
use reqwest_middleware::RequestBuilder;
use tokio::io::AsyncWriteExt;

#[ext(RequestBuilderBasicExt)]
#[async_trait]
pub(crate) impl RequestBuilder {
    /// Better version of [`RequestBuilder::send`] that returns an error
    /// if the error response status code is returned.
    async fn try_send(self) -> Result<Response> {
        let response = self
            .send()
            .await
            .map_err(err_ctx!(HttpClientError::Request))?;

        let status = response.status();

        if !status.is_client_error() && !status.is_server_error() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_else(|err| {
            format!(
                "Could not collect the error response body text: {}",
                err.display_chain()
            )
        });

        Err(err!(HttpClientError::BadResponseStatusCode { status, body }))
    }

    async fn read_bytes(self) -> Result<Bytes> {
        self.try_send()
            .await?
            .bytes()
            .await
            .map_err(err_ctx!(HttpClientError::ReadPayload))
    }
}

#[ext(ResponseBasicExt)]
#[async_trait]
pub(crate) impl Response {
    /// Streams the response body into the file. Fails as soon as the body
    /// exceeds `limit` bytes, be it according to the `Content-Length` header
    /// or to the number of bytes actually received. Returns the number of
    /// bytes written.
    async fn read_to_file_handle<W>(self, file_handle: &mut W, limit: u64) -> Result<u64>
    where
        W: tokio::io::AsyncWrite + Unpin + Send,
    {
        let content_length = self.content_length();
        write_limited(content_length, self.bytes_stream(), file_handle, limit).await
    }
}

async fn write_limited<S, W>(
    content_length: Option<u64>,
    stream: S,
    file_handle: &mut W,
    limit: u64,
) -> Result<u64>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
    W: tokio::io::AsyncWrite + Unpin,
{
    if content_length.is_some_and(|len| len > limit) {
        return Err(err!(HttpClientError::PayloadTooLarge { limit }));
    }

    futures::pin_mut!(stream);

    let mut file_handle = tokio::io::BufWriter::with_capacity(
        1024 * 1024, // 1 MB
        file_handle,
    );

    let mut written = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(err_ctx!(HttpClientError::ReadPayload))?;

        written += chunk.len() as u64;
        if written > limit {
            return Err(err!(HttpClientError::PayloadTooLarge { limit }));
        }

        file_handle.write_all(&chunk).await?;
    }

    file_handle.flush().await?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use assert_matches::assert_matches;

    async fn write(content_length: Option<u64>, chunks: &[&'static str]) -> (Result<u64>, Vec<u8>) {
        let stream = stream::iter(
            chunks
                .iter()
                .map(|&chunk| Ok::<_, reqwest::Error>(Bytes::from_static(chunk.as_bytes()))),
        );

        let mut file = Vec::new();
        let result = write_limited(content_length, stream, &mut file, 10).await;
        (result, file)
    }

    #[tokio::test]
    async fn body_within_limit() {
        let (result, file) = write(Some(10), &["12345", "67890"]).await;
        assert_eq!(result.unwrap(), 10);
        assert_eq!(file, b"1234567890");

        let (result, file) = write(None, &["123"]).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(file, b"123");
    }

    #[tokio::test]
    async fn declared_length_over_limit() {
        let (result, file) = write(Some(11), &["12345"]).await;

        assert_matches!(
            result.unwrap_err().kind(),
            ErrorKind::HttpClient {
                source: HttpClientError::PayloadTooLarge { limit: 10 }
            }
        );
        assert!(file.is_empty());
    }

    #[tokio::test]
    async fn streamed_body_over_limit() {
        // The server may omit the length or lie about it
        for content_length in [None, Some(5)] {
            let (result, _) = write(content_length, &["12345", "67890", "!"]).await;

            assert_matches!(
                result.unwrap_err().kind(),
                ErrorKind::HttpClient {
                    source: HttpClientError::PayloadTooLarge { limit: 10 }
                }
            );
        }
    }
}
