//! Downloading single tiles.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use tracing::trace;

use crate::error::TileError;
use crate::layout::write_atomic;
use crate::provider::Provider;
use crate::tile::Tile;

const ZERO_DURATION: Duration = Duration::from_secs(0);

// Some providers reject requests that don't look like they came from a browser.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/118.0";
const BROWSER_ACCEPT: &str = "image/avif,image/webp,image/png,image/*;q=0.8,*/*;q=0.5";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.5";

/// The raw answer to a tile request.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Parsed `Retry-After` header, if the server sent one.
    pub retry_after: Option<Duration>,
}

impl TransportResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            retry_after: None,
        }
    }
}

/// Issues a GET request for a fully resolved URL.
///
/// Failures to obtain any response at all are reported as
/// [`TileError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, TileError>;
}

/// [`Transport`] backed by a `reqwest` client sending a fixed,
/// browser-like header set.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds the HTTP client. A zero `timeout` disables the client-side timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(BROWSER_USER_AGENT),
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if timeout > ZERO_DURATION {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TileError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after = retry_after(response.headers());

        // a non-200 body is of no interest
        if status != StatusCode::OK {
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: Vec::new(),
                retry_after,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TileError::Transport(e.to_string()))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            body: body.to_vec(),
            retry_after,
        })
    }
}

/// Reads a `Retry-After` header given in seconds. HTTP dates are ignored.
fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|val| val.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Fetches single tiles from a provider, exactly one request per call.
///
/// Retrying is left to the caller.
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl FetchClient {
    /// Creates a client on top of `transport`. Every request is cut off after
    /// `timeout`, unless it is zero.
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Downloads `tile` and returns the response body.
    ///
    /// Only HTTP 200 with a non-empty body counts as success.
    pub async fn fetch(&self, tile: &Tile, provider: &Provider) -> Result<Vec<u8>, TileError> {
        let url = provider.tile_url(tile)?;
        trace!(%tile, %url, "requesting tile");

        let request = self.transport.get(&url);
        let response = if self.timeout > ZERO_DURATION {
            tokio::time::timeout(self.timeout, request)
                .await
                .map_err(|_| {
                    TileError::Transport(format!("request timed out after {:?}", self.timeout))
                })??
        } else {
            request.await?
        };

        if response.status != StatusCode::OK.as_u16() {
            return Err(TileError::BadStatus {
                status: response.status,
                retry_after: response.retry_after,
            });
        }
        if response.body.is_empty() {
            return Err(TileError::EmptyBody);
        }

        Ok(response.body)
    }

    /// Downloads `tile` and atomically stores it at `dest`, returning the
    /// amount of bytes written.
    ///
    /// The parent directory of `dest` must already exist.
    pub async fn fetch_to(
        &self,
        tile: &Tile,
        provider: &Provider,
        dest: &Path,
    ) -> Result<u64, TileError> {
        let body = self.fetch(tile, provider).await?;
        write_atomic(dest, &body).await?;

        Ok(body.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::UrlFormat;
    use std::sync::Mutex;

    struct Canned {
        response: Mutex<Option<Result<TransportResponse, TileError>>>,
        delay: Duration,
    }

    impl Canned {
        fn new(response: Result<TransportResponse, TileError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                delay: ZERO_DURATION,
            })
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn get(&self, _url: &str) -> Result<TransportResponse, TileError> {
            tokio::time::sleep(self.delay).await;
            self.response
                .lock()
                .unwrap()
                .take()
                .expect("only one request expected")
        }
    }

    fn provider() -> Provider {
        let url = UrlFormat::parse("http://tiles.test/{z}/{x}/{y}.png").unwrap();
        Provider::new("test", url, Vec::new()).unwrap()
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("120"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(120)));

        headers.insert(
            header::RETRY_AFTER,
            header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn bad_status_keeps_retry_after() {
        let response = TransportResponse {
            retry_after: Some(Duration::from_secs(7)),
            ..TransportResponse::status(429)
        };
        let client = FetchClient::new(Canned::new(Ok(response)), ZERO_DURATION);

        let err = client.fetch(&Tile::new(0, 0, 0), &provider()).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn ok_response() {
        let client = FetchClient::new(Canned::new(Ok(TransportResponse::ok(vec![1, 2, 3]))), ZERO_DURATION);
        let body = client.fetch(&Tile::new(0, 0, 0), &provider()).await.unwrap();
        assert_eq!(body, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn non_200_is_bad_status() {
        for status in &[204u16, 301, 404, 429, 500] {
            let client = FetchClient::new(
                Canned::new(Ok(TransportResponse::status(*status))),
                ZERO_DURATION,
            );
            let err = client.fetch(&Tile::new(0, 0, 0), &provider()).await.unwrap_err();
            assert!(
                matches!(err, TileError::BadStatus { status: s, .. } if s == *status),
                "{:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let client = FetchClient::new(Canned::new(Ok(TransportResponse::ok(Vec::new()))), ZERO_DURATION);
        let err = client.fetch(&Tile::new(0, 0, 0), &provider()).await.unwrap_err();
        assert!(matches!(err, TileError::EmptyBody));
    }

    #[tokio::test]
    async fn hanging_request_times_out() {
        let transport = Arc::new(Canned {
            response: Mutex::new(Some(Ok(TransportResponse::ok(vec![1])))),
            delay: Duration::from_secs(5),
        });
        let client = FetchClient::new(transport, Duration::from_millis(20));

        let err = client.fetch(&Tile::new(0, 0, 0), &provider()).await.unwrap_err();
        assert!(matches!(err, TileError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fetch_to_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("0.png");
        let client = FetchClient::new(Canned::new(Ok(TransportResponse::ok(b"tile".to_vec()))), ZERO_DURATION);

        let written = client.fetch_to(&Tile::new(0, 0, 0), &provider(), &dest).await.unwrap();

        assert_eq!(written, 4);
        assert_eq!(std::fs::read(dest).unwrap(), b"tile");
    }
}
