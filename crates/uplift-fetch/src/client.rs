use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::error::{FetchError, Result};

/// A boxed stream of response body chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A streaming HTTP response plus the metadata the update center cares
/// about: the post-redirect URL (diagnostics), the declared length
/// (integrity check) and the server clock (cache stamping).
pub struct HttpResponse {
    pub body: BoxStream<'static, Result<Bytes>>,
    pub final_url: String,
    pub content_length: Option<u64>,
    pub server_time: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("body", &"<stream>")
            .field("final_url", &self.final_url)
            .field("content_length", &self.content_length)
            .field("server_time", &self.server_time)
            .finish()
    }
}

/// A fully-buffered text response, used for catalog and probe endpoints.
pub struct TextResponse {
    pub body: String,
    pub final_url: String,
    pub server_time: Option<DateTime<Utc>>,
}

/// Proxy-aware HTTP opener.
///
/// Implementations follow redirects, honor the caller's read timeout and
/// map transport failures into [`FetchError`]. Mock implementations back
/// the test suites.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Open a streaming GET connection.
    async fn open(&self, url: &str, read_timeout: Duration) -> Result<HttpResponse>;

    /// GET a small text resource in one buffered read.
    async fn get_text(&self, url: &str, read_timeout: Duration) -> Result<TextResponse>;
}

/// Production client. Proxy configuration comes from the process
/// environment (reqwest's system-proxy support); redirects are followed up
/// to the default limit.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| classify("", e))?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, read_timeout: Duration) -> Result<reqwest::Response> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let response = self
            .client
            .get(url)
            .timeout(read_timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;
        let response = response.error_for_status().map_err(|e| classify(url, e))?;
        debug!(url, status = %response.status(), final_url = %response.url(), "opened");
        Ok(response)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn open(&self, url: &str, read_timeout: Duration) -> Result<HttpResponse> {
        let response = self.send(url, read_timeout).await?;
        let final_url = response.url().to_string();
        let content_length = response.content_length();
        let server_time = server_date(&response);
        let target = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify(&target, e)))
            .boxed();
        Ok(HttpResponse {
            body,
            final_url,
            content_length,
            server_time,
        })
    }

    async fn get_text(&self, url: &str, read_timeout: Duration) -> Result<TextResponse> {
        let response = self.send(url, read_timeout).await?;
        let final_url = response.url().to_string();
        let server_time = server_date(&response);
        let body = response.text().await.map_err(|e| classify(url, e))?;
        Ok(TextResponse {
            body,
            final_url,
            server_time,
        })
    }
}

fn server_date(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    response
        .headers()
        .get(reqwest::header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Map a transport error onto the update-center taxonomy. A handshake
/// failure that names the certificate chain becomes [`FetchError::Certificate`];
/// timeouts and refused connections stay transient retry candidates.
fn classify(url: &str, err: reqwest::Error) -> FetchError {
    let detail = render_chain(&err);
    let lowered = detail.to_ascii_lowercase();
    if lowered.contains("certificate") || lowered.contains("pkix path") {
        return FetchError::Certificate {
            url: url.to_string(),
            detail,
        };
    }
    FetchError::Network {
        url: url.to_string(),
        detail,
        transient: err.is_timeout() || err.is_connect(),
    }
}

fn render_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}
