//! Live HTTP client used when a recorder goes to the network

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::{Request, Response, RoundTrip, Transport};
use crate::{Result, TapedeckError};

/// Default per-request timeout
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// HTTP client for live traffic
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self {
            client,
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
        }
    }

    /// Override the per-request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request to its target
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built, fails, or times out
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let uri = request
            .url
            .parse::<Uri>()
            .map_err(|e| TapedeckError::Transport(format!("Invalid URI '{}': {e}", request.url)))?;

        debug!("Sending {} to {}", request.method, uri);

        let method = request.method.parse::<Method>().map_err(|e| {
            TapedeckError::Transport(format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut request_builder = hyper::Request::builder().method(method).uri(uri);
        for (name, value) in &request.headers {
            request_builder = request_builder.header(name, value);
        }

        // The buffered body is cloned, never consumed
        let http_request = request_builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| TapedeckError::Transport(format!("Failed to build request: {e}")))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(http_request))
            .await
            .map_err(|_| {
                TapedeckError::Transport(format!(
                    "Request to {} timed out after {}ms",
                    request.url,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| {
                warn!("Request failed: {e}");
                TapedeckError::Transport(format!("Request failed: {e}"))
            })?;

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers())?;

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TapedeckError::Transport(format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpClient {
    fn round_trip<'a>(&'a self, request: &'a Request) -> RoundTrip<'a> {
        Box::pin(self.send(request))
    }
}

/// Drain an HTTP body into memory with a size limit
///
/// # Errors
///
/// Returns error if the body is too large or cannot be read
pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let collected = body
        .collect()
        .await
        .map_err(|e| TapedeckError::Transport(format!("Failed to read body: {e}")))?;

    let bytes = collected.to_bytes();

    if bytes.len() > max_size {
        return Err(TapedeckError::DataTooLarge {
            size: bytes.len(),
            limit: max_size,
        });
    }

    Ok(bytes)
}

/// Convert a header map to owned name/value pairs
///
/// Values keep their exact bytes, including non-ASCII UTF-8.
///
/// # Errors
///
/// Returns error if a header value is not valid UTF-8
pub fn header_pairs(headers: &hyper::HeaderMap) -> Result<Vec<(String, String)>> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8(value.as_bytes().to_vec()).map_err(|_| {
                TapedeckError::Transport(format!("Header '{name}' is not valid UTF-8"))
            })?;
            Ok((name.to_string(), value))
        })
        .collect()
}
