//! Transport layer for Tapedeck
//!
//! Fully buffered request/response types and the [`Transport`] seam that
//! recorders, clients and the live HTTP client all implement.

mod client;

pub use client::{header_pairs, read_body, HttpClient, REQUEST_TIMEOUT_MS};

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::Result;

/// Boxed future returned by [`Transport::round_trip`]
pub type RoundTrip<'a> = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>>;

/// Anything that can send a request and produce a response
pub trait Transport: Send + Sync {
    /// Send a request and wait for the full response
    fn round_trip<'a>(&'a self, request: &'a Request) -> RoundTrip<'a>;
}

/// Outgoing HTTP request with a fully drained body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method (e.g., "GET", "POST")
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl Request {
    /// Create a request without headers or body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// HTTP response, either live or replayed from a fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl Response {
    /// Create a response without headers
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
