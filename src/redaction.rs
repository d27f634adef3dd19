//! Scrubbing of credentials before interactions reach a fixture

use std::borrow::Cow;

use bytes::Bytes;
use regex::bytes::Regex;

use crate::config::RedactionConfig;
use crate::transport::{Request, Response};
use crate::{Result, TapedeckError};

/// Replacement written in place of scrubbed secrets
pub const REDACTED: &str = "[REDACTED]";

/// Removes authentication headers and scrubs secrets from interactions
#[derive(Debug, Clone)]
pub struct Redactor {
    /// Lowercased header names removed outright
    headers: Vec<String>,
    /// Escaped literal secrets followed by configured patterns
    patterns: Vec<Regex>,
}

impl Redactor {
    /// Build a redactor from configuration
    ///
    /// # Errors
    ///
    /// Returns error if a regex pattern does not compile
    pub fn new(config: &RedactionConfig) -> Result<Self> {
        let headers = config
            .headers
            .iter()
            .map(|name| name.to_ascii_lowercase())
            .collect();

        let literal = config
            .secrets
            .iter()
            .filter(|secret| !secret.is_empty())
            .map(String::as_str)
            .map(regex::escape);

        let patterns = literal
            .chain(config.regex_patterns.iter().cloned())
            .map(|pattern| {
                Regex::new(&pattern).map_err(|e| {
                    TapedeckError::ConfigError(format!("Invalid redaction pattern '{pattern}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { headers, patterns })
    }

    /// Check whether a header is removed before persisting
    #[must_use]
    pub fn is_filtered_header(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.eq_ignore_ascii_case(name))
    }

    /// Produce the persistable form of a request
    #[must_use]
    pub fn redact_request(&self, request: &Request) -> Request {
        Request {
            method: request.method.clone(),
            url: self.scrub_str(&request.url),
            headers: self.redact_headers(&request.headers),
            body: self.scrub_body(&request.body),
        }
    }

    /// Produce the persistable form of a response
    #[must_use]
    pub fn redact_response(&self, response: &Response) -> Response {
        Response {
            status: response.status,
            headers: self.redact_headers(&response.headers),
            body: self.scrub_body(&response.body),
        }
    }

    fn redact_headers(&self, headers: &[(String, String)]) -> Vec<(String, String)> {
        headers
            .iter()
            .filter(|(name, _)| !self.is_filtered_header(name))
            .map(|(name, value)| (name.clone(), self.scrub_str(value)))
            .collect()
    }

    fn scrub_body(&self, body: &Bytes) -> Bytes {
        match self.scrub(body) {
            Cow::Borrowed(_) => body.clone(),
            Cow::Owned(scrubbed) => Bytes::from(scrubbed),
        }
    }

    fn scrub_str(&self, value: &str) -> String {
        match self.scrub(value.as_bytes()) {
            Cow::Borrowed(_) => value.to_string(),
            Cow::Owned(scrubbed) => String::from_utf8_lossy(&scrubbed).into_owned(),
        }
    }

    fn scrub<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        let mut output = Cow::Borrowed(input);
        for pattern in &self.patterns {
            let replaced = match pattern.replace_all(&output, REDACTED.as_bytes()) {
                Cow::Borrowed(_) => None,
                Cow::Owned(bytes) => Some(bytes),
            };
            if let Some(bytes) = replaced {
                output = Cow::Owned(bytes);
            }
        }
        output
    }
}
