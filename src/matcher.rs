//! Policies deciding whether an outgoing request matches a recorded one

use std::borrow::Cow;

use crate::transport::Request;

/// Decides whether an outgoing request corresponds to a recorded request
///
/// Any `Fn(&Request, &Request) -> bool` closure is a matcher.
pub trait Matcher: Send + Sync {
    /// Compare the outgoing request against a recorded candidate
    fn matches(&self, request: &Request, recorded: &Request) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&Request, &Request) -> bool + Send + Sync,
{
    fn matches(&self, request: &Request, recorded: &Request) -> bool {
        self(request, recorded)
    }
}

/// Method and URL equality
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatcher;

impl Matcher for DefaultMatcher {
    fn matches(&self, request: &Request, recorded: &Request) -> bool {
        request.method.eq_ignore_ascii_case(&recorded.method)
            && request.url.trim() == recorded.url.trim()
    }
}

/// [`DefaultMatcher`] plus normalized body equality
///
/// Two POSTs to the same endpoint with different payloads are different
/// interactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyMatcher;

impl Matcher for BodyMatcher {
    fn matches(&self, request: &Request, recorded: &Request) -> bool {
        DefaultMatcher.matches(request, recorded)
            && normalize_body(&request.body) == normalize_body(&recorded.body)
    }
}

/// Normalize a body for comparison
///
/// JSON documents are re-serialized with sorted keys and no insignificant
/// whitespace. Anything else has surrounding ASCII whitespace trimmed.
#[must_use]
pub fn normalize_body(body: &[u8]) -> Cow<'_, [u8]> {
    if body.is_empty() {
        return Cow::Borrowed(body);
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Ok(canonical) = serde_json::to_vec(&value) {
            return Cow::Owned(canonical);
        }
    }

    Cow::Borrowed(trim_ascii(body))
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
