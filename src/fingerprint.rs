//! Request fingerprinting for fixture indexes

use sha2::{Digest, Sha256};

use crate::matcher::normalize_body;
use crate::transport::Request;

/// Compute SHA-256 fingerprint of a request
///
/// The fingerprint includes:
/// 1. Method (uppercase normalized)
/// 2. URL (trimmed)
/// 3. Body (JSON canonicalized, otherwise whitespace-trimmed)
///
/// Headers are left out: authentication headers are stripped before a
/// request is persisted, so they must not take part in identity.
#[must_use]
pub fn fingerprint_request(request: &Request) -> [u8; 32] {
    let mut hasher = Sha256::new();

    // 1. Method
    let method = request.method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    // 2. URL
    let url = request.url.trim();
    hasher.update((url.len() as u32).to_le_bytes());
    hasher.update(url.as_bytes());

    // 3. Body
    let body = normalize_body(&request.body);
    hasher.update((body.len() as u32).to_le_bytes());
    hasher.update(&body);

    hasher.finalize().into()
}

/// Derive the stable fixture id for a test identity
#[must_use]
pub fn fixture_id(identity: &str) -> [u8; 32] {
    Sha256::digest(identity.as_bytes()).into()
}

/// Short hex prefix of a fingerprint, for logs
#[must_use]
pub fn short_hex(hash: &[u8; 32]) -> String {
    hex::encode(&hash[..8])
}
