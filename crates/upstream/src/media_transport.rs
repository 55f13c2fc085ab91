//! Builds the HTTP client used for media uploads/downloads against the
//! upstream CDN.
//!
//! The CDN fingerprints the request: an HTTP/2 preface or a present
//! `Referer` header makes it answer with a 26-byte empty stub instead of the
//! real ciphertext, so the client here is built to resemble what the
//! official mobile/web clients send.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaTransportError {
    #[error("failed to build media HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Builds the media-fetching client per the CDN's expected fingerprint:
/// no `Referer`/`User-Agent`, HTTP/1.1 only, TLS 1.2 minimum, 60s timeout.
pub fn build_media_client() -> Result<reqwest::Client, MediaTransportError> {
    let client = reqwest::Client::builder()
        .http1_only()
        .referer(false)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .timeout(Duration::from_secs(60))
        .build()?;
    Ok(client)
}
