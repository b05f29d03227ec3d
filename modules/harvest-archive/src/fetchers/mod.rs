// Network transports. Search backends return plain `SearchResult`s; page
// fetchers return extracted text or `None` when the page yielded nothing.

pub mod aggressive;
pub mod mirror;
pub mod news;
pub mod page;
pub mod search;

use std::time::Duration;

use crate::error::{ArchiveError, Result};

pub(crate) const DEFAULT_USER_AGENT: &str = "harvest-archive/0.1";

/// Largest response body any fetcher will buffer.
pub(crate) const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

pub(crate) fn http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(ArchiveError::Network)
}

/// Reject anything that is not an absolute http(s) URL before touching the network.
pub(crate) fn require_http_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|_| ArchiveError::InvalidUrl(url.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ArchiveError::InvalidUrl(format!(
            "only http/https URLs allowed, got: {}",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

/// Read the body chunk by chunk, giving up once it exceeds `limit`. A declared
/// `Content-Length` over the limit fails before anything is read.
pub(crate) async fn read_body(mut resp: reqwest::Response, url: &str, limit: usize) -> Result<Vec<u8>> {
    if resp.content_length().is_some_and(|len| len > limit as u64) {
        return Err(ArchiveError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        append_capped(&mut body, &chunk, url, limit)?;
    }
    Ok(body)
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], url: &str, limit: usize) -> Result<()> {
    if body.len() + chunk.len() > limit {
        return Err(ArchiveError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    body.extend_from_slice(chunk);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(require_http_url("https://example.com/a").is_ok());
        assert!(matches!(
            require_http_url("ftp://example.com/a"),
            Err(ArchiveError::InvalidUrl(_))
        ));
        assert!(matches!(
            require_http_url("not a url"),
            Err(ArchiveError::InvalidUrl(_))
        ));
    }

    #[test]
    fn body_stops_growing_past_the_limit() {
        let mut body = Vec::new();
        append_capped(&mut body, b"0123456789", "https://a.com", 16).unwrap();
        append_capped(&mut body, b"abcdef", "https://a.com", 16).unwrap();
        assert_eq!(body.len(), 16);

        let err = append_capped(&mut body, b"x", "https://a.com", 16).unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { limit: 16, .. }));
        assert!(!err.is_retryable());
        assert_eq!(body.len(), 16);
    }
}
