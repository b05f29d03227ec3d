// Browser-impersonating fetch with header rotation and retry.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, USER_AGENT};
use tracing::{info, warn};

use super::page::non_empty;
use super::{read_body, require_http_url, MAX_BODY_BYTES};
use crate::error::{ArchiveError, Result};
use crate::readability::html_to_text;

const AGGRESSIVE_TIMEOUT: Duration = Duration::from_secs(25);
const MAX_ATTEMPTS: u32 = 3;
/// Delay is base * 2^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_secs(1);

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

pub struct AggressiveFetcher {
    client: reqwest::Client,
}

impl AggressiveFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(AGGRESSIVE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(ArchiveError::Network)?;
        Ok(Self { client })
    }

    /// Whole-document text; each attempt presents a different browser.
    pub async fn fetch(&self, url: &str) -> Result<Option<String>> {
        require_http_url(url)?;

        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            info!(url, fetcher = "aggressive", attempt = attempt + 1, "Fetching page");
            match self.attempt(url, attempt).await {
                Ok(bytes) => {
                    return Ok(non_empty(html_to_text(&bytes, Some(url)), url, "aggressive"));
                }
                Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    warn!(url, attempt = attempt + 1, error = %e, "Aggressive fetch failed, retrying");
                    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                    tokio::time::sleep(RETRY_BASE * 2u32.pow(attempt) + jitter).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ArchiveError::Render(format!("no attempts made for {url}"))))
    }

    async fn attempt(&self, url: &str, attempt: u32) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .headers(browser_headers(attempt as usize))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        read_body(resp, url, MAX_BODY_BYTES).await
    }
}

pub(crate) fn browser_headers(attempt: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(USER_AGENTS[attempt % USER_AGENTS.len()]),
    );
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,pt-BR;q=0.8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_rotates_per_attempt() {
        let first = browser_headers(0);
        let second = browser_headers(1);
        let wrapped = browser_headers(USER_AGENTS.len());
        assert_ne!(first.get(USER_AGENT), second.get(USER_AGENT));
        assert_eq!(first.get(USER_AGENT), wrapped.get(USER_AGENT));
        assert!(first.contains_key(ACCEPT_LANGUAGE));
    }

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        let http = |status| ArchiveError::Http {
            status,
            url: "https://a.com".into(),
        };
        assert!(http(429).is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(403).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!ArchiveError::InvalidUrl("x".into()).is_retryable());
    }
}
