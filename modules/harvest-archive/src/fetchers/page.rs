// Static HTTP fetch and rendered (Chrome / Browserless) page fetchers.

use std::time::Duration;

use anyhow::Context;
use harvest_common::PageBackend;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::{http_client, read_body, require_http_url, DEFAULT_USER_AGENT, MAX_BODY_BYTES};
use crate::error::{ArchiveError, Result};
use crate::readability::{extract_title, html_to_markdown};

const STATIC_TIMEOUT: Duration = Duration::from_secs(20);

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS).
const MAX_CONCURRENT_CHROME: usize = 2;
/// Max retry attempts for transient Chrome failures.
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration for Chrome retries. Actual delay is base * 3^attempt + jitter.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);
const CHROME_TIMEOUT: Duration = Duration::from_secs(30);

/// Plain GET + Readability markdown.
pub struct StaticFetcher {
    client: reqwest::Client,
}

impl StaticFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client(STATIC_TIMEOUT, DEFAULT_USER_AGENT)?,
        })
    }

    /// Returns `None` when the page body is empty or not HTML.
    pub async fn fetch(&self, url: &str) -> Result<Option<String>> {
        require_http_url(url)?;
        info!(url, fetcher = "static", "Fetching page");

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html") || ct.contains("text/plain"))
            .unwrap_or(true);
        if !is_html {
            warn!(url, fetcher = "static", "Non-HTML content type, skipping");
            return Ok(None);
        }

        let bytes = read_body(resp, url, MAX_BODY_BYTES).await?;
        let title = extract_title(&String::from_utf8_lossy(&bytes));
        info!(url, fetcher = "static", bytes = bytes.len(), title = title.as_deref().unwrap_or("-"), "Fetched successfully");
        Ok(non_empty(html_to_markdown(&bytes, Some(url)), url, "static"))
    }
}

/// Fully rendered page via headless Chrome or a Browserless instance.
pub enum RenderedFetcher {
    Chrome(ChromeRenderer),
    Browserless(browserless_client::BrowserlessClient),
}

impl RenderedFetcher {
    /// `None` when no renderer is configured.
    pub fn from_backend(backend: &PageBackend, chrome_bin: Option<&str>) -> Result<Option<Self>> {
        Ok(match backend {
            PageBackend::None => None,
            PageBackend::Chrome => Some(RenderedFetcher::Chrome(ChromeRenderer::new(
                chrome_bin.unwrap_or("chromium"),
            ))),
            PageBackend::Browserless { base_url, token } => {
                info!(base_url = base_url.as_str(), "BrowserlessFetcher initialized");
                Some(RenderedFetcher::Browserless(
                    browserless_client::BrowserlessClient::new(base_url, token.as_deref())?,
                ))
            }
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            RenderedFetcher::Chrome(_) => "chrome",
            RenderedFetcher::Browserless(_) => "browserless",
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<Option<String>> {
        require_http_url(url)?;
        let fetcher = self.backend_name();
        info!(url, fetcher, "Fetching page");

        let html = match self {
            RenderedFetcher::Chrome(chrome) => chrome.dump_dom(url).await?,
            RenderedFetcher::Browserless(client) => client.content(url).await?.into_bytes(),
        };

        if html.is_empty() {
            warn!(url, fetcher, "Empty DOM output");
            return Ok(None);
        }

        info!(url, fetcher, bytes = html.len(), "Fetched successfully");
        Ok(non_empty(html_to_markdown(&html, Some(url)), url, fetcher))
    }
}

pub struct ChromeRenderer {
    chrome_bin: String,
    semaphore: Semaphore,
}

impl ChromeRenderer {
    pub fn new(chrome_bin: &str) -> Self {
        info!(chrome_bin, "ChromeRenderer initialized (max_concurrent={MAX_CONCURRENT_CHROME})");
        Self {
            chrome_bin: chrome_bin.to_string(),
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
        }
    }

    /// Launch Chrome --dump-dom and return raw stdout bytes.
    async fn dump_dom(&self, url: &str) -> Result<Vec<u8>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ArchiveError::Render("Chrome semaphore closed".to_string()))?;

        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let tmp_dir = tempfile::tempdir().context("Failed to create temp profile dir")?;
            let last_attempt = attempt + 1 >= CHROME_MAX_ATTEMPTS;

            let result = tokio::time::timeout(
                CHROME_TIMEOUT,
                tokio::process::Command::new(&self.chrome_bin)
                    .args([
                        "--headless",
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        &format!("--user-data-dir={}", tmp_dir.path().display()),
                        "--dump-dom",
                        url,
                    ])
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => {
                    if output.stdout.is_empty() && !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome returned empty DOM, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    return Ok(output.stdout);
                }
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if is_transient_error(&stderr) && !last_attempt {
                        backoff(attempt).await;
                        continue;
                    }
                    warn!(url, fetcher = "chrome", stderr = %stderr, "Chrome exited with error");
                    return Ok(Vec::new());
                }
                Ok(Err(e)) => {
                    if is_transient_error(&e.to_string()) && !last_attempt {
                        warn!(url, attempt = attempt + 1, error = %e, "Chrome launch failed, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(ArchiveError::Render(format!("failed to run Chrome for {url}: {e}")));
                }
                Err(_) => {
                    if !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome timed out, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    return Err(ArchiveError::Render(format!(
                        "Chrome timed out after {}s for {url}",
                        CHROME_TIMEOUT.as_secs()
                    )));
                }
            }
        }

        Ok(Vec::new())
    }
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

async fn backoff(attempt: u32) {
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    tokio::time::sleep(CHROME_RETRY_BASE * 3u32.pow(attempt) + jitter).await;
}

pub(crate) fn non_empty(text: String, url: &str, fetcher: &str) -> Option<String> {
    if text.trim().is_empty() {
        warn!(url, fetcher, "No text extracted");
        None
    } else {
        Some(text)
    }
}
