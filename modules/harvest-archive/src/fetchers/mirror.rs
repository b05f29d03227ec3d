// Alternate endpoints for a page: mobile host, AMP variants, web archive
// snapshot and the site's RSS/Atom feed.

use std::time::Duration;

use tracing::{debug, info};

use super::page::non_empty;
use super::{http_client, read_body, require_http_url, MAX_BODY_BYTES};
use crate::error::{ArchiveError, Result};
use crate::readability::{html_to_markdown, strip_tags};

const MIRROR_TIMEOUT: Duration = Duration::from_secs(15);
/// Mirrors often serve stubs or redirect pages; shorter text is ignored.
const MIN_MIRROR_CHARS: usize = 200;
const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
const FEED_PATHS: [&str; 4] = ["/rss", "/feed", "/rss.xml", "/feed.xml"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorKind {
    Mobile,
    Amp,
    Archive,
    Feed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirror {
    pub kind: MirrorKind,
    pub url: String,
}

/// Candidate mirrors in the order they are tried. Never includes `url` itself.
pub fn mirror_urls(url: &str) -> Vec<Mirror> {
    let Ok(parsed) = require_http_url(url) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str() else {
        return Vec::new();
    };
    let bare_host = host.strip_prefix("www.").unwrap_or(host);
    let scheme = parsed.scheme();
    let path = parsed.path();
    let trimmed = url.trim_end_matches('/');

    let mut mirrors = Vec::new();
    let mut push = |kind: MirrorKind, candidate: String| {
        if candidate != url && !mirrors.iter().any(|m: &Mirror| m.url == candidate) {
            mirrors.push(Mirror { kind, url: candidate });
        }
    };

    if !bare_host.starts_with("m.") && !bare_host.starts_with("mobile.") {
        push(MirrorKind::Mobile, format!("{scheme}://m.{bare_host}{path}"));
        push(MirrorKind::Mobile, format!("{scheme}://mobile.{bare_host}{path}"));
    }

    if !bare_host.starts_with("amp.") {
        push(MirrorKind::Amp, format!("{scheme}://amp.{bare_host}{path}"));
    }
    if parsed.query().is_none() {
        push(MirrorKind::Amp, format!("{trimmed}/amp"));
        push(MirrorKind::Amp, format!("{url}?amp=1"));
    } else {
        push(MirrorKind::Amp, format!("{url}&amp=1"));
    }

    push(MirrorKind::Archive, format!("https://web.archive.org/web/{url}"));

    for feed_path in FEED_PATHS {
        push(MirrorKind::Feed, format!("{scheme}://{host}{feed_path}"));
    }

    mirrors
}

pub struct MirrorFetcher {
    client: reqwest::Client,
    mobile_client: reqwest::Client,
}

impl MirrorFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client(MIRROR_TIMEOUT, super::DEFAULT_USER_AGENT)?,
            mobile_client: http_client(MIRROR_TIMEOUT, MOBILE_USER_AGENT)?,
        })
    }

    /// First mirror yielding enough text. Errors only when every mirror
    /// failed at the transport level.
    pub async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let mirrors = mirror_urls(url);
        if mirrors.is_empty() {
            return Err(ArchiveError::InvalidUrl(url.to_string()));
        }

        let mut failures = 0;
        let mut last_err = None;
        for mirror in &mirrors {
            match self.fetch_mirror(mirror).await {
                Ok(Some(text)) if text.chars().count() >= MIN_MIRROR_CHARS => {
                    info!(url, mirror = mirror.url.as_str(), kind = ?mirror.kind, "Mirror hit");
                    return Ok(Some(text));
                }
                Ok(_) => debug!(url, mirror = mirror.url.as_str(), "Mirror had no usable text"),
                Err(e) => {
                    debug!(url, mirror = mirror.url.as_str(), error = %e, "Mirror failed");
                    failures += 1;
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if failures == mirrors.len() => Err(e),
            _ => Ok(None),
        }
    }

    async fn fetch_mirror(&self, mirror: &Mirror) -> Result<Option<String>> {
        let client = match mirror.kind {
            MirrorKind::Mobile => &self.mobile_client,
            _ => &self.client,
        };
        let resp = client.get(&mirror.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: mirror.url.clone(),
            });
        }
        let bytes = read_body(resp, &mirror.url, MAX_BODY_BYTES).await?;

        Ok(match mirror.kind {
            MirrorKind::Feed => feed_to_text(&bytes),
            _ => non_empty(html_to_markdown(&bytes, Some(&mirror.url)), &mirror.url, "mirror"),
        })
    }
}

/// Titles and summaries of every feed entry, one block per entry.
pub fn feed_to_text(bytes: &[u8]) -> Option<String> {
    let feed = feed_rs::parser::parse(bytes).ok()?;
    let blocks: Vec<String> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let body = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .map(|b| strip_tags(&b))
                .unwrap_or_default();
            let block = format!("{}\n{}", title.trim(), body.trim());
            (!block.trim().is_empty()).then(|| block.trim().to_string())
        })
        .collect();

    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n\n"))
    }
}
