// News search via the Google News RSS search endpoint.

use std::time::Duration;

use harvest_common::SearchResult;
use tracing::info;

use super::{http_client, DEFAULT_USER_AGENT};
use crate::error::{ArchiveError, Result};
use crate::readability::strip_tags;

const NEWS_ENDPOINT: &str = "https://news.google.com/rss/search";
const NEWS_TIMEOUT: Duration = Duration::from_secs(15);
/// Feed summaries are HTML fragments; keep snippets short.
const MAX_SNIPPET_CHARS: usize = 300;

pub struct NewsFeedSearch {
    client: reqwest::Client,
    hl: String,
    gl: String,
    ceid: String,
}

impl NewsFeedSearch {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client(NEWS_TIMEOUT, DEFAULT_USER_AGENT)?,
            hl: "en-US".to_string(),
            gl: "US".to_string(),
            ceid: "US:en".to_string(),
        })
    }

    /// Interface language, country and edition (e.g. `pt-BR`, `BR`, `BR:pt-419`).
    pub fn with_locale(mut self, hl: &str, gl: &str, ceid: &str) -> Self {
        self.hl = hl.to_string();
        self.gl = gl.to_string();
        self.ceid = ceid.to_string();
        self
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        info!(query, max_results, "News feed search");

        let resp = self
            .client
            .get(NEWS_ENDPOINT)
            .query(&[
                ("q", query),
                ("hl", self.hl.as_str()),
                ("gl", self.gl.as_str()),
                ("ceid", self.ceid.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: NEWS_ENDPOINT.to_string(),
            });
        }

        let bytes = resp.bytes().await?;
        let results = parse_news_feed(&bytes, max_results)?;

        info!(query, count = results.len(), "News feed search complete");
        Ok(results)
    }
}

/// Turn RSS/Atom entries into search results, newest first as published.
pub fn parse_news_feed(bytes: &[u8], max_results: usize) -> Result<Vec<SearchResult>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| ArchiveError::Parse(format!("news feed: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let snippet = entry
                .summary
                .map(|s| strip_tags(&s.content))
                .unwrap_or_default();
            Some(SearchResult {
                url,
                title,
                snippet: snippet.chars().take(MAX_SNIPPET_CHARS).collect(),
            })
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>News</title>
<item><title>Market grows 12%</title><link>https://news.example.com/a</link>
<description>&lt;a href="x"&gt;Market&lt;/a&gt; grows fast</description></item>
<item><title>Second</title><link>https://news.example.com/b</link></item>
<item><title>Third</title><link>https://news.example.com/c</link></item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_strips_summary_markup() {
        let results = parse_news_feed(RSS.as_bytes(), 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://news.example.com/a");
        assert_eq!(results[0].title, "Market grows 12%");
        assert_eq!(results[0].snippet, "Market grows fast");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn non_feed_body_is_a_parse_error() {
        assert!(matches!(
            parse_news_feed(b"{\"not\":\"a feed\"}", 5),
            Err(ArchiveError::Parse(_))
        ));
    }
}
