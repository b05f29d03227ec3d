// Web search backends: Serper (Google JSON API) and SearXNG.

use std::time::Duration;

use harvest_common::SearchResult;
use tracing::info;

use super::{http_client, DEFAULT_USER_AGENT};
use crate::error::{ArchiveError, Result};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

pub struct SerperSearch {
    api_key: String,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(api_key: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            client: http_client(SEARCH_TIMEOUT, DEFAULT_USER_AGENT)?,
        })
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post(SERPER_ENDPOINT)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: SERPER_ENDPOINT.to_string(),
            });
        }

        let data: SerperResponse = resp
            .json()
            .await
            .map_err(|e| ArchiveError::Parse(format!("Serper response: {e}")))?;

        let results: Vec<SearchResult> = data
            .organic
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = results.len(), "Serper search complete");
        Ok(results)
    }
}

#[derive(Debug, serde::Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SearxngResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Self-hosted SearXNG metasearch instance (`/search?format=json`).
pub struct SearxngSearch {
    base_url: String,
    client: reqwest::Client,
}

impl SearxngSearch {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(SEARCH_TIMEOUT, DEFAULT_USER_AGENT)?,
        })
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        info!(query, max_results, "SearXNG search");

        let endpoint = format!("{}/search", self.base_url);
        let resp = self
            .client
            .get(&endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Http {
                status: status.as_u16(),
                url: endpoint,
            });
        }

        let body = resp.bytes().await?;
        let results = parse_searxng(&body, max_results)?;

        info!(query, count = results.len(), "SearXNG search complete");
        Ok(results)
    }
}

fn parse_searxng(body: &[u8], max_results: usize) -> Result<Vec<SearchResult>> {
    let data: SearxngResponse = serde_json::from_slice(body)
        .map_err(|e| ArchiveError::Parse(format!("SearXNG response: {e}")))?;

    Ok(data
        .results
        .into_iter()
        .take(max_results)
        .map(|r| SearchResult {
            url: r.url,
            title: r.title,
            snippet: r.content,
        })
        .collect())
}
