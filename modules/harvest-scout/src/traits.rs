// Trait abstractions for the pipeline's two external seams.
//
// SearchBackend: one search provider (Serper, SearXNG, news RSS).
// ExtractionStrategy: one way of turning a URL into text.
//
// Both return anyhow::Result: failures are contained and logged by the
// orchestrator / chain, never propagated. Mocks live in `testing`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use harvest_archive::{
    AggressiveFetcher, MirrorFetcher, NewsFeedSearch, RenderedFetcher, SearxngSearch,
    SerperSearch, StaticFetcher,
};
use harvest_common::SearchResult;

// ---------------------------------------------------------------------------
// SearchBackend
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Stable adapter id, recorded on every hit and used for health tracking.
    fn id(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

#[async_trait]
impl SearchBackend for SerperSearch {
    fn id(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(SerperSearch::search(self, query, max_results).await?)
    }
}

#[async_trait]
impl SearchBackend for SearxngSearch {
    fn id(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(SearxngSearch::search(self, query, max_results).await?)
    }
}

#[async_trait]
impl SearchBackend for NewsFeedSearch {
    fn id(&self) -> &str {
        "news_rss"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        Ok(NewsFeedSearch::search(self, query, max_results).await?)
    }
}

// ---------------------------------------------------------------------------
// ExtractionStrategy
// ---------------------------------------------------------------------------

/// When a strategy is eligible to run within one chain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyGate {
    Always,
    /// Only after an earlier strategy produced content that failed the
    /// quality gate. Errors and empty results do not open this gate.
    AfterRejectedContent,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn id(&self) -> &str;

    /// Time allowed for one attempt; the chain abandons it afterwards.
    fn budget(&self) -> Duration;

    fn gate(&self) -> StrategyGate {
        StrategyGate::Always
    }

    /// `Ok(None)` means the strategy ran but found nothing.
    async fn try_extract(&self, url: &str) -> Result<Option<String>>;
}

#[async_trait]
impl ExtractionStrategy for StaticFetcher {
    fn id(&self) -> &str {
        "static"
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(25)
    }

    async fn try_extract(&self, url: &str) -> Result<Option<String>> {
        Ok(self.fetch(url).await?)
    }
}

#[async_trait]
impl ExtractionStrategy for RenderedFetcher {
    fn id(&self) -> &str {
        "rendered"
    }

    fn budget(&self) -> Duration {
        // Chrome retries with backoff inside one attempt.
        Duration::from_secs(90)
    }

    fn gate(&self) -> StrategyGate {
        StrategyGate::AfterRejectedContent
    }

    async fn try_extract(&self, url: &str) -> Result<Option<String>> {
        Ok(self.fetch(url).await?)
    }
}

#[async_trait]
impl ExtractionStrategy for AggressiveFetcher {
    fn id(&self) -> &str {
        "aggressive"
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn try_extract(&self, url: &str) -> Result<Option<String>> {
        Ok(self.fetch(url).await?)
    }
}

#[async_trait]
impl ExtractionStrategy for MirrorFetcher {
    fn id(&self) -> &str {
        "mirrors"
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn try_extract(&self, url: &str) -> Result<Option<String>> {
        Ok(self.fetch(url).await?)
    }
}
