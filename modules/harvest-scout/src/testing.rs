// Test mocks for the research pipeline.
//
// Three mocks matching the two trait boundaries:
// - MockBackend (SearchBackend) : query → canned results, call recording
// - FailingBackend (SearchBackend) : always errors
// - ScriptedStrategy (ExtractionStrategy) : URL → scripted step
//
// Plus content helpers that reliably pass or fail the quality gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use harvest_common::SearchResult;

use crate::traits::{ExtractionStrategy, SearchBackend, StrategyGate};

// ---------------------------------------------------------------------------
// Search mocks
// ---------------------------------------------------------------------------

/// Returns registered results per query, or the default results for any
/// other query. Records every query it receives.
pub struct MockBackend {
    id: String,
    by_query: HashMap<String, Vec<SearchResult>>,
    default: Vec<SearchResult>,
    calls: Arc<AtomicUsize>,
    queries: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            by_query: HashMap::new(),
            default: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn on_query(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.by_query.insert(query.to_string(), results);
        self
    }

    pub fn returning(mut self, results: Vec<SearchResult>) -> Self {
        self.default = results;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared counter, readable after the backend moved into a plan.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn queries_seen(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.queries.lock() {
            seen.push(query.to_string());
        }
        let results = self.by_query.get(query).unwrap_or(&self.default);
        Ok(results.iter().take(max_results).cloned().collect())
    }
}

pub struct FailingBackend {
    id: String,
    calls: Arc<AtomicUsize>,
}

impl FailingBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl SearchBackend for FailingBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("FailingBackend({}): simulated outage for {query}", self.id)
    }
}

pub fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
    SearchResult {
        url: url.to_string(),
        title: title.to_string(),
        snippet: snippet.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Content(String),
    Nothing,
    Fail(String),
    /// Never completes; exercises the per-strategy budget.
    Hang,
    Panic,
}

/// Extraction strategy whose behaviour is scripted per URL, with a default
/// step for everything else.
pub struct ScriptedStrategy {
    id: String,
    budget: Duration,
    gate: StrategyGate,
    default: Step,
    by_url: HashMap<String, Step>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStrategy {
    pub fn new(id: &str, default: Step) -> Self {
        Self {
            id: id.to_string(),
            budget: Duration::from_secs(5),
            gate: StrategyGate::Always,
            default,
            by_url: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returns(id: &str, content: impl Into<String>) -> Self {
        Self::new(id, Step::Content(content.into()))
    }

    pub fn fails(id: &str, message: &str) -> Self {
        Self::new(id, Step::Fail(message.to_string()))
    }

    pub fn on_url(mut self, url: &str, step: Step) -> Self {
        self.by_url.insert(url.to_string(), step);
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = StrategyGate::AfterRejectedContent;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ExtractionStrategy for ScriptedStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    fn gate(&self) -> StrategyGate {
        self.gate
    }

    async fn try_extract(&self, url: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.by_url.get(url).unwrap_or(&self.default) {
            Step::Content(c) => Ok(Some(c.clone())),
            Step::Nothing => Ok(None),
            Step::Fail(msg) => bail!("{}: {msg}", self.id),
            Step::Hang => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            Step::Panic => panic!("ScriptedStrategy({}) panicked on {url}", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Content helpers
// ---------------------------------------------------------------------------

/// Long, specific prose that clears the default quality gate comfortably.
pub fn rich_content(topic: &str) -> String {
    let paragraphs = [
        "The {t} market reached US$ 4.2 billion in 2023, growing 12.5% over the previous year according to the national statistics institute.",
        "Analysts expect revenue of R$ 18.700 million by 2026, driven by urban demand and the expansion of digital sales channels across the southeast region.",
        "Average ticket prices rose from $35 to $41 between 2021 and 2024, while subscription models captured 27% of new customers in the same period.",
        "The three largest companies hold a combined 48% share, and smaller independent operators compete mainly on service quality and regional presence.",
        "Survey data published on 15/03/2024 shows that 62% of buyers compare at least three providers before purchasing, citing price and reliability.",
        "Regulation introduced in 2022 requires labelling and traceability, which raised compliance costs for small producers but improved consumer trust.",
        "Investment in {t} startups totalled US$ 310 million across 45 funding rounds, with most capital concentrated in logistics and payments.",
        "Export volumes increased steadily, and industry associations forecast continued double digit growth as new international agreements come into force.",
    ];
    paragraphs
        .iter()
        .map(|p| p.replace("{t}", topic))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Plenty of words but dominated by navigation fragments.
pub fn boilerplate_content() -> String {
    let mut lines = Vec::new();
    for i in 0..40 {
        lines.push(format!("[Home](https://example.com/{i})"));
        lines.push("Sign in".to_string());
        lines.push("Privacy Policy | Terms of Use | Cookie settings".to_string());
    }
    lines.push(rich_content("filler"));
    lines.join("\n")
}

/// Short, vague text that fails the length and word-count checks.
pub fn thin_content() -> String {
    "Coming soon. Please check back later for more information about this page.".to_string()
}
