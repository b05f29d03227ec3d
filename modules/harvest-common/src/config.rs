use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::HarvestError;

/// Content shorter than this is hard-rejected.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 500;
/// Content with fewer words than this is hard-rejected.
pub const DEFAULT_MIN_WORD_COUNT: usize = 100;
/// Fraction of lines that look like menus/footers/link lists above which
/// content is hard-rejected.
pub const DEFAULT_MAX_BOILERPLATE_RATIO: f64 = 0.35;
/// Composite score required for acceptance.
pub const DEFAULT_MIN_QUALITY_SCORE: f64 = 60.0;

pub const DEFAULT_MAX_QUERIES: usize = 20;
pub const DEFAULT_MAX_CANDIDATES: usize = 25;
pub const DEFAULT_EXTRACTION_CONCURRENCY: usize = 4;
pub const DEFAULT_RESULTS_PER_QUERY: usize = 10;
pub const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 300;

/// Thresholds for the content quality gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityThresholds {
    pub min_chars: usize,
    pub min_words: usize,
    pub max_boilerplate_ratio: f64,
    pub min_score: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chars: DEFAULT_MIN_CONTENT_CHARS,
            min_words: DEFAULT_MIN_WORD_COUNT,
            max_boilerplate_ratio: DEFAULT_MAX_BOILERPLATE_RATIO,
            min_score: DEFAULT_MIN_QUALITY_SCORE,
        }
    }
}

/// Which renderer backs the dynamic-fetch strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBackend {
    None,
    Chrome,
    Browserless {
        base_url: String,
        token: Option<String>,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    // Search backends
    pub serper_api_key: Option<String>,
    pub searxng_url: Option<String>,
    pub news_feed_enabled: bool,

    // Rendering
    pub page_backend: PageBackend,
    /// Chrome executable for `PageBackend::Chrome`, `chromium` when unset.
    pub chrome_bin: Option<String>,

    // Pipeline sizing
    pub max_queries: usize,
    pub max_candidates: usize,
    pub extraction_concurrency: usize,
    pub results_per_query: usize,
    pub research_timeout: Duration,

    pub quality: QualityThresholds,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            serper_api_key: None,
            searxng_url: None,
            news_feed_enabled: true,
            page_backend: PageBackend::None,
            chrome_bin: None,
            max_queries: DEFAULT_MAX_QUERIES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            extraction_concurrency: DEFAULT_EXTRACTION_CONCURRENCY,
            results_per_query: DEFAULT_RESULTS_PER_QUERY,
            research_timeout: Duration::from_secs(DEFAULT_RESEARCH_TIMEOUT_SECS),
            quality: QualityThresholds::default(),
        }
    }
}

impl ResearchConfig {
    /// Load configuration from environment variables. Every variable is
    /// optional; malformed values are a configuration error.
    pub fn from_env() -> Result<Self, HarvestError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env` but reading from an arbitrary lookup, so callers
    /// (and tests) can supply variables without touching the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let page_backend = match get("PAGE_BACKEND").as_deref() {
            None | Some("none") => PageBackend::None,
            Some("chrome") => PageBackend::Chrome,
            Some("browserless") => PageBackend::Browserless {
                base_url: get("BROWSERLESS_URL").ok_or_else(|| {
                    HarvestError::Config(
                        "BROWSERLESS_URL is required when PAGE_BACKEND=browserless".to_string(),
                    )
                })?,
                token: get("BROWSERLESS_TOKEN"),
            },
            Some(other) => {
                return Err(HarvestError::Config(format!(
                    "PAGE_BACKEND must be one of none|chrome|browserless, got {other}"
                )))
            }
        };

        let defaults = QualityThresholds::default();
        let quality = QualityThresholds {
            min_chars: parse_or("QUALITY_MIN_CHARS", get("QUALITY_MIN_CHARS"), defaults.min_chars)?,
            min_words: parse_or("QUALITY_MIN_WORDS", get("QUALITY_MIN_WORDS"), defaults.min_words)?,
            max_boilerplate_ratio: parse_or(
                "QUALITY_MAX_BOILERPLATE",
                get("QUALITY_MAX_BOILERPLATE"),
                defaults.max_boilerplate_ratio,
            )?,
            min_score: parse_or("QUALITY_MIN_SCORE", get("QUALITY_MIN_SCORE"), defaults.min_score)?,
        };

        Ok(Self {
            serper_api_key: get("SERPER_API_KEY"),
            searxng_url: get("SEARXNG_URL"),
            news_feed_enabled: parse_or("NEWS_FEED_ENABLED", get("NEWS_FEED_ENABLED"), true)?,
            page_backend,
            chrome_bin: get("CHROME_BIN"),
            max_queries: parse_or("MAX_QUERIES", get("MAX_QUERIES"), DEFAULT_MAX_QUERIES)?,
            max_candidates: parse_or("MAX_CANDIDATES", get("MAX_CANDIDATES"), DEFAULT_MAX_CANDIDATES)?,
            extraction_concurrency: parse_or(
                "EXTRACTION_CONCURRENCY",
                get("EXTRACTION_CONCURRENCY"),
                DEFAULT_EXTRACTION_CONCURRENCY,
            )?,
            results_per_query: parse_or(
                "RESULTS_PER_QUERY",
                get("RESULTS_PER_QUERY"),
                DEFAULT_RESULTS_PER_QUERY,
            )?,
            research_timeout: Duration::from_secs(parse_or(
                "RESEARCH_TIMEOUT_SECS",
                get("RESEARCH_TIMEOUT_SECS"),
                DEFAULT_RESEARCH_TIMEOUT_SECS,
            )?),
            quality,
        })
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        let backend = match &self.page_backend {
            PageBackend::None => "none".to_string(),
            PageBackend::Chrome => "chrome".to_string(),
            PageBackend::Browserless { base_url, .. } => format!("browserless({base_url})"),
        };
        info!(
            serper = self.serper_api_key.is_some(),
            searxng = self.searxng_url.as_deref().unwrap_or("-"),
            news_feed = self.news_feed_enabled,
            page_backend = backend.as_str(),
            max_queries = self.max_queries,
            max_candidates = self.max_candidates,
            concurrency = self.extraction_concurrency,
            min_score = self.quality.min_score,
            "Research config loaded"
        );
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, HarvestError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| HarvestError::Config(format!("{key} has an invalid value: {v}"))),
    }
}
