use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Research Context ---

/// Attributes describing what is being researched. The seed query is passed
/// alongside; everything here is optional refinement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub segment: Option<String>,
    pub product: Option<String>,
    pub audience: Option<String>,
    pub region: Option<String>,
    /// Free-form extra attributes (`key=value` from the CLI).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResearchContext {
    pub fn for_segment(segment: impl Into<String>) -> Self {
        Self {
            segment: Some(segment.into()),
            ..Self::default()
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Segment trimmed, `None` when blank.
    pub fn segment(&self) -> Option<&str> {
        non_blank(self.segment.as_deref())
    }

    pub fn product(&self) -> Option<&str> {
        non_blank(self.product.as_deref())
    }

    pub fn audience(&self) -> Option<&str> {
        non_blank(self.audience.as_deref())
    }

    pub fn region(&self) -> Option<&str> {
        non_blank(self.region.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// --- Search ---

/// A single organic result as returned by a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// A search result tagged with where it came from. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Backend adapter id (e.g. "serper").
    pub source_id: String,
    /// Layer the query was dispatched in (e.g. "primary").
    pub layer_id: String,
    pub discovered_at: DateTime<Utc>,
}

impl SearchHit {
    pub fn from_result(
        result: SearchResult,
        source_id: &str,
        layer_id: &str,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            title: result.title,
            url: result.url,
            snippet: result.snippet,
            source_id: source_id.to_string(),
            layer_id: layer_id.to_string(),
            discovered_at,
        }
    }
}

// --- URL Filtering ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not a parseable absolute URL.
    InvalidUrl,
    /// Anything other than http/https.
    UnsupportedScheme,
    /// Social networks, shorteners and other deny-listed hosts.
    DeniedDomain,
    /// Login, cart, careers, legal boilerplate pages.
    DeniedPath,
    /// Images, archives, executables.
    BinaryFile,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::InvalidUrl => "invalid_url",
            RejectReason::UnsupportedScheme => "unsupported_scheme",
            RejectReason::DeniedDomain => "denied_domain",
            RejectReason::DeniedPath => "denied_path",
            RejectReason::BinaryFile => "binary_file",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum FilterVerdict {
    /// Known high-signal host (government, academic, research houses).
    Trusted,
    Accepted,
    Rejected(RejectReason),
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, FilterVerdict::Rejected(_))
    }

    /// Predicate priority contribution: 1.0 trusted, 0.5 accepted, 0.0 rejected.
    pub fn predicate_priority(&self) -> f64 {
        match self {
            FilterVerdict::Trusted => 1.0,
            FilterVerdict::Accepted => 0.5,
            FilterVerdict::Rejected(_) => 0.0,
        }
    }
}

/// A deduplicated, prioritised URL ready for extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub hit: SearchHit,
    pub priority: f64,
    pub verdict: FilterVerdict,
}

impl CandidateUrl {
    pub fn url(&self) -> &str {
        &self.hit.url
    }
}

// --- Quality ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub valid: bool,
    /// Composite score, 0-100.
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityTier::Excellent
        } else if score >= 75.0 {
            QualityTier::Good
        } else if score >= 60.0 {
            QualityTier::Fair
        } else {
            QualityTier::Poor
        }
    }
}

// --- Extraction ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ExtractionOutcome {
    /// First strategy whose content passed the quality gate.
    Extracted {
        content: String,
        method: String,
        verdict: QualityVerdict,
    },
    /// Every strategy errored, returned nothing, or was quality-rejected.
    /// Rejected content is never retained.
    Exhausted {
        attempted: usize,
        quality_rejected: usize,
        last_error: Option<String>,
        best_rejection: Option<QualityVerdict>,
    },
}

/// Exactly one per attempted URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    #[serde(flatten)]
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    pub fn extracted(url: &str, content: String, method: &str, verdict: QualityVerdict) -> Self {
        Self {
            url: url.to_string(),
            outcome: ExtractionOutcome::Extracted {
                content,
                method: method.to_string(),
                verdict,
            },
        }
    }

    /// Failure without any strategy having run (dispatch crashed, empty URL).
    pub fn failed(url: &str, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            outcome: ExtractionOutcome::Exhausted {
                attempted: 0,
                quality_rejected: 0,
                last_error: Some(error.into()),
                best_rejection: None,
            },
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ExtractionOutcome::Extracted { .. })
    }

    pub fn method_used(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Extracted { method, .. } => Some(method),
            ExtractionOutcome::Exhausted { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match &self.outcome {
            ExtractionOutcome::Extracted { content, .. } => Some(content),
            ExtractionOutcome::Exhausted { .. } => None,
        }
    }

    pub fn verdict(&self) -> Option<&QualityVerdict> {
        match &self.outcome {
            ExtractionOutcome::Extracted { verdict, .. } => Some(verdict),
            ExtractionOutcome::Exhausted { .. } => None,
        }
    }

    /// Human-readable failure description, `None` on success.
    pub fn error(&self) -> Option<String> {
        match &self.outcome {
            ExtractionOutcome::Extracted { .. } => None,
            ExtractionOutcome::Exhausted {
                attempted,
                quality_rejected,
                last_error,
                best_rejection,
            } => {
                let mut msg = format!(
                    "all strategies exhausted ({attempted} attempted, {quality_rejected} quality-rejected)"
                );
                if let Some(v) = best_rejection {
                    msg.push_str(&format!("; best rejection: {:.1} ({})", v.score, v.reason));
                }
                if let Some(e) = last_error {
                    msg.push_str(&format!("; last error: {e}"));
                }
                Some(msg)
            }
        }
    }
}

// --- Research Bundle ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub layer_id: String,
    pub primary: bool,
    pub queries: u32,
    pub adapter_calls: u32,
    pub failures: u32,
    pub skipped_unhealthy: u32,
    pub hits: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    pub attempted: u32,
    pub accepted: u32,
    /// Percent of attempted URLs that produced accepted content.
    pub success_rate: f64,
    pub avg_score: f64,
    pub total_chars: usize,
    pub unique_domains: usize,
    /// Winning strategy id -> count.
    pub methods: BTreeMap<String, u32>,
    pub distribution: BTreeMap<QualityTier, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleAssessment {
    pub meets_requirements: bool,
    pub issues: Vec<String>,
}

/// The only artifact the research stage hands downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    pub seed: String,
    pub queries_executed: Vec<String>,
    pub candidate_count: usize,
    pub rejected_urls: usize,
    pub duplicate_urls: usize,
    pub accepted: Vec<ExtractionResult>,
    pub layer_stats: Vec<LayerStats>,
    pub quality: QualityStats,
    pub assessment: BundleAssessment,
    /// Produced by a fallback rather than a full pipeline run.
    #[serde(default)]
    pub degraded: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResearchBundle {
    /// Empty bundle marked degraded, used when research could not run.
    pub fn degraded(seed: &str, reason: &str) -> Self {
        Self {
            seed: seed.to_string(),
            assessment: BundleAssessment {
                meets_requirements: false,
                issues: vec![format!("degraded: {reason}")],
            },
            degraded: true,
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

impl std::fmt::Display for ResearchBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Research Complete ===")?;
        writeln!(f, "Seed:               {}", self.seed)?;
        if self.degraded {
            writeln!(f, "Status:             DEGRADED")?;
        }
        writeln!(f, "Queries executed:   {}", self.queries_executed.len())?;
        writeln!(f, "Candidates:         {}", self.candidate_count)?;
        writeln!(f, "URLs rejected:      {}", self.rejected_urls)?;
        writeln!(f, "URLs duplicated:    {}", self.duplicate_urls)?;
        writeln!(f, "Extractions tried:  {}", self.quality.attempted)?;
        writeln!(
            f,
            "Accepted:           {} ({:.0}%)",
            self.quality.accepted, self.quality.success_rate
        )?;
        writeln!(f, "Avg quality:        {:.1}", self.quality.avg_score)?;
        writeln!(f, "Total chars:        {}", self.quality.total_chars)?;
        writeln!(f, "Unique domains:     {}", self.quality.unique_domains)?;
        if !self.layer_stats.is_empty() {
            writeln!(f, "\nBy layer:")?;
            for layer in &self.layer_stats {
                writeln!(
                    f,
                    "  {:<14} {} hits, {} calls, {} failed, {} skipped ({} ms)",
                    layer.layer_id,
                    layer.hits,
                    layer.adapter_calls,
                    layer.failures,
                    layer.skipped_unhealthy,
                    layer.elapsed_ms
                )?;
            }
        }
        if !self.quality.methods.is_empty() {
            writeln!(f, "\nBy method:")?;
            for (method, count) in &self.quality.methods {
                writeln!(f, "  {method:<14} {count}")?;
            }
        }
        if !self.assessment.issues.is_empty() {
            writeln!(f, "\nIssues:")?;
            for issue in &self.assessment.issues {
                writeln!(f, "  - {issue}")?;
            }
        }
        Ok(())
    }
}

// --- Helpers ---

/// Host portion of a URL, lowercased. Falls back to the text before the
/// first `/` when the URL has no scheme.
pub fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or("")
        .split('?')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Normalize a domain for dedup: lowercase + strip leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let d = domain.to_lowercase();
    d.strip_prefix("www.").unwrap_or(&d).to_string()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
