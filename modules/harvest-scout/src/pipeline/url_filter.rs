//! URL acceptability, exact-URL dedup and extraction priority.
//!
//! Rejections are expected (social links, login pages, binaries) so they are
//! counted and logged at debug, never treated as errors.

use std::collections::HashSet;

use tracing::{debug, info};

use harvest_common::{
    extract_domain, normalize_domain, CandidateUrl, FilterVerdict, RejectReason, SearchHit,
};

const PREDICATE_WEIGHT: f64 = 0.5;
const LAYER_WEIGHT: f64 = 0.3;
const SNIPPET_WEIGHT: f64 = 0.2;
/// Snippets this long (in chars) earn the full snippet component.
const SNIPPET_FULL_CHARS: f64 = 300.0;
const PRIMARY_LAYER_FACTOR: f64 = 1.0;
const SECONDARY_LAYER_FACTOR: f64 = 0.8;

const DENIED_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "linkedin.com",
    "pinterest.com",
    "youtube.com",
    "whatsapp.com",
    "t.me",
    "bit.ly",
    "t.co",
    "tinyurl.com",
    "goo.gl",
    "ow.ly",
];

/// Path tokens that mark account, commerce or legal pages. A segment matches
/// when it is the token or starts with it followed by `-`, `_` or `.`.
const DENIED_PATH_SEGMENTS: &[&str] = &[
    "login",
    "signin",
    "sign-in",
    "signup",
    "sign-up",
    "register",
    "cadastro",
    "account",
    "cart",
    "carrinho",
    "checkout",
    "careers",
    "privacy",
    "terms",
    "cookies",
];

/// No extraction strategy handles these, so they would only burn budget.
const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "gz", "exe", "dmg", "jpg",
    "jpeg", "png", "gif", "webp", "svg", "mp3", "mp4", "avi", "mov",
];

/// Government, academic and research-house hosts.
const TRUSTED_DOMAINS: &[&str] = &[
    "ibge.gov.br",
    "worldbank.org",
    "oecd.org",
    "imf.org",
    "statista.com",
    "mckinsey.com",
    "deloitte.com",
    "pwc.com",
    "bcg.com",
    "kpmg.com",
    "gartner.com",
    "euromonitor.com",
    "nielsen.com",
];
const TRUSTED_LABELS: &[&str] = &["gov", "edu", "gob", "ac"];

/// The acceptability predicate. Built with sensible defaults; deny and trust
/// lists can be extended per run.
#[derive(Debug, Clone)]
pub struct UrlPolicy {
    denied_domains: Vec<String>,
    denied_path_segments: Vec<String>,
    trusted_domains: Vec<String>,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            denied_domains: DENIED_DOMAINS.iter().map(|s| s.to_string()).collect(),
            denied_path_segments: DENIED_PATH_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            trusted_domains: TRUSTED_DOMAINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UrlPolicy {
    pub fn deny_domain(mut self, domain: &str) -> Self {
        self.denied_domains.push(normalize_domain(domain));
        self
    }

    pub fn deny_path_segment(mut self, segment: &str) -> Self {
        self.denied_path_segments.push(segment.to_lowercase());
        self
    }

    pub fn trust_domain(mut self, domain: &str) -> Self {
        self.trusted_domains.push(normalize_domain(domain));
        self
    }

    pub fn evaluate(&self, url: &str) -> FilterVerdict {
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(_) => return FilterVerdict::Rejected(RejectReason::InvalidUrl),
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return FilterVerdict::Rejected(RejectReason::UnsupportedScheme);
        }
        let host = match parsed.host_str() {
            Some(h) if !h.is_empty() => normalize_domain(h),
            _ => return FilterVerdict::Rejected(RejectReason::InvalidUrl),
        };

        if self.denied_domains.iter().any(|d| domain_matches(&host, d)) {
            return FilterVerdict::Rejected(RejectReason::DeniedDomain);
        }

        let path = parsed.path().to_lowercase();
        let denied_path = path.split('/').filter(|s| !s.is_empty()).any(|segment| {
            self.denied_path_segments
                .iter()
                .any(|denied| segment_matches(segment, denied))
        });
        if denied_path {
            return FilterVerdict::Rejected(RejectReason::DeniedPath);
        }

        if let Some(ext) = path.rsplit('/').next().and_then(|last| last.rsplit_once('.')) {
            if BINARY_EXTENSIONS.contains(&ext.1) {
                return FilterVerdict::Rejected(RejectReason::BinaryFile);
            }
        }

        let trusted = self.trusted_domains.iter().any(|d| domain_matches(&host, d))
            || host
                .split('.')
                .rev()
                .take(2)
                .any(|label| TRUSTED_LABELS.contains(&label));
        if trusted {
            FilterVerdict::Trusted
        } else {
            FilterVerdict::Accepted
        }
    }
}

/// `login`, `login.php` and `terms-of-use` match; `cartography` does not.
fn segment_matches(segment: &str, denied: &str) -> bool {
    match segment.strip_prefix(denied) {
        Some(rest) => rest.is_empty() || rest.starts_with(['-', '_', '.']),
        None => false,
    }
}

/// `host` is `domain` or one of its subdomains.
fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Output of one filter pass.
#[derive(Debug, Clone, Default)]
pub struct FilteredCandidates {
    /// Unique, accepted URLs, highest priority first.
    pub candidates: Vec<CandidateUrl>,
    pub rejected: usize,
    pub duplicates: usize,
}

pub struct UrlFilter {
    policy: UrlPolicy,
    primary_layers: HashSet<String>,
}

impl UrlFilter {
    pub fn new(policy: UrlPolicy) -> Self {
        Self {
            policy,
            primary_layers: HashSet::new(),
        }
    }

    /// Layers whose hits get the primary-layer priority factor.
    pub fn with_primary_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(&self, hits: Vec<SearchHit>) -> FilteredCandidates {
        let total = hits.len();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = FilteredCandidates::default();

        for hit in hits {
            if !seen.insert(hit.url.clone()) {
                out.duplicates += 1;
                continue;
            }
            let verdict = self.policy.evaluate(&hit.url);
            if let FilterVerdict::Rejected(reason) = verdict {
                debug!(url = hit.url.as_str(), %reason, "URL rejected");
                out.rejected += 1;
                continue;
            }
            let priority = self.priority(&hit, &verdict);
            out.candidates.push(CandidateUrl {
                hit,
                priority,
                verdict,
            });
        }

        // Stable sort: equal priorities keep input order.
        out.candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        info!(
            hits = total,
            candidates = out.candidates.len(),
            rejected = out.rejected,
            duplicates = out.duplicates,
            domains = unique_domains(&out.candidates),
            "URL filter complete"
        );
        out
    }

    fn priority(&self, hit: &SearchHit, verdict: &FilterVerdict) -> f64 {
        let layer = if self.primary_layers.contains(&hit.layer_id) {
            PRIMARY_LAYER_FACTOR
        } else {
            SECONDARY_LAYER_FACTOR
        };
        let snippet = (hit.snippet.trim().chars().count() as f64 / SNIPPET_FULL_CHARS).min(1.0);
        PREDICATE_WEIGHT * verdict.predicate_priority() + LAYER_WEIGHT * layer + SNIPPET_WEIGHT * snippet
    }
}

fn unique_domains(candidates: &[CandidateUrl]) -> usize {
    candidates
        .iter()
        .map(|c| normalize_domain(&extract_domain(c.url())))
        .collect::<HashSet<_>>()
        .len()
}
