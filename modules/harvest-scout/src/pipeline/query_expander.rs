// Query expansion: seed + research context → ordered, de-duplicated queries.
//
// Candidates come from fixed template families (market sizing, competition,
// trends, pricing, geography, temporal), product/audience phrasings, and
// literal market-intelligence phrasings. Near-duplicates are dropped by
// word-set Jaccard similarity; first-seen order is kept.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Utc};
use tracing::debug;

use harvest_common::{ResearchContext, SearchHit};

/// A query whose word set overlaps an already-kept query by more than this is dropped.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 0.7;

/// Template families in emission order. Placeholders: `{segment}`,
/// `{product}`, `{audience}`, `{region}`, `{year}`, `{next_year}`. A template
/// whose placeholder has no value in the context is skipped.
const SEGMENT_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "market_sizing",
        &[
            "{segment} market size {year}",
            "{segment} market revenue growth statistics",
            "{segment} market size {region}",
        ],
    ),
    (
        "competition",
        &[
            "{segment} leading companies market share",
            "{segment} competitive landscape analysis",
            "{segment} top players {region}",
        ],
    ),
    (
        "trends",
        &[
            "{segment} trends {year} {next_year}",
            "{segment} innovation emerging technologies",
        ],
    ),
    (
        "pricing",
        &[
            "{segment} average price benchmarks",
            "{product} pricing models comparison",
        ],
    ),
    (
        "geography",
        &[
            "{segment} industry {region} regional data",
            "{segment} consumer demand by region",
        ],
    ),
    (
        "temporal",
        &[
            "{segment} forecast {next_year}",
            "{segment} historical growth last five years",
        ],
    ),
];

const PRODUCT_TEMPLATES: &[&str] = &[
    "{product} market analysis",
    "{product} customer reviews complaints",
    "{product} alternatives competitors",
];

const AUDIENCE_TEMPLATES: &[&str] = &[
    "{audience} buying behavior {segment}",
    "{audience} pain points survey",
];

/// Phrasings that steer engines towards consultancies, institutes and
/// official statistics.
const INTELLIGENCE_TEMPLATES: &[&str] = &[
    "{segment} industry report market study",
    "{segment} McKinsey Deloitte consulting study",
    "{segment} official statistics institute {region}",
];

/// Words too common to make a useful follow-up theme.
const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "being", "como", "from", "have", "into", "mais", "more",
    "most", "much", "para", "over", "pela", "pelo", "some", "such", "than", "that", "their",
    "them", "there", "these", "they", "this", "what", "when", "where", "which", "will", "with",
    "your",
];

/// Gap topics: (stems that count as covered, query suffix when uncovered).
const GAP_TOPICS: &[(&[&str], &str)] = &[
    (&["pric", "preço", "preco", "cost"], "pricing"),
    (&["regulat", "regulament", "legislat"], "regulation"),
    (&["invest", "funding"], "investment funding"),
];

const FOLLOW_UP_MIN_OCCURRENCES: usize = 2;
const FOLLOW_UP_MIN_LETTERS: usize = 4;

pub struct QueryExpander {
    year: i32,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander {
    pub fn new() -> Self {
        Self {
            year: Utc::now().year(),
        }
    }

    /// Pin the year used by temporal templates.
    pub fn with_year(year: i32) -> Self {
        Self { year }
    }

    /// Ordered queries for `seed`, truncated to `max` (the seed is always
    /// returned, even when `max` is 0).
    pub fn expand(&self, seed: &str, context: &ResearchContext, max: usize) -> Vec<String> {
        let mut kept = DedupedQueries::new(max.max(1));
        kept.offer(seed);

        let values = self.placeholder_values(context);

        for (family, templates) in SEGMENT_TEMPLATES {
            for template in *templates {
                if let Some(q) = render(template, &values) {
                    if !kept.offer(&q) {
                        debug!(family, query = q.as_str(), "Dropped near-duplicate query");
                    }
                }
            }
        }

        for template in PRODUCT_TEMPLATES.iter().chain(AUDIENCE_TEMPLATES) {
            if let Some(q) = render(template, &values) {
                kept.offer(&q);
            }
        }

        // Free-form attributes refine the segment (or stand alone without one).
        for value in context.attributes.values() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match context.segment() {
                Some(segment) => kept.offer(&format!("{segment} {value}")),
                None => kept.offer(value),
            };
        }

        for template in INTELLIGENCE_TEMPLATES {
            if let Some(q) = render(template, &values) {
                kept.offer(&q);
            }
        }

        kept.into_vec()
    }

    /// Second-round queries from what the first round found: recurring
    /// title/snippet themes combined with the segment, plus gap-filling
    /// queries for pricing, regulation and investment when no hit title
    /// mentions them.
    pub fn follow_up_queries(
        &self,
        hits: &[SearchHit],
        context: &ResearchContext,
        max: usize,
    ) -> Vec<String> {
        if max == 0 || hits.is_empty() {
            return Vec::new();
        }
        let mut kept = DedupedQueries::new(max);
        let segment = context.segment();
        let segment_words: HashSet<String> = segment.map(word_set).unwrap_or_default();

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for hit in hits {
            for word in tokens(&hit.title).chain(tokens(&hit.snippet)) {
                if word.chars().count() >= FOLLOW_UP_MIN_LETTERS
                    && word.chars().all(char::is_alphabetic)
                    && !STOPWORDS.contains(&word.as_str())
                    && !segment_words.contains(&word)
                {
                    *counts.entry(word).or_default() += 1;
                }
            }
        }

        let mut themes: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n >= FOLLOW_UP_MIN_OCCURRENCES)
            .collect();
        // Most frequent first; BTreeMap order breaks ties alphabetically.
        themes.sort_by(|a, b| b.1.cmp(&a.1));

        for (theme, _) in themes {
            match segment {
                Some(s) => kept.offer(&format!("{s} {theme}")),
                None => kept.offer(&theme),
            };
        }

        let titles: Vec<String> = hits.iter().map(|h| h.title.to_lowercase()).collect();
        for (stems, suffix) in GAP_TOPICS {
            let covered = titles
                .iter()
                .any(|t| stems.iter().any(|stem| t.contains(stem)));
            if !covered {
                match segment {
                    Some(s) => kept.offer(&format!("{s} {suffix}")),
                    None => kept.offer(suffix),
                };
            }
        }

        kept.into_vec()
    }

    fn placeholder_values(&self, context: &ResearchContext) -> Vec<(&'static str, String)> {
        let mut values = Vec::new();
        if let Some(s) = context.segment() {
            values.push(("{segment}", s.to_string()));
        }
        if let Some(p) = context.product() {
            values.push(("{product}", p.to_string()));
        }
        if let Some(a) = context.audience() {
            values.push(("{audience}", a.to_string()));
        }
        if let Some(r) = context.region() {
            values.push(("{region}", r.to_string()));
        }
        values.push(("{year}", self.year.to_string()));
        values.push(("{next_year}", (self.year + 1).to_string()));
        values
    }
}

/// Fill a template; `None` if any placeholder is left unfilled.
fn render(template: &str, values: &[(&'static str, String)]) -> Option<String> {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(key, value);
    }
    if out.contains('{') {
        None
    } else {
        Some(out.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn word_set(text: &str) -> HashSet<String> {
    tokens(text).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Accumulates queries, rejecting blanks and near-duplicates, up to a cap.
struct DedupedQueries {
    max: usize,
    queries: Vec<String>,
    word_sets: Vec<HashSet<String>>,
}

impl DedupedQueries {
    fn new(max: usize) -> Self {
        Self {
            max,
            queries: Vec::new(),
            word_sets: Vec::new(),
        }
    }

    /// Returns true when the query was kept.
    fn offer(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() || self.queries.len() >= self.max {
            return false;
        }
        let words = word_set(query);
        if words.is_empty() {
            return false;
        }
        if self
            .word_sets
            .iter()
            .any(|kept| jaccard(kept, &words) > NEAR_DUPLICATE_THRESHOLD)
        {
            return false;
        }
        self.queries.push(query.to_string());
        self.word_sets.push(words);
        true
    }

    fn into_vec(self) -> Vec<String> {
        self.queries
    }
}
