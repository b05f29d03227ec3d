// Content quality gate.
//
// Hard rejects: too short, too few words, too much navigation/footer
// boilerplate. Otherwise a 0-100 composite score decides. The verdict is a
// pure function of the content and the thresholds.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use harvest_common::{word_count, QualityThresholds, QualityVerdict, ResearchContext};

/// Each component contributes at most this much to the 0-100 score.
const COMPONENT_WEIGHT: f64 = 25.0;
/// Length and word components saturate at this multiple of their minimum.
const SATURATION_MULTIPLE: f64 = 4.0;
/// Distinct specificity markers needed for the full specificity component.
const SPECIFICITY_SATURATION: usize = 8;

/// Lines shorter than this (in words) read as menu items unless they are headings.
const FRAGMENT_MAX_WORDS: usize = 3;

static SPECIFICITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Percentages
        r"\d+(?:[.,]\d+)?\s?%",
        // Currency amounts
        r"(?:R\$|US\$|\$|€|£)\s?\d[\d.,]*",
        // Years
        r"\b(?:19|20)\d{2}\b",
        // Numeric dates
        r"\b\d{1,2}/\d{1,2}/\d{2,4}\b",
        // Grouped large numbers
        r"\b\d{1,3}(?:[.,]\d{3})+\b",
        // Magnitudes
        r"(?i)\b\d+(?:[.,]\d+)?\s?(?:million|billion|trillion|milhões|bilhões|mil)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\([^)]*\)").expect("valid regex"));

const BOILERPLATE_PHRASES: &[&str] = &[
    "all rights reserved",
    "cookie",
    "privacy policy",
    "terms of use",
    "terms of service",
    "sign in",
    "sign up",
    "log in",
    "subscribe",
    "newsletter",
    "skip to content",
    "política de privacidade",
    "todos os direitos reservados",
    "©",
];

#[derive(Debug, Clone)]
pub struct QualityValidator {
    thresholds: QualityThresholds,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

impl QualityValidator {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// `url` and `context` are only used for logging.
    pub fn validate(&self, content: &str, url: &str, context: &ResearchContext) -> QualityVerdict {
        let t = &self.thresholds;
        let chars = content.trim().chars().count();
        let words = word_count(content);
        let boilerplate = boilerplate_ratio(content);
        let markers = specificity_markers(content);
        let score = composite_score(t, chars, words, markers, boilerplate);

        let hard_reject = if chars < t.min_chars {
            Some(format!("too short: {chars} chars < {}", t.min_chars))
        } else if words < t.min_words {
            Some(format!("too few words: {words} < {}", t.min_words))
        } else if boilerplate > t.max_boilerplate_ratio {
            Some(format!(
                "boilerplate ratio {boilerplate:.2} > {:.2}",
                t.max_boilerplate_ratio
            ))
        } else {
            None
        };

        let (valid, reason) = match hard_reject {
            Some(reason) => (false, reason),
            None if score < t.min_score => (
                false,
                format!("score {score:.1} below minimum {:.1}", t.min_score),
            ),
            None => (true, format!("score {score:.1}")),
        };

        debug!(
            url,
            segment = context.segment().unwrap_or("-"),
            chars,
            words,
            markers,
            boilerplate,
            score,
            valid,
            "Quality verdict"
        );

        QualityVerdict {
            valid,
            score,
            reason,
        }
    }
}

fn composite_score(
    t: &QualityThresholds,
    chars: usize,
    words: usize,
    markers: usize,
    boilerplate: f64,
) -> f64 {
    let length = saturating_ratio(chars as f64, t.min_chars as f64 * SATURATION_MULTIPLE);
    let wording = saturating_ratio(words as f64, t.min_words as f64 * SATURATION_MULTIPLE);
    let specificity = saturating_ratio(markers as f64, SPECIFICITY_SATURATION as f64);
    let clean = 1.0 - boilerplate.clamp(0.0, 1.0);

    let score = COMPONENT_WEIGHT * (length + wording + specificity + clean);
    // Round to one decimal so equal inputs always print and compare equal.
    (score * 10.0).round() / 10.0
}

fn saturating_ratio(value: f64, full: f64) -> f64 {
    if full <= 0.0 {
        return 1.0;
    }
    (value / full).clamp(0.0, 1.0)
}

/// Distinct numeric, currency, percentage, date and magnitude mentions.
pub fn specificity_markers(content: &str) -> usize {
    let mut seen = HashSet::new();
    for pattern in SPECIFICITY_PATTERNS.iter() {
        for m in pattern.find_iter(content) {
            seen.insert(m.as_str().trim().to_lowercase());
        }
    }
    seen.len()
}

/// Fraction of non-empty lines that look like menus, footers or link lists.
/// Content with no lines at all is treated as pure boilerplate.
pub fn boilerplate_ratio(content: &str) -> f64 {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return 1.0;
    }
    let noisy = lines.iter().filter(|l| is_boilerplate_line(l)).count();
    noisy as f64 / lines.len() as f64
}

fn is_boilerplate_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if line.starts_with('#') {
        return false;
    }
    if BOILERPLATE_PHRASES.iter().any(|p| lower.contains(p)) && word_count(line) < 20 {
        return true;
    }
    // Mostly link markup: navigation lists and link farms.
    let link_chars: usize = MARKDOWN_LINK.find_iter(line).map(|m| m.as_str().len()).sum();
    if link_chars * 2 > line.len() {
        return true;
    }
    if line.contains(" | ") && word_count(line) < 12 {
        return true;
    }
    word_count(line) <= FRAGMENT_MAX_WORDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{boilerplate_content, rich_content, thin_content};

    fn validator() -> QualityValidator {
        QualityValidator::default()
    }

    fn ctx() -> ResearchContext {
        ResearchContext::for_segment("coffee")
    }

    #[test]
    fn rich_content_passes() {
        let verdict = validator().validate(&rich_content("coffee"), "https://a.com", &ctx());
        assert!(verdict.valid, "{verdict:?}");
        assert!(verdict.score >= 60.0);
    }

    #[test]
    fn short_content_is_rejected_regardless_of_words() {
        // 400 chars of one-letter words: lots of words, too short.
        let content = "a ".repeat(200);
        assert_eq!(content.trim().chars().count(), 399);
        let verdict = validator().validate(&content, "https://a.com", &ctx());
        assert!(!verdict.valid);
        assert!(verdict.reason.starts_with("too short"));
    }

    #[test]
    fn long_content_with_few_words_is_rejected() {
        let content = "supercalifragilistic ".repeat(40);
        let verdict = validator().validate(&content, "https://a.com", &ctx());
        assert!(!verdict.valid);
        assert!(verdict.reason.starts_with("too few words"));
    }

    #[test]
    fn navigation_heavy_content_is_rejected() {
        let verdict = validator().validate(&boilerplate_content(), "https://a.com", &ctx());
        assert!(!verdict.valid);
        assert!(verdict.reason.starts_with("boilerplate ratio"), "{}", verdict.reason);
    }

    #[test]
    fn thin_content_is_rejected() {
        let verdict = validator().validate(&thin_content(), "https://a.com", &ctx());
        assert!(!verdict.valid);
    }

    #[test]
    fn validation_is_idempotent() {
        let v = validator();
        for content in [rich_content("tea"), boilerplate_content(), thin_content(), String::new()] {
            let first = v.validate(&content, "https://a.com", &ctx());
            let second = v.validate(&content, "https://b.com", &ResearchContext::default());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn score_shortfall_is_reported() {
        let strict = QualityValidator::new(QualityThresholds {
            min_score: 99.0,
            ..QualityThresholds::default()
        });
        let verdict = strict.validate(&rich_content("coffee"), "https://a.com", &ctx());
        assert!(!verdict.valid);
        assert!(verdict.reason.contains("below minimum"));
    }

    #[test]
    fn score_stays_within_bounds() {
        let huge = rich_content("x").repeat(50);
        let verdict = validator().validate(&huge, "https://a.com", &ctx());
        assert!(verdict.score <= 100.0);
        let empty = validator().validate("", "https://a.com", &ctx());
        assert!(empty.score >= 0.0);
        assert!(!empty.valid);
    }

    #[test]
    fn markers_count_distinct_figures() {
        let text = "Sales hit $5,000 in 2023, up 12% and again 12% with 3 million units.";
        // $5,000 / 5,000 / 2023 / 12% / 3 million
        assert_eq!(specificity_markers(text), 5);
    }

    #[test]
    fn headings_are_not_boilerplate() {
        let text = "# Market overview\nThe market expanded quickly in the last decade across regions.";
        assert_eq!(boilerplate_ratio(text), 0.0);
        assert_eq!(boilerplate_ratio(""), 1.0);
    }
}
