use std::collections::{BTreeMap, HashSet};

use harvest_common::{
    extract_domain, normalize_domain, BundleAssessment, ExtractionResult, QualityStats,
    QualityTier,
};

/// Minimums a research bundle should meet before downstream generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleRequirements {
    pub min_sources: u32,
    pub min_total_chars: usize,
    pub min_avg_score: f64,
    pub min_unique_domains: usize,
}

impl Default for BundleRequirements {
    fn default() -> Self {
        Self {
            min_sources: 5,
            min_total_chars: 15_000,
            min_avg_score: 65.0,
            min_unique_domains: 3,
        }
    }
}

/// Aggregate quality over every attempted extraction, accepted or not.
pub fn quality_stats(results: &[ExtractionResult]) -> QualityStats {
    let mut stats = QualityStats {
        attempted: results.len() as u32,
        ..QualityStats::default()
    };
    let mut domains = HashSet::new();
    let mut score_sum = 0.0;
    let mut methods: BTreeMap<String, u32> = BTreeMap::new();
    let mut distribution: BTreeMap<QualityTier, u32> = BTreeMap::new();

    for result in results.iter().filter(|r| r.success()) {
        stats.accepted += 1;
        if let Some(verdict) = result.verdict() {
            score_sum += verdict.score;
            *distribution.entry(QualityTier::from_score(verdict.score)).or_default() += 1;
        }
        if let Some(method) = result.method_used() {
            *methods.entry(method.to_string()).or_default() += 1;
        }
        stats.total_chars += result.content().map_or(0, |c| c.chars().count());
        domains.insert(normalize_domain(&extract_domain(&result.url)));
    }

    if stats.attempted > 0 {
        stats.success_rate = stats.accepted as f64 / stats.attempted as f64 * 100.0;
    }
    if stats.accepted > 0 {
        stats.avg_score = score_sum / stats.accepted as f64;
    }
    stats.unique_domains = domains.len();
    stats.methods = methods;
    stats.distribution = distribution;
    stats
}

pub fn assess(stats: &QualityStats, requirements: &BundleRequirements) -> BundleAssessment {
    let mut issues = Vec::new();
    if stats.accepted < requirements.min_sources {
        issues.push(format!(
            "only {} sources, need {}",
            stats.accepted, requirements.min_sources
        ));
    }
    if stats.total_chars < requirements.min_total_chars {
        issues.push(format!(
            "only {} chars of content, need {}",
            stats.total_chars, requirements.min_total_chars
        ));
    }
    if stats.avg_score < requirements.min_avg_score {
        issues.push(format!(
            "average quality {:.1} below {:.1}",
            stats.avg_score, requirements.min_avg_score
        ));
    }
    if stats.unique_domains < requirements.min_unique_domains {
        issues.push(format!(
            "only {} distinct domains, need {}",
            stats.unique_domains, requirements.min_unique_domains
        ));
    }
    BundleAssessment {
        meets_requirements: issues.is_empty(),
        issues,
    }
}
