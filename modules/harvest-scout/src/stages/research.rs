// Stage graph for a research run: `research` (primary, with a degraded
// fallback) feeding `digest`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use harvest_common::{extract_domain, normalize_domain, ResearchBundle, ResearchContext};

use super::error::StageError;
use super::executor::{StageExecutor, StageInput, StageSpec};
use crate::pipeline::research::ResearchPipeline;

pub const RESEARCH_STAGE: &str = "research";
pub const DIGEST_STAGE: &str = "digest";

const DIGEST_TOP_DOMAINS: usize = 5;

/// Shared input of a research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub seed: String,
    #[serde(default)]
    pub context: ResearchContext,
}

impl ResearchRequest {
    fn from_input(input: &StageInput) -> anyhow::Result<Self> {
        serde_json::from_value((*input.input).clone()).context("invalid research request")
    }
}

/// Executor with the research stage (bounded by `timeout`, falling back to
/// an empty degraded bundle) and the digest stage that summarises it.
pub fn research_stages(pipeline: Arc<ResearchPipeline>, timeout: Duration) -> Result<StageExecutor, StageError> {
    let mut executor = StageExecutor::new();

    executor.register(
        StageSpec::new(RESEARCH_STAGE, move |input: StageInput| {
            let pipeline = pipeline.clone();
            async move {
                let request = ResearchRequest::from_input(&input)?;
                let bundle = pipeline.run(&request.seed, &request.context).await;
                Ok(serde_json::to_value(bundle)?)
            }
        })
        .primary()
        .timeout(timeout)
        .fallback(|input: StageInput| async move {
            let request = ResearchRequest::from_input(&input)?;
            let bundle = ResearchBundle::degraded(&request.seed, "research stage did not complete");
            Ok(serde_json::to_value(bundle)?)
        }),
    )?;

    executor.register(
        StageSpec::new(DIGEST_STAGE, |input: StageInput| async move {
            let raw = input
                .upstream(RESEARCH_STAGE)
                .cloned()
                .context("research output missing")?;
            let bundle: ResearchBundle = serde_json::from_value(raw)?;
            Ok(digest(&bundle))
        })
        .depends_on(RESEARCH_STAGE),
    )?;

    Ok(executor)
}

/// Compact summary for downstream consumers. Never contains page content.
pub fn digest(bundle: &ResearchBundle) -> Value {
    let mut domains: BTreeMap<String, usize> = BTreeMap::new();
    for result in &bundle.accepted {
        *domains
            .entry(normalize_domain(&extract_domain(&result.url)))
            .or_default() += 1;
    }
    let mut top: Vec<(String, usize)> = domains.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(DIGEST_TOP_DOMAINS);

    json!({
        "seed": bundle.seed,
        "status": if bundle.degraded { "degraded" } else { "complete" },
        "sources": bundle.accepted.len(),
        "avg_score": bundle.quality.avg_score,
        "total_chars": bundle.quality.total_chars,
        "top_domains": top.into_iter().map(|(d, _)| d).collect::<Vec<_>>(),
        "meets_requirements": bundle.assessment.meets_requirements,
        "issues": bundle.assessment.issues,
    })
}
