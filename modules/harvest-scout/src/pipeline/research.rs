// Research pipeline: expand -> search -> filter -> fan-out -> bundle.
//
// Nothing below this level fails the run. Backend outages, rejected URLs and
// exhausted extractions all end up as counts in the bundle.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use harvest_common::{ResearchBundle, ResearchConfig, ResearchContext};

use crate::pipeline::extraction::ExtractionChain;
use crate::pipeline::fan_out::FanOutCoordinator;
use crate::pipeline::quality::QualityValidator;
use crate::pipeline::query_expander::QueryExpander;
use crate::pipeline::search::{AdapterHealth, LayerPlan, LayeredSearchOrchestrator};
use crate::pipeline::stats::{assess, quality_stats, BundleRequirements};
use crate::pipeline::url_filter::{UrlFilter, UrlPolicy};
use crate::traits::ExtractionStrategy;

pub struct ResearchPipeline {
    expander: QueryExpander,
    orchestrator: LayeredSearchOrchestrator,
    plan: LayerPlan,
    policy: UrlPolicy,
    validator: QualityValidator,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    requirements: BundleRequirements,
    max_queries: usize,
    max_follow_ups: usize,
    max_candidates: usize,
    concurrency: usize,
}

impl ResearchPipeline {
    pub fn new(plan: LayerPlan) -> Self {
        Self::from_config(plan, &ResearchConfig::default())
    }

    pub fn from_config(plan: LayerPlan, config: &ResearchConfig) -> Self {
        Self {
            expander: QueryExpander::new(),
            orchestrator: LayeredSearchOrchestrator::new(config.results_per_query),
            plan,
            policy: UrlPolicy::default(),
            validator: QualityValidator::new(config.quality),
            strategies: Vec::new(),
            requirements: BundleRequirements::default(),
            max_queries: config.max_queries,
            max_follow_ups: 0,
            max_candidates: config.max_candidates,
            concurrency: config.extraction_concurrency,
        }
    }

    /// Append an extraction strategy; the chain tries them in this order.
    pub fn strategy(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_policy(mut self, policy: UrlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_requirements(mut self, requirements: BundleRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn max_queries(mut self, max: usize) -> Self {
        self.max_queries = max;
        self
    }

    /// Enable a second search round built from first-round themes. The
    /// layer plan is applied to the follow-up list as its own query list.
    pub fn follow_ups(mut self, max: usize) -> Self {
        self.max_follow_ups = max;
        self
    }

    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn run(&self, seed: &str, context: &ResearchContext) -> ResearchBundle {
        let mut queries = self.expander.expand(seed, context, self.max_queries);
        info!(seed, queries = queries.len(), "Starting research");

        // One health value for the whole run, so a dead backend stays dead
        // across both rounds.
        let mut health = AdapterHealth::new();
        let mut search = self
            .orchestrator
            .run_with_health(&queries, &self.plan, &mut health)
            .await;

        if self.max_follow_ups > 0 && !search.hits.is_empty() {
            let follow_ups: Vec<String> = self
                .expander
                .follow_up_queries(&search.hits, context, self.max_follow_ups)
                .into_iter()
                .filter(|q| !queries.contains(q))
                .collect();
            if !follow_ups.is_empty() {
                info!(count = follow_ups.len(), "Running follow-up search round");
                let second = self
                    .orchestrator
                    .run_with_health(&follow_ups, &self.plan, &mut health)
                    .await;
                search.hits.extend(second.hits);
                search.layer_stats.extend(second.layer_stats.into_iter().map(|mut s| {
                    s.layer_id = format!("{}+follow_up", s.layer_id);
                    s
                }));
                queries.extend(follow_ups);
            }
        }

        let filter = UrlFilter::new(self.policy.clone()).with_primary_layers(self.plan.primary_ids());
        let filtered = filter.filter(search.hits);

        let chain = self
            .strategies
            .iter()
            .cloned()
            .fold(
                ExtractionChain::new(self.validator.clone()).with_context(context.clone()),
                ExtractionChain::strategy,
            );
        let coordinator = FanOutCoordinator::new(Arc::new(chain), self.max_candidates);
        let results = coordinator
            .extract_all(&filtered.candidates, self.concurrency)
            .await;

        let quality = quality_stats(&results);
        let assessment = assess(&quality, &self.requirements);
        let accepted: Vec<_> = results.into_iter().filter(|r| r.success()).collect();

        let bundle = ResearchBundle {
            seed: seed.to_string(),
            queries_executed: queries,
            candidate_count: filtered.candidates.len(),
            rejected_urls: filtered.rejected,
            duplicate_urls: filtered.duplicates,
            accepted,
            layer_stats: search.layer_stats,
            quality,
            assessment,
            degraded: false,
            completed_at: Some(Utc::now()),
        };
        info!(
            seed,
            accepted = bundle.accepted.len(),
            meets_requirements = bundle.assessment.meets_requirements,
            "Research complete"
        );
        bundle
    }
}
