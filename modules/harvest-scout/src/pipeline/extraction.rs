// Extraction strategy chain.
//
// Strategies run in order; every non-empty result goes straight through the
// quality gate and the first passing one wins. Errors, timeouts and panics
// are logged and the chain moves on. Rejected content is dropped
// immediately; only its verdict survives for diagnostics.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use harvest_common::{ExtractionOutcome, ExtractionResult, QualityVerdict, ResearchContext};

use crate::pipeline::quality::QualityValidator;
use crate::traits::{ExtractionStrategy, StrategyGate};

pub struct ExtractionChain {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    validator: QualityValidator,
    context: ResearchContext,
}

impl ExtractionChain {
    pub fn new(validator: QualityValidator) -> Self {
        Self {
            strategies: Vec::new(),
            validator,
            context: ResearchContext::default(),
        }
    }

    pub fn strategy(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Context passed to the validator for log correlation.
    pub fn with_context(mut self, context: ResearchContext) -> Self {
        self.context = context;
        self
    }

    pub fn strategy_ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    pub async fn extract(&self, url: &str) -> ExtractionResult {
        let mut attempted = 0;
        let mut quality_rejected = 0;
        let mut last_error: Option<String> = None;
        let mut best_rejection: Option<QualityVerdict> = None;

        for strategy in &self.strategies {
            let id = strategy.id();
            if strategy.gate() == StrategyGate::AfterRejectedContent && quality_rejected == 0 {
                debug!(url, strategy = id, "Skipping gated strategy: no rejected content yet");
                continue;
            }

            attempted += 1;
            let budget = strategy.budget();
            let attempt = AssertUnwindSafe(strategy.try_extract(url)).catch_unwind();

            let content = match tokio::time::timeout(budget, attempt).await {
                Err(_) => {
                    warn!(url, strategy = id, budget_ms = budget.as_millis() as u64, "Strategy exceeded budget");
                    last_error = Some(format!("{id}: timed out after {}ms", budget.as_millis()));
                    continue;
                }
                Ok(Err(_panic)) => {
                    warn!(url, strategy = id, "Strategy panicked");
                    last_error = Some(format!("{id}: panicked"));
                    continue;
                }
                Ok(Ok(Err(e))) => {
                    warn!(url, strategy = id, error = %e, "Strategy failed");
                    last_error = Some(format!("{id}: {e}"));
                    continue;
                }
                Ok(Ok(Ok(None))) => {
                    debug!(url, strategy = id, "Strategy returned no content");
                    continue;
                }
                Ok(Ok(Ok(Some(content)))) => content,
            };

            let verdict = self.validator.validate(&content, url, &self.context);
            if verdict.valid {
                info!(url, strategy = id, score = verdict.score, chars = content.len(), "Extraction accepted");
                return ExtractionResult::extracted(url, content, id, verdict);
            }

            debug!(url, strategy = id, reason = verdict.reason.as_str(), "Content rejected by quality gate");
            quality_rejected += 1;
            if best_rejection.as_ref().is_none_or(|best| verdict.score > best.score) {
                best_rejection = Some(verdict);
            }
        }

        info!(url, attempted, quality_rejected, "All extraction strategies exhausted");
        ExtractionResult {
            url: url.to_string(),
            outcome: ExtractionOutcome::Exhausted {
                attempted,
                quality_rejected,
                last_error,
                best_rejection,
            },
        }
    }
}
