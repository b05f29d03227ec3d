// Layered search dispatch.
//
// Each layer owns a disjoint slice of the query list, an ordered set of
// backends and a minimum delay between consecutive backend calls. Layers and
// in-layer backends run sequentially in declared order. A failing backend is
// contained per call; repeated failures mark it unhealthy for the rest of the
// run via an explicit `AdapterHealth` value.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use harvest_common::{HarvestError, LayerStats, SearchHit};

use crate::traits::SearchBackend;

/// Consecutive failures after which a backend is skipped for the rest of the run.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

// ---------------------------------------------------------------------------
// Adapter health
// ---------------------------------------------------------------------------

/// Per-backend consecutive failure counts. Owned by the caller so health can
/// be carried across runs or reset explicitly.
#[derive(Debug, Clone, Default)]
pub struct AdapterHealth {
    consecutive_failures: HashMap<String, u32>,
}

impl AdapterHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, adapter_id: &str) -> bool {
        self.consecutive_failures(adapter_id) < UNHEALTHY_AFTER_FAILURES
    }

    pub fn consecutive_failures(&self, adapter_id: &str) -> u32 {
        self.consecutive_failures.get(adapter_id).copied().unwrap_or(0)
    }

    pub fn record_success(&mut self, adapter_id: &str) {
        self.consecutive_failures.remove(adapter_id);
    }

    /// Returns true when this failure made the adapter unhealthy.
    pub fn record_failure(&mut self, adapter_id: &str) -> bool {
        let count = self
            .consecutive_failures
            .entry(adapter_id.to_string())
            .or_default();
        *count += 1;
        *count == UNHEALTHY_AFTER_FAILURES
    }

    pub fn reset(&mut self) {
        self.consecutive_failures.clear();
    }
}

// ---------------------------------------------------------------------------
// Layer plan
// ---------------------------------------------------------------------------

pub struct LayerSpec {
    pub id: String,
    /// Slice of the query list this layer dispatches. Clamped at run time.
    pub queries: Range<usize>,
    pub adapters: Vec<Arc<dyn SearchBackend>>,
    pub min_delay: Duration,
    pub primary: bool,
}

impl LayerSpec {
    pub fn new(id: &str, queries: Range<usize>) -> Self {
        Self {
            id: id.to_string(),
            queries,
            adapters: Vec::new(),
            min_delay: Duration::ZERO,
            primary: false,
        }
    }

    pub fn adapter(mut self, adapter: Arc<dyn SearchBackend>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
}

/// Validated, ordered set of layers.
pub struct LayerPlan {
    layers: Vec<LayerSpec>,
}

impl LayerPlan {
    /// Layer ids must be non-empty and unique; query ranges must be well
    /// formed and pairwise disjoint.
    pub fn new(layers: Vec<LayerSpec>) -> Result<Self, HarvestError> {
        let mut ids = HashSet::new();
        for layer in &layers {
            if layer.id.trim().is_empty() {
                return Err(HarvestError::InvalidLayerPlan("empty layer id".to_string()));
            }
            if !ids.insert(layer.id.as_str()) {
                return Err(HarvestError::InvalidLayerPlan(format!(
                    "duplicate layer id: {}",
                    layer.id
                )));
            }
            if layer.queries.start > layer.queries.end {
                return Err(HarvestError::InvalidLayerPlan(format!(
                    "layer {} has an inverted query range {:?}",
                    layer.id, layer.queries
                )));
            }
        }

        for (i, a) in layers.iter().enumerate() {
            for b in &layers[i + 1..] {
                if overlaps(&a.queries, &b.queries) {
                    return Err(HarvestError::InvalidLayerPlan(format!(
                        "layers {} {:?} and {} {:?} share queries",
                        a.id, a.queries, b.id, b.queries
                    )));
                }
            }
        }

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn primary_ids(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter(|l| l.primary)
            .map(|l| l.id.clone())
            .collect()
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    !a.is_empty() && !b.is_empty() && a.start < b.end && b.start < a.end
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Hits from every layer in dispatch order, plus per-layer accounting.
#[derive(Debug, Clone, Default)]
pub struct SearchRun {
    pub hits: Vec<SearchHit>,
    pub layer_stats: Vec<LayerStats>,
}

impl SearchRun {
    /// Every adapter call in every layer failed or was skipped.
    pub fn total_failure(&self) -> bool {
        self.layer_stats.iter().all(|l| l.adapter_calls == l.failures)
            && self.layer_stats.iter().any(|l| l.adapter_calls + l.skipped_unhealthy > 0)
    }
}

pub struct LayeredSearchOrchestrator {
    results_per_query: usize,
}

impl LayeredSearchOrchestrator {
    pub fn new(results_per_query: usize) -> Self {
        Self { results_per_query }
    }

    /// Run with fresh adapter health. Never fails: total backend failure
    /// yields an empty hit list.
    pub async fn run(&self, queries: &[String], plan: &LayerPlan) -> SearchRun {
        let mut health = AdapterHealth::new();
        self.run_with_health(queries, plan, &mut health).await
    }

    pub async fn run_with_health(
        &self,
        queries: &[String],
        plan: &LayerPlan,
        health: &mut AdapterHealth,
    ) -> SearchRun {
        let mut run = SearchRun::default();

        for layer in plan.layers() {
            let (hits, stats) = self.run_layer(queries, layer, health).await;
            info!(
                layer = layer.id.as_str(),
                hits = stats.hits,
                calls = stats.adapter_calls,
                failures = stats.failures,
                skipped = stats.skipped_unhealthy,
                elapsed_ms = stats.elapsed_ms,
                "Search layer complete"
            );
            run.hits.extend(hits);
            run.layer_stats.push(stats);
        }

        if run.total_failure() {
            warn!(queries = queries.len(), "Every search backend failed; returning no hits");
        }
        run
    }

    async fn run_layer(
        &self,
        queries: &[String],
        layer: &LayerSpec,
        health: &mut AdapterHealth,
    ) -> (Vec<SearchHit>, LayerStats) {
        let started = Instant::now();
        let start = layer.queries.start.min(queries.len());
        let end = layer.queries.end.min(queries.len());
        let slice = &queries[start..end];

        let mut stats = LayerStats {
            layer_id: layer.id.clone(),
            primary: layer.primary,
            queries: slice.len() as u32,
            ..LayerStats::default()
        };
        let mut hits = Vec::new();
        let mut last_call: Option<Instant> = None;

        for query in slice {
            for adapter in &layer.adapters {
                let adapter_id = adapter.id();
                if !health.is_available(adapter_id) {
                    stats.skipped_unhealthy += 1;
                    continue;
                }

                if let Some(last) = last_call {
                    let since = last.elapsed();
                    if since < layer.min_delay {
                        tokio::time::sleep(layer.min_delay - since).await;
                    }
                }
                last_call = Some(Instant::now());
                stats.adapter_calls += 1;

                match adapter.search(query, self.results_per_query).await {
                    Ok(results) => {
                        health.record_success(adapter_id);
                        let now = Utc::now();
                        let before = hits.len();
                        hits.extend(
                            results
                                .into_iter()
                                .filter(|r| !r.url.trim().is_empty())
                                .map(|r| SearchHit::from_result(r, adapter_id, &layer.id, now)),
                        );
                        stats.hits += (hits.len() - before) as u32;
                    }
                    Err(e) => {
                        stats.failures += 1;
                        warn!(
                            layer = layer.id.as_str(),
                            adapter = adapter_id,
                            query = query.as_str(),
                            error = %e,
                            "Search backend failed"
                        );
                        if health.record_failure(adapter_id) {
                            warn!(adapter = adapter_id, "Search backend marked unhealthy for this run");
                        }
                    }
                }
            }
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        (hits, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{result, FailingBackend, MockBackend};

    fn queries(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("q{i}")).collect()
    }

    #[test]
    fn plan_rejects_overlapping_ranges() {
        let err = LayerPlan::new(vec![LayerSpec::new("a", 0..3), LayerSpec::new("b", 2..5)]);
        assert!(matches!(err, Err(HarvestError::InvalidLayerPlan(_))));
    }

    #[test]
    fn plan_rejects_duplicate_and_empty_ids() {
        let dup = LayerPlan::new(vec![LayerSpec::new("a", 0..1), LayerSpec::new("a", 1..2)]);
        assert!(matches!(dup, Err(HarvestError::InvalidLayerPlan(msg)) if msg.contains("duplicate")));
        let empty = LayerPlan::new(vec![LayerSpec::new(" ", 0..1)]);
        assert!(empty.is_err());
    }

    #[test]
    fn plan_allows_adjacent_and_empty_ranges() {
        let plan = LayerPlan::new(vec![
            LayerSpec::new("a", 0..3).primary(),
            LayerSpec::new("b", 3..6),
            LayerSpec::new("c", 2..2),
        ])
        .unwrap();
        assert_eq!(plan.primary_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn health_marks_unhealthy_after_three_consecutive_failures() {
        let mut health = AdapterHealth::new();
        assert!(!health.record_failure("x"));
        assert!(!health.record_failure("x"));
        health.record_success("x");
        assert_eq!(health.consecutive_failures("x"), 0);
        health.record_failure("x");
        health.record_failure("x");
        assert!(health.record_failure("x"));
        assert!(!health.is_available("x"));
        health.reset();
        assert!(health.is_available("x"));
    }

    #[tokio::test]
    async fn failing_backend_does_not_stop_siblings_or_later_layers() {
        let good = MockBackend::new("good").returning(vec![result("https://a.com", "A", "s")]);
        let plan = LayerPlan::new(vec![
            LayerSpec::new("one", 0..1)
                .adapter(Arc::new(FailingBackend::new("bad")))
                .adapter(Arc::new(good)),
            LayerSpec::new("two", 1..2)
                .adapter(Arc::new(MockBackend::new("other").returning(vec![result("https://b.com", "B", "s")]))),
        ])
        .unwrap();

        let run = LayeredSearchOrchestrator::new(10).run(&queries(2), &plan).await;
        let urls: Vec<_> = run.hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com"]);
        assert_eq!(run.layer_stats[0].failures, 1);
        assert_eq!(run.hits[0].layer_id, "one");
        assert_eq!(run.hits[0].source_id, "good");
        assert!(!run.total_failure());
    }

    #[tokio::test]
    async fn total_failure_yields_empty_hits() {
        let plan = LayerPlan::new(vec![
            LayerSpec::new("one", 0..2).adapter(Arc::new(FailingBackend::new("a"))),
            LayerSpec::new("two", 2..4).adapter(Arc::new(FailingBackend::new("b"))),
        ])
        .unwrap();
        let run = LayeredSearchOrchestrator::new(10).run(&queries(4), &plan).await;
        assert!(run.hits.is_empty());
        assert!(run.total_failure());
    }

    #[tokio::test]
    async fn unhealthy_backend_is_skipped_for_remaining_queries() {
        let failing = FailingBackend::new("flaky");
        let calls = failing.counter();
        let plan = LayerPlan::new(vec![LayerSpec::new("one", 0..6).adapter(Arc::new(failing))]).unwrap();

        let mut health = AdapterHealth::new();
        let run = LayeredSearchOrchestrator::new(10)
            .run_with_health(&queries(6), &plan, &mut health)
            .await;

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(run.layer_stats[0].skipped_unhealthy, 3);
        assert!(!health.is_available("flaky"));

        // Carried health keeps it skipped on the next run.
        LayeredSearchOrchestrator::new(10)
            .run_with_health(&queries(6), &plan, &mut health)
            .await;
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ranges_are_clamped_and_empty_urls_dropped() {
        let backend = MockBackend::new("m").returning(vec![
            result("https://a.com", "A", ""),
            result("  ", "blank", ""),
        ]);
        let seen = Arc::new(backend);
        let plan = LayerPlan::new(vec![LayerSpec::new("one", 1..50).adapter(seen.clone())]).unwrap();
        let run = LayeredSearchOrchestrator::new(10).run(&queries(3), &plan).await;
        assert_eq!(seen.queries_seen(), vec!["q1".to_string(), "q2".to_string()]);
        assert_eq!(run.hits.len(), 2);
        assert_eq!(run.layer_stats[0].queries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn min_delay_paces_consecutive_calls() {
        let plan = LayerPlan::new(vec![LayerSpec::new("slow", 0..3)
            .adapter(Arc::new(MockBackend::new("m")))
            .min_delay(Duration::from_secs(2))])
        .unwrap();
        let started = tokio::time::Instant::now();
        LayeredSearchOrchestrator::new(10).run(&queries(3), &plan).await;
        assert!(started.elapsed() >= Duration::from_secs(4));
    }
}
