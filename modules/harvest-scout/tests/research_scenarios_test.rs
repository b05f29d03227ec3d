//! End-to-end research scenarios against mock backends and strategies.
//!
//! No network: every backend and strategy comes from `harvest_scout::testing`.
//!
//! Run with: cargo test -p harvest-scout --test research_scenarios_test

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use harvest_common::{QualityThresholds, ResearchBundle, ResearchContext, SearchHit};
use harvest_scout::pipeline::{
    fan_out, ExtractionChain, FanOutCoordinator, LayerPlan, LayerSpec, LayeredSearchOrchestrator,
    QualityValidator, QueryExpander, ResearchPipeline, UrlFilter, UrlPolicy,
};
use harvest_scout::stages::{research_stages, ResearchRequest, StageStatus, DIGEST_STAGE, RESEARCH_STAGE};
use harvest_scout::testing::{
    result, rich_content, thin_content, FailingBackend, MockBackend, ScriptedStrategy, Step,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn hit(url: &str, layer: &str) -> SearchHit {
    SearchHit {
        title: "Market report".into(),
        url: url.into(),
        snippet: "Figures and analysis".into(),
        source_id: "mock".into(),
        layer_id: layer.into(),
        discovered_at: Utc::now(),
    }
}

fn chain_of(strategies: Vec<ScriptedStrategy>) -> ExtractionChain {
    strategies
        .into_iter()
        .fold(ExtractionChain::new(QualityValidator::default()), |chain, s| {
            chain.strategy(Arc::new(s))
        })
}

// ---------------------------------------------------------------------------
// Search -> filter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_layers_with_two_zero_one_hits_yield_three_sorted_candidates() {
    let context = ResearchContext::for_segment("X");
    let queries = QueryExpander::with_year(2025).expand("market X Brazil", &context, 3);
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0], "market X Brazil");

    let primary = MockBackend::new("serper").returning(vec![
        result("https://ibge.gov.br/market-x", "Official data", "Short"),
        result("https://insights.example.com/x", "Analysis", &"detailed snippet ".repeat(20)),
    ]);
    let secondary = MockBackend::new("searxng");
    let news = MockBackend::new("news_rss").returning(vec![result(
        "https://news.example.org/x-growth",
        "X grows",
        "Sector news",
    )]);

    let plan = LayerPlan::new(vec![
        LayerSpec::new("primary", 0..1).adapter(Arc::new(primary)).primary(),
        LayerSpec::new("secondary", 1..2).adapter(Arc::new(secondary)),
        LayerSpec::new("news", 2..3).adapter(Arc::new(news)),
    ])
    .unwrap();

    let run = LayeredSearchOrchestrator::new(10).run(&queries, &plan).await;
    assert_eq!(run.hits.len(), 3);
    let per_layer: Vec<u32> = run.layer_stats.iter().map(|s| s.hits).collect();
    assert_eq!(per_layer, vec![2, 0, 1]);
    assert!(run.hits.iter().all(|h| !h.source_id.is_empty() && !h.layer_id.is_empty()));

    let filtered = UrlFilter::new(UrlPolicy::default())
        .with_primary_layers(plan.primary_ids())
        .filter(run.hits);
    assert_eq!(filtered.candidates.len(), 3);
    assert_eq!(filtered.rejected, 0);
    assert_eq!(filtered.duplicates, 0);
    assert!(filtered
        .candidates
        .windows(2)
        .all(|pair| pair[0].priority >= pair[1].priority));
    // The trusted government source ranks first.
    assert_eq!(filtered.candidates[0].url(), "https://ibge.gov.br/market-x");
}

#[tokio::test]
async fn failing_backend_is_contained_and_other_layers_still_report() {
    let failing = FailingBackend::new("serper");
    let calls = failing.counter();
    let plan = LayerPlan::new(vec![
        LayerSpec::new("primary", 0..5).adapter(Arc::new(failing)).primary(),
        LayerSpec::new("news", 5..6).adapter(Arc::new(
            MockBackend::new("news_rss").returning(vec![result("https://a.com/", "A", "")]),
        )),
    ])
    .unwrap();
    let queries: Vec<String> = (0..6).map(|i| format!("query {i}")).collect();

    let run = LayeredSearchOrchestrator::new(10).run(&queries, &plan).await;

    // Three consecutive failures mark the backend unhealthy; the rest are skipped.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.layer_stats[0].skipped_unhealthy, 2);
    assert_eq!(run.hits.len(), 1);
    assert!(!run.total_failure());
}

#[test]
fn filter_output_never_contains_duplicate_urls() {
    let urls = [
        "https://a.com/1",
        "https://b.com/2",
        "https://a.com/1",
        "https://c.com/3",
        "https://b.com/2",
        "https://a.com/1",
    ];
    let hits = urls.iter().map(|u| hit(u, "primary")).collect();
    let filtered = UrlFilter::new(UrlPolicy::default()).filter(hits);

    let unique: HashSet<&str> = filtered.candidates.iter().map(|c| c.url()).collect();
    assert_eq!(unique.len(), filtered.candidates.len());
    assert_eq!(filtered.candidates.len(), 3);
    assert_eq!(filtered.duplicates, 3);
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_of_four_strategies_wins_and_later_ones_never_run() {
    let third = ScriptedStrategy::returns("aggressive", rich_content("tea"));
    let fourth = ScriptedStrategy::returns("mirrors", rich_content("tea"));
    let (third_calls, fourth_calls) = (third.counter(), fourth.counter());

    let result = chain_of(vec![
        ScriptedStrategy::fails("static", "403 Forbidden"),
        ScriptedStrategy::returns("rendered", rich_content("coffee")),
        third,
        fourth,
    ])
    .extract("https://example.com/report")
    .await;

    assert_eq!(result.method_used(), Some("rendered"));
    assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fourth_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn four_hundred_chars_is_invalid_regardless_of_word_count() {
    let validator = QualityValidator::new(QualityThresholds {
        min_chars: 500,
        min_words: 100,
        ..QualityThresholds::default()
    });
    let content = "abc ".repeat(100);
    assert_eq!(content.len(), 400);

    let verdict = validator.validate(&content, "https://a.com", &ResearchContext::default());
    assert!(!verdict.valid);
    assert!(verdict.reason.starts_with("too short"));
    // Same content, same verdict.
    assert_eq!(
        verdict,
        validator.validate(&content, "https://b.com", &ResearchContext::for_segment("X"))
    );
}

#[tokio::test]
async fn extract_all_returns_one_result_per_candidate_despite_panics() {
    let urls: Vec<String> = (0..10).map(|i| format!("https://site{i}.com/")).collect();

    // Panics inside a strategy are contained by the chain.
    let strategy = ScriptedStrategy::returns("static", rich_content("coffee"))
        .on_url("https://site2.com/", Step::Panic)
        .on_url("https://site5.com/", Step::Panic);
    let coordinator = FanOutCoordinator::new(Arc::new(chain_of(vec![strategy])), 25);
    let candidates = UrlFilter::new(UrlPolicy::default())
        .filter(urls.iter().map(|u| hit(u, "primary")).collect())
        .candidates;
    let results = coordinator.extract_all(&candidates, 3).await;
    assert_eq!(results.len(), 10);
    assert_eq!(results.iter().filter(|r| r.success()).count(), 8);

    // Panics in the dispatch itself become failed results.
    let results = fan_out(urls, 4, |url| async move {
        if url.contains("site7") {
            panic!("dispatch crashed");
        }
        harvest_common::ExtractionResult::failed(&url, "nothing to do")
    })
    .await;
    assert_eq!(results.len(), 10);
}

// ---------------------------------------------------------------------------
// Full pipeline through the stage executor
// ---------------------------------------------------------------------------

fn single_layer(backend: MockBackend) -> LayerPlan {
    LayerPlan::new(vec![LayerSpec::new("primary", 0..20)
        .adapter(Arc::new(backend))
        .primary()])
    .unwrap()
}

#[tokio::test]
async fn research_stage_feeds_digest() {
    let backend = MockBackend::new("mock").returning(vec![
        result("https://a.com/report", "A", "market data"),
        result("https://b.com/report", "B", "market data"),
        result("https://c.com/thin", "C", "nothing"),
    ]);
    let strategy = ScriptedStrategy::returns("static", rich_content("coffee"))
        .on_url("https://c.com/thin", Step::Content(thin_content()));
    let pipeline = ResearchPipeline::new(single_layer(backend))
        .with_expander(QueryExpander::with_year(2025))
        .strategy(Arc::new(strategy))
        .max_queries(4);

    let executor = research_stages(Arc::new(pipeline), Duration::from_secs(30)).unwrap();
    let request = ResearchRequest {
        seed: "coffee shops".into(),
        context: ResearchContext::for_segment("coffee"),
    };
    let report = executor
        .execute(serde_json::to_value(request).unwrap())
        .await
        .unwrap();

    assert_eq!(report.status(RESEARCH_STAGE), Some(StageStatus::Success));
    assert_eq!(report.status(DIGEST_STAGE), Some(StageStatus::Success));
    assert!(!report.get(RESEARCH_STAGE).unwrap().fallback_used);

    let bundle: ResearchBundle =
        serde_json::from_value(report.result(RESEARCH_STAGE).unwrap().clone()).unwrap();
    assert_eq!(bundle.accepted.len(), 2);
    assert_eq!(bundle.quality.attempted, 3);
    assert!(bundle.accepted.iter().all(|r| r.url != "https://c.com/thin"));

    let digest = report.result(DIGEST_STAGE).unwrap();
    assert_eq!(digest["status"], "complete");
    assert_eq!(digest["sources"], 2);
}

#[tokio::test(start_paused = true)]
async fn hung_research_falls_back_to_degraded_bundle() {
    let backend = MockBackend::new("mock").returning(vec![result("https://a.com/", "A", "")]);
    let strategy = ScriptedStrategy::new("static", Step::Hang).with_budget(Duration::from_secs(600));
    let pipeline = ResearchPipeline::new(single_layer(backend)).strategy(Arc::new(strategy));

    let executor = research_stages(Arc::new(pipeline), Duration::from_secs(5)).unwrap();
    let request = ResearchRequest {
        seed: "coffee".into(),
        ..ResearchRequest::default()
    };
    let report = executor
        .execute(serde_json::to_value(request).unwrap())
        .await
        .unwrap();

    let research = report.get(RESEARCH_STAGE).unwrap();
    assert_eq!(research.status, StageStatus::Success);
    assert!(research.fallback_used);
    assert!(report.degraded());

    let digest = report.result(DIGEST_STAGE).unwrap();
    assert_eq!(digest["status"], "degraded");
    assert_eq!(digest["sources"], 0);
}
