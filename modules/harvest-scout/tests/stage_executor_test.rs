//! Stage executor behaviour on realistic stage graphs.
//!
//! Run with: cargo test -p harvest-scout --test stage_executor_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use harvest_common::ExtractionResult;
use harvest_scout::pipeline::fan_out;
use harvest_scout::stages::{PipelineError, StageExecutor, StageInput, StageSpec, StageStatus};

fn counted(name: &str, calls: &Arc<AtomicUsize>) -> StageSpec {
    let calls = calls.clone();
    let label = name.to_string();
    StageSpec::new(name, move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        let label = label.clone();
        async move { Ok(json!({ "from": label })) }
    })
}

#[tokio::test]
async fn diamond_graph_runs_every_stage_once_in_dependency_order() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut executor = StageExecutor::new();
    executor.register(counted("research", &calls)).unwrap();
    executor.register(counted("pricing", &calls).depends_on("research")).unwrap();
    executor.register(counted("competitors", &calls).depends_on("research")).unwrap();
    executor
        .register(
            StageSpec::new("report", |input: StageInput| async move {
                Ok(json!(input.upstream.len()))
            })
            .depends_on("pricing")
            .depends_on("competitors"),
        )
        .unwrap();

    let report = executor.execute(Value::Null).await.unwrap();

    assert_eq!(report.order, vec!["research", "pricing", "competitors", "report"]);
    let record = report.get("report").unwrap();
    assert_eq!(record.dependencies, vec!["pricing", "competitors"]);
    assert!(!record.required);
    assert_eq!(record.timeout_ms, 60_000);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(report.records.values().all(|r| r.status == StageStatus::Success));
    assert_eq!(report.result("report"), Some(&json!(2)));
    assert!(!report.degraded());
}

#[tokio::test]
async fn required_failure_skips_all_descendants_without_running_them() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut executor = StageExecutor::new();
    executor
        .register(StageSpec::new("research", |_| async { anyhow::bail!("search quota exhausted") }).required())
        .unwrap();
    executor.register(counted("pricing", &calls).depends_on("research")).unwrap();
    executor.register(counted("report", &calls).depends_on("pricing")).unwrap();
    executor.register(counted("housekeeping", &calls)).unwrap();

    let report = executor.execute(Value::Null).await.unwrap();

    assert_eq!(report.status("research"), Some(StageStatus::Failed));
    assert_eq!(report.status("pricing"), Some(StageStatus::Skipped));
    assert_eq!(report.status("report"), Some(StageStatus::Skipped));
    assert_eq!(report.get("report").unwrap().blocked_by.as_deref(), Some("research"));
    // Only the independent branch ran.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.status("housekeeping"), Some(StageStatus::Success));
    assert!(report.records.values().all(|r| r.status.is_terminal()));
}

#[tokio::test(start_paused = true)]
async fn research_timeout_with_fallback_reports_success_and_degraded_result() {
    let mut executor = StageExecutor::new();
    executor
        .register(
            StageSpec::new("research", |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({ "status": "complete" }))
            })
            .required()
            .timeout(Duration::from_secs(5))
            .fallback(|_| async { Ok(json!({ "status": "degraded" })) }),
        )
        .unwrap();

    let report = executor.execute(Value::Null).await.unwrap();
    let record = report.get("research").unwrap();

    assert_eq!(record.status, StageStatus::Success);
    assert_eq!(record.result.as_ref().unwrap()["status"], "degraded");
    assert!(record.fallback_used);
    assert!(record.required);
    assert_eq!(record.timeout_ms, 5_000);
}

#[tokio::test(start_paused = true)]
async fn timed_out_stage_leaves_no_extraction_work_running() {
    let completed = Arc::new(AtomicUsize::new(0));
    let c = completed.clone();
    let mut executor = StageExecutor::new();
    executor
        .register(
            StageSpec::new("research", move |_| {
                let c = c.clone();
                async move {
                    let results = fan_out(vec!["https://slow.example.com/".into()], 1, move |url| {
                        let c = c.clone();
                        async move {
                            tokio::time::sleep(Duration::from_secs(10)).await;
                            c.fetch_add(1, Ordering::SeqCst);
                            ExtractionResult::failed(&url, "too late")
                        }
                    })
                    .await;
                    Ok(json!(results.len()))
                }
            })
            .timeout(Duration::from_secs(1))
            .fallback(|_| async { Ok(json!(0)) }),
        )
        .unwrap();

    let report = executor.execute(Value::Null).await.unwrap();
    assert!(report.get("research").unwrap().fallback_used);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn fallback_is_bounded_by_the_same_timeout() {
    let mut executor = StageExecutor::new();
    executor
        .register(
            StageSpec::new("research", |_| async {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            })
            .timeout(Duration::from_secs(5))
            .fallback(|_| async {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }),
        )
        .unwrap();

    let report = executor.execute(Value::Null).await.unwrap();
    let record = report.get("research").unwrap();
    assert_eq!(record.status, StageStatus::Failed);
    assert!(record.error.as_deref().unwrap().contains("fallback"));
}

#[tokio::test]
async fn primary_stage_failure_aborts_with_partial_report() {
    let mut executor = StageExecutor::new();
    executor
        .register(StageSpec::new("research", |_| async { anyhow::bail!("no backends") }).primary())
        .unwrap();
    executor.register(StageSpec::new("digest", |_| async { Ok(Value::Null) }).depends_on("research")).unwrap();

    let err = executor.execute(Value::Null).await.unwrap_err();
    let PipelineError::StageFatal { stage, report, .. } = err else {
        panic!("expected StageFatal");
    };
    assert_eq!(stage, "research");
    assert_eq!(report.status("research"), Some(StageStatus::Failed));
    assert_eq!(report.status("digest"), Some(StageStatus::Skipped));
}
