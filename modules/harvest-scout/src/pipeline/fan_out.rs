// Bounded fan-out of the extraction chain over prioritised candidates.
//
// Each dispatch runs in its own task and returns its own result; the
// coordinator is the only collector. A crashed dispatch becomes a failed
// ExtractionResult for that URL and never cancels its siblings. Dropping the
// fan-out future (a stage timeout) aborts every dispatch still in flight.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use harvest_common::{CandidateUrl, ExtractionResult};

use crate::pipeline::extraction::ExtractionChain;

pub struct FanOutCoordinator {
    chain: Arc<ExtractionChain>,
    max_candidates: usize,
}

impl FanOutCoordinator {
    pub fn new(chain: Arc<ExtractionChain>, max_candidates: usize) -> Self {
        Self {
            chain,
            max_candidates,
        }
    }

    /// One result per dispatched candidate, in completion order. Dispatches
    /// the `max_candidates` highest-priority candidates.
    pub async fn extract_all(
        &self,
        candidates: &[CandidateUrl],
        concurrency: usize,
    ) -> Vec<ExtractionResult> {
        let mut ordered: Vec<&CandidateUrl> = candidates.iter().collect();
        ordered.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        let urls: Vec<String> = ordered
            .into_iter()
            .take(self.max_candidates)
            .map(|c| c.url().to_string())
            .collect();

        info!(
            candidates = candidates.len(),
            dispatched = urls.len(),
            concurrency,
            "Starting extraction fan-out"
        );

        let chain = self.chain.clone();
        let results = fan_out(urls, concurrency, move |url| {
            let chain = chain.clone();
            async move { chain.extract(&url).await }
        })
        .await;

        let accepted = results.iter().filter(|r| r.success()).count();
        info!(dispatched = results.len(), accepted, "Extraction fan-out complete");
        results
    }
}

/// Run `dispatch` for every URL with at most `concurrency` in flight. Blocks
/// until every dispatch finished; always returns exactly one result per URL.
pub async fn fan_out<F, Fut>(urls: Vec<String>, concurrency: usize, dispatch: F) -> Vec<ExtractionResult>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ExtractionResult> + Send + 'static,
{
    let dispatch = Arc::new(dispatch);
    stream::iter(urls.into_iter().map(|url| {
        let dispatch = dispatch.clone();
        async move {
            let task = AbortOnDrop(tokio::spawn(dispatch(url.clone())));
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "Extraction dispatch crashed");
                    ExtractionResult::failed(&url, format!("dispatch crashed: {e}"))
                }
            }
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}

/// Join handle that aborts its task when dropped before completion.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use harvest_common::{FilterVerdict, QualityVerdict, SearchHit};

    use super::*;
    use crate::pipeline::quality::QualityValidator;
    use crate::testing::{rich_content, ScriptedStrategy, Step};

    fn ok(url: &str) -> ExtractionResult {
        ExtractionResult::extracted(
            url,
            "content".into(),
            "mock",
            QualityVerdict {
                valid: true,
                score: 80.0,
                reason: "ok".into(),
            },
        )
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://site{i}.com/")).collect()
    }

    fn candidate(url: &str, priority: f64) -> CandidateUrl {
        CandidateUrl {
            hit: SearchHit {
                title: "t".into(),
                url: url.into(),
                snippet: String::new(),
                source_id: "mock".into(),
                layer_id: "primary".into(),
                discovered_at: Utc::now(),
            },
            priority,
            verdict: FilterVerdict::Accepted,
        }
    }

    #[tokio::test]
    async fn every_url_gets_exactly_one_result_even_when_dispatches_panic() {
        let results = fan_out(urls(12), 3, |url| async move {
            if url.contains("site3") || url.contains("site7") {
                panic!("dispatch blew up");
            }
            ok(&url)
        })
        .await;

        assert_eq!(results.len(), 12);
        let failed: Vec<_> = results.iter().filter(|r| !r.success()).collect();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|r| r.error().unwrap().contains("dispatch crashed")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_dispatches_never_exceed_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (f, p) = (in_flight.clone(), peak.clone());

        let results = fan_out(urls(20), 4, move |url| {
            let (f, p) = (f.clone(), p.clone());
            async move {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                f.fetch_sub(1, Ordering::SeqCst);
                ok(&url)
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn results_arrive_in_completion_order() {
        let results = fan_out(urls(3), 3, |url| async move {
            // site0 is slowest, site2 fastest.
            let delay = if url.contains("site0") { 30 } else if url.contains("site1") { 20 } else { 10 };
            tokio::time::sleep(Duration::from_secs(delay)).await;
            ok(&url)
        })
        .await;
        let order: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(order, vec!["https://site2.com/", "https://site1.com/", "https://site0.com/"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_fan_out_aborts_in_flight_dispatches() {
        let completed = Arc::new(AtomicUsize::new(0));
        let c = completed.clone();
        let run = tokio::spawn(fan_out(urls(2), 2, move |url| {
            let c = c.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                c.fetch_add(1, Ordering::SeqCst);
                ok(&url)
            }
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        run.abort();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let results = fan_out(urls(3), 0, |url| async move { ok(&url) }).await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn coordinator_caps_to_highest_priority_candidates() {
        let strategy = ScriptedStrategy::returns("static", rich_content("coffee"))
            .on_url("https://low.com/", Step::Fail("unreachable".into()));
        let calls = strategy.counter();
        let chain = Arc::new(ExtractionChain::new(QualityValidator::default()).strategy(Arc::new(strategy)));

        let candidates = vec![
            candidate("https://low.com/", 0.1),
            candidate("https://high.com/", 0.9),
            candidate("https://mid.com/", 0.5),
        ];
        let results = FanOutCoordinator::new(chain, 2).extract_all(&candidates, 2).await;

        assert_eq!(results.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(results.iter().all(|r| r.url != "https://low.com/"));
        assert!(results.iter().all(|r| r.success()));
    }
}
