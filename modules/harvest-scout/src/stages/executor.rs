//! Dependency-ordered stage execution with per-stage timeouts, fallbacks
//! and skip propagation.
//!
//! Each stage runs in its own task bounded by `tokio::time::timeout`, so a
//! hung stage becomes a timeout (and is aborted) instead of blocking the run.
//! Records are written only by the executor, after each stage settles.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::error::{PipelineError, StageError};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// What a stage function sees: the shared run input plus the outputs of its
/// successful dependencies.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub input: Arc<Value>,
    pub upstream: HashMap<String, Value>,
}

impl StageInput {
    pub fn upstream(&self, stage: &str) -> Option<&Value> {
        self.upstream.get(stage)
    }
}

/// Used identically for run and fallback functions.
pub type StageFn = Arc<dyn Fn(StageInput) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

pub fn stage_fn<F, Fut>(f: F) -> StageFn
where
    F: Fn(StageInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |input| Box::pin(f(input)))
}

pub struct StageSpec {
    name: String,
    dependencies: Vec<String>,
    run: StageFn,
    fallback: Option<StageFn>,
    required: bool,
    primary: bool,
    timeout: Duration,
}

impl StageSpec {
    pub fn new<F, Fut>(name: &str, run: F) -> Self
    where
        F: Fn(StageInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            dependencies: Vec::new(),
            run: stage_fn(run),
            fallback: None,
            required: false,
            primary: false,
            timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    pub fn depends_on(mut self, stage: &str) -> Self {
        self.dependencies.push(stage.to_string());
        self
    }

    pub fn fallback<F, Fut>(mut self, fallback: F) -> Self
    where
        F: Fn(StageInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.fallback = Some(stage_fn(fallback));
        self
    }

    /// Failure of a required stage skips everything downstream of it.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// A primary stage is required, and its unrecovered failure aborts the run.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.required = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub dependencies: Vec<String>,
    pub required: bool,
    pub timeout_ms: u64,
    pub status: StageStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Success came from the fallback, not the run function.
    pub fallback_used: bool,
    /// For skipped stages: the failed required stage at the root of the chain.
    pub blocked_by: Option<String>,
    pub elapsed_ms: u64,
}

impl StageRecord {
    fn pending(spec: &StageSpec) -> Self {
        Self {
            name: spec.name.clone(),
            dependencies: spec.dependencies.clone(),
            required: spec.required,
            timeout_ms: spec.timeout.as_millis() as u64,
            status: StageStatus::Pending,
            result: None,
            error: None,
            fallback_used: false,
            blocked_by: None,
            elapsed_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Topological order the stages were considered in.
    pub order: Vec<String>,
    pub records: BTreeMap<String, StageRecord>,
}

impl ExecutionReport {
    pub fn get(&self, stage: &str) -> Option<&StageRecord> {
        self.records.get(stage)
    }

    pub fn status(&self, stage: &str) -> Option<StageStatus> {
        self.records.get(stage).map(|r| r.status)
    }

    pub fn result(&self, stage: &str) -> Option<&Value> {
        self.records.get(stage).and_then(|r| r.result.as_ref())
    }

    /// Usable but not clean: something failed, was skipped, or only
    /// succeeded through its fallback.
    pub fn degraded(&self) -> bool {
        self.records.values().any(|r| {
            matches!(r.status, StageStatus::Failed | StageStatus::Skipped) || r.fallback_used
        })
    }
}

impl std::fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Stage Report ===")?;
        for name in &self.order {
            let Some(record) = self.records.get(name) else {
                continue;
            };
            write!(f, "  {:<14} {:<8} {:>6} ms", record.name, record.status, record.elapsed_ms)?;
            if record.fallback_used {
                write!(f, "  (fallback)")?;
            }
            if let Some(blocker) = &record.blocked_by {
                write!(f, "  blocked by {blocker}")?;
            }
            if let Some(err) = &record.error {
                write!(f, "  {err}")?;
            }
            writeln!(f)?;
        }
        if self.degraded() {
            writeln!(f, "Run degraded")?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct StageExecutor {
    stages: Vec<StageSpec>,
}

impl StageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects duplicate names, and any registration that would close a
    /// cycle (the stage is not kept). Dependencies may be registered later.
    pub fn register(&mut self, spec: StageSpec) -> Result<(), StageError> {
        if self.stages.iter().any(|s| s.name == spec.name) {
            return Err(StageError::DuplicateStage(spec.name));
        }
        self.stages.push(spec);
        if let Err(e) = self.topological_order() {
            self.stages.pop();
            return Err(e);
        }
        Ok(())
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub async fn execute(&self, input: Value) -> Result<ExecutionReport, PipelineError> {
        self.check_dependencies()?;
        let order = self.topological_order()?;
        let input = Arc::new(input);

        let mut report = ExecutionReport {
            order: order.clone(),
            records: self
                .stages
                .iter()
                .map(|spec| (spec.name.clone(), StageRecord::pending(spec)))
                .collect(),
        };

        for (position, name) in order.iter().enumerate() {
            let Some(spec) = self.stages.iter().find(|s| &s.name == name) else {
                continue;
            };

            if let Some(blocker) = self.blocker(spec, &report) {
                info!(stage = name.as_str(), blocked_by = blocker.as_str(), "Stage skipped");
                if let Some(record) = report.records.get_mut(name) {
                    record.status = StageStatus::Skipped;
                    record.error = Some(format!("blocked by failed stage {blocker}"));
                    record.blocked_by = Some(blocker);
                }
                continue;
            }

            let stage_input = StageInput {
                input: input.clone(),
                upstream: spec
                    .dependencies
                    .iter()
                    .filter_map(|dep| report.result(dep).map(|v| (dep.clone(), v.clone())))
                    .collect(),
            };

            if let Some(record) = report.records.get_mut(name) {
                record.status = StageStatus::Running;
            }
            let started = Instant::now();
            let outcome = self.run_stage(spec, stage_input).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let Some(record) = report.records.get_mut(name) else {
                continue;
            };
            record.elapsed_ms = elapsed_ms;
            match outcome {
                Ok((value, fallback_used)) => {
                    info!(stage = name.as_str(), elapsed_ms, fallback_used, "Stage succeeded");
                    record.status = StageStatus::Success;
                    record.result = Some(value);
                    record.fallback_used = fallback_used;
                }
                Err(reason) => {
                    warn!(stage = name.as_str(), elapsed_ms, error = reason.as_str(), "Stage failed");
                    record.status = StageStatus::Failed;
                    record.error = Some(reason.clone());

                    if spec.primary {
                        error!(stage = name.as_str(), "Primary stage failed without a working fallback, aborting run");
                        for rest in &order[position + 1..] {
                            if let Some(r) = report.records.get_mut(rest) {
                                r.status = StageStatus::Skipped;
                                r.error = Some("run aborted".to_string());
                                r.blocked_by = Some(name.clone());
                            }
                        }
                        return Err(PipelineError::StageFatal {
                            stage: name.clone(),
                            reason,
                            report: Box::new(report),
                        });
                    }
                }
            }
        }

        info!(stages = order.len(), degraded = report.degraded(), "Stage execution complete");
        Ok(report)
    }

    /// Root-cause stage that prevents `spec` from running, if any.
    fn blocker(&self, spec: &StageSpec, report: &ExecutionReport) -> Option<String> {
        for dep in &spec.dependencies {
            let Some(record) = report.get(dep) else {
                continue;
            };
            match record.status {
                StageStatus::Skipped => {
                    return Some(record.blocked_by.clone().unwrap_or_else(|| dep.clone()));
                }
                StageStatus::Failed if self.is_required(dep) => return Some(dep.clone()),
                _ => {}
            }
        }
        None
    }

    fn is_required(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s.name == stage && s.required)
    }

    /// Run, then the fallback with the same input and timeout. Ok carries
    /// whether the fallback produced the value.
    async fn run_stage(&self, spec: &StageSpec, input: StageInput) -> Result<(Value, bool), String> {
        let primary_err = match attempt(&spec.run, input.clone(), spec.timeout).await {
            Ok(value) => return Ok((value, false)),
            Err(e) => e,
        };
        let Some(fallback) = &spec.fallback else {
            return Err(primary_err);
        };

        warn!(stage = spec.name.as_str(), error = primary_err.as_str(), "Stage failed, invoking fallback");
        match attempt(fallback, input, spec.timeout).await {
            Ok(value) => Ok((value, true)),
            Err(fallback_err) => Err(format!("{primary_err}; fallback: {fallback_err}")),
        }
    }

    fn check_dependencies(&self) -> Result<(), StageError> {
        for spec in &self.stages {
            for dep in &spec.dependencies {
                if !self.stages.iter().any(|s| &s.name == dep) {
                    return Err(StageError::UnknownDependency {
                        stage: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Kahn's algorithm; among ready stages, the earliest registered goes
    /// first. Dependencies on unregistered stages are ignored here.
    fn topological_order(&self) -> Result<Vec<String>, StageError> {
        let known = |name: &String| self.stages.iter().any(|s| &s.name == name);
        let mut in_degree: Vec<usize> = self
            .stages
            .iter()
            .map(|s| s.dependencies.iter().filter(|d| known(*d)).count())
            .collect();
        let mut placed = vec![false; self.stages.len()];
        let mut order = Vec::with_capacity(self.stages.len());

        while let Some(next) = (0..self.stages.len()).find(|&i| !placed[i] && in_degree[i] == 0) {
            placed[next] = true;
            let name = &self.stages[next].name;
            order.push(name.clone());
            for (i, stage) in self.stages.iter().enumerate() {
                if !placed[i] {
                    in_degree[i] -= stage.dependencies.iter().filter(|d| *d == name).count();
                }
            }
        }

        if order.len() != self.stages.len() {
            let stuck = self
                .stages
                .iter()
                .zip(&placed)
                .filter(|(_, placed)| !**placed)
                .map(|(s, _)| s.name.clone())
                .collect();
            return Err(StageError::Cycle(stuck));
        }
        Ok(order)
    }
}

/// One bounded attempt in its own task. A timed-out task is aborted.
async fn attempt(f: &StageFn, input: StageInput, timeout: Duration) -> Result<Value, String> {
    let f = f.clone();
    let mut handle = tokio::spawn(async move { f(input).await });
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(e))) => Err(format!("{e:#}")),
        Ok(Err(join)) => Err(format!("stage panicked: {join}")),
        Err(_) => {
            handle.abort();
            Err(format!("timed out after {}s", timeout.as_secs_f64()))
        }
    }
}
