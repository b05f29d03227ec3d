use thiserror::Error;

use super::executor::ExecutionReport;

/// Problems with the stage graph itself. Detected before anything runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("stage already registered: {0}")]
    DuplicateStage(String),

    #[error("dependency cycle through stages: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("stage {stage} depends on unregistered stage {dependency}")]
    UnknownDependency { stage: String, dependency: String },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Graph(#[from] StageError),

    /// A primary required stage failed and its fallback did not save it.
    /// The report covers every stage up to the abort.
    #[error("required stage {stage} failed: {reason}")]
    StageFatal {
        stage: String,
        reason: String,
        report: Box<ExecutionReport>,
    },
}
