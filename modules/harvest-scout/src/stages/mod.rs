pub mod error;
pub mod executor;
pub mod research;

pub use error::{PipelineError, StageError};
pub use executor::{
    stage_fn, ExecutionReport, StageExecutor, StageFn, StageInput, StageRecord, StageSpec,
    StageStatus, DEFAULT_STAGE_TIMEOUT,
};
pub use research::{digest, research_stages, ResearchRequest, DIGEST_STAGE, RESEARCH_STAGE};
