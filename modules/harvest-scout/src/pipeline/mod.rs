pub mod extraction;
pub mod fan_out;
pub mod quality;
pub mod query_expander;
pub mod research;
pub mod search;
pub mod stats;
pub mod url_filter;

pub use extraction::ExtractionChain;
pub use fan_out::{fan_out, FanOutCoordinator};
pub use quality::QualityValidator;
pub use query_expander::QueryExpander;
pub use research::ResearchPipeline;
pub use search::{AdapterHealth, LayerPlan, LayerSpec, LayeredSearchOrchestrator, SearchRun};
pub use stats::BundleRequirements;
pub use url_filter::{FilteredCandidates, UrlFilter, UrlPolicy};
