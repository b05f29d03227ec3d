pub mod config;
pub mod error;
pub mod types;

pub use config::{PageBackend, QualityThresholds, ResearchConfig};
pub use error::HarvestError;
pub use types::*;
