use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid layer plan: {0}")]
    InvalidLayerPlan(String),
}
