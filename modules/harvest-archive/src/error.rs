/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<browserless_client::BrowserlessError> for ArchiveError {
    fn from(err: browserless_client::BrowserlessError) -> Self {
        ArchiveError::Render(err.to_string())
    }
}

impl ArchiveError {
    /// Rate limits, server errors and network failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArchiveError::Http { status, .. } => *status == 403 || *status == 429 || *status >= 500,
            ArchiveError::Network(_) => true,
            _ => false,
        }
    }
}
