use thiserror::Error;

/// Failures of an external valuation provider
#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("Provider timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider returned an invalid valuation: {0}")]
    InvalidResponse(String),

    #[error("Profile source error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Profile parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
