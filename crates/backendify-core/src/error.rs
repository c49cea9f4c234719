//! Core error types

use thiserror::Error;

/// Outcome of a failed fetch.
///
/// The HTTP layer only has to tell [`FetchError::Overloaded`] apart from
/// everything else, but every variant is kept distinct for logs and metrics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Admission gate exhausted")]
    Overloaded,

    #[error("No idle worker available")]
    PoolBusy,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Unsupported response format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to decode backend response: {0}")]
    DecodeError(String),

    #[error("Company not found")]
    NotFound,

    #[error("Timed out waiting for worker result")]
    Timeout,

    #[error("Fetch engine is shutting down")]
    ShuttingDown,
}

impl FetchError {
    /// Stable, low-cardinality label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            FetchError::Overloaded => "overloaded",
            FetchError::PoolBusy => "pool_busy",
            FetchError::UpstreamUnavailable(_) => "upstream_unavailable",
            FetchError::UnsupportedFormat(_) => "unsupported_format",
            FetchError::DecodeError(_) => "decode_error",
            FetchError::NotFound => "not_found",
            FetchError::Timeout => "timeout",
            FetchError::ShuttingDown => "shutting_down",
        }
    }
}

/// Failure to turn a backend response into a company record
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Unsupported content type: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<NormalizeError> for FetchError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::UnsupportedFormat(ct) => FetchError::UnsupportedFormat(ct),
            NormalizeError::Decode(e) => FetchError::DecodeError(e.to_string()),
        }
    }
}

/// Invalid backend registry entry
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid backend argument '{0}', expected <country>=<origin>")]
    InvalidArgument(String),

    #[error("Invalid origin for country '{country}': {origin}")]
    InvalidOrigin { country: String, origin: String },
}
