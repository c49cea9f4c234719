//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid backend origin: {0}")]
    InvalidOrigin(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}
