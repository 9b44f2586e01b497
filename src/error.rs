//! Error types for publisher-verifier.

use crate::fetch::FetchError;
use crate::prefix_list::ParseError;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for verifier operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (config files, cached prefix lists).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A prefix list blob was rejected.
    #[error("Prefix list error: {0}")]
    PrefixList(#[from] ParseError),

    /// A server publisher lookup failed.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Network-level failure outside a coordinated fetch.
    #[error("Network error: {0}")]
    Network(String),
}
