// src/error.rs

//! Error types for repository metadata generation

use thiserror::Error;

/// Errors produced while reading packages, building indices and publishing them
#[derive(Error, Debug)]
pub enum Error {
    /// A package file could not be decoded. Recoverable in force mode.
    #[error("Malformed package {location}: {cause}")]
    MalformedPackage { location: String, cause: String },

    /// The storage backend failed or could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A location does not exist on storage
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// The existing on-storage index cannot be parsed
    #[error("Inconsistent repository snapshot: {0}")]
    InconsistentSnapshot(String),

    /// Signing was requested and failed
    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

impl Error {
    /// Build a `MalformedPackage` error for a location
    pub fn malformed(location: impl Into<String>, cause: impl ToString) -> Self {
        Self::MalformedPackage {
            location: location.into(),
            cause: cause.to_string(),
        }
    }

    /// Whether a run may continue past this error (only in force mode)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedPackage { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
