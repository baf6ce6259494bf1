// src/storage/mod.rs

//! Storage backends holding a repository
//!
//! A repository is a flat namespace of locations (`/`-separated paths
//! relative to the repository root). Backends report modification times in
//! unix seconds; those timestamps are the only change-detection signal.
//!
//! Backend failures surface as `Error::StorageUnavailable` and are never
//! retried here. Missing locations surface as `Error::NotFoundError`.

mod local;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use local::LocalStorage;
pub use memory::{MemoryStorage, Operation};
#[cfg(feature = "s3")]
pub use s3::{S3Options, S3Storage};

use crate::error::{Error, Result};

/// One object reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub location: String,
    /// Unix seconds
    pub modified_at: i64,
    pub size: u64,
}

/// Unified interface for repository storage
pub trait Storage: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// All objects whose location starts with `prefix`, sorted by location
    ///
    /// An empty prefix lists the whole repository.
    fn list(&self, prefix: &str) -> Result<Vec<FileInfo>>;

    /// Read an object
    fn read(&self, location: &str) -> Result<Vec<u8>>;

    /// Create or replace an object
    fn write(&self, location: &str, data: &[u8]) -> Result<()>;

    /// Delete an object; deleting a missing object is not an error
    fn delete(&self, location: &str) -> Result<()>;

    /// Check whether an object exists
    fn exists(&self, location: &str) -> Result<bool> {
        match self.read(location) {
            Ok(_) => Ok(true),
            Err(Error::NotFoundError(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Reject locations that could escape the repository root
pub(crate) fn validate_location(location: &str) -> Result<&str> {
    let trimmed = location.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|part| part == "..") {
        return Err(Error::IoError(format!("Invalid storage location: '{}'", location)));
    }
    Ok(trimmed)
}

/// Split `s3://bucket/prefix` into bucket and prefix
pub fn parse_s3_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("s3://")?;
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return None;
    }
    Some((bucket.to_string(), prefix.trim_matches('/').to_string()))
}
