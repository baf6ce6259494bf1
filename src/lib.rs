// src/lib.rs

//! mkrepo: repository metadata generator
//!
//! Scans a tree of RPM or DEB packages on local or S3 storage and keeps its
//! index up to date.
//!
//! # Architecture
//!
//! - Decoders: package bytes to `PackageRecord`, one per format
//! - Reconciliation: only new or touched packages are decoded again
//! - Builders: createrepo `repodata/` and Debian `dists/` documents
//! - Publishing: data first, signed top-level documents last

pub mod compression;
pub mod config;
pub mod dependencies;
mod error;
pub mod hash;
pub mod packages;
pub mod repository;
pub mod signing;
pub mod storage;
pub mod version;

pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm};
pub use packages::{PackageRecord, RepoFormat};
pub use repository::{update_repository, UpdateOptions, UpdateReport};
