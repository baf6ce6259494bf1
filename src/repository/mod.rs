// src/repository/mod.rs

//! Repository index generation
//!
//! Builds createrepo-style `repodata/` for RPM trees and `dists/` indices
//! for DEB pools, reconciling against whatever index is already published.

pub mod debian;
pub mod documents;
pub mod reconcile;
pub mod repodata;
pub mod snapshot;
pub mod sync;
pub mod xml;

pub use documents::{BuildOptions, Document, DocumentKind, IndexDocuments};
pub use reconcile::{plan, ParseReason, ParseTask, ReconcilePlan};
pub use snapshot::RepositorySnapshot;
pub use sync::{update_repository, UpdateOptions, UpdateReport};

use crate::error::Result;
use crate::packages::RepoFormat;
use crate::storage::Storage;

/// Guess the format of a repository from its layout
///
/// A `pool/` tree means DEB. A `Packages/` tree or any `.rpm` file means RPM.
pub fn detect_format(storage: &dyn Storage) -> Result<Option<RepoFormat>> {
    if !storage.list("pool/")?.is_empty() {
        return Ok(Some(RepoFormat::Deb));
    }
    if !storage.list("Packages/")?.is_empty() {
        return Ok(Some(RepoFormat::Rpm));
    }
    let listing = storage.list("")?;
    if listing.iter().any(|f| f.location.ends_with(".rpm")) {
        return Ok(Some(RepoFormat::Rpm));
    }
    Ok(None)
}
