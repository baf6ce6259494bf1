// src/repository/reconcile.rs

//! Incremental update planning
//!
//! A package whose storage timestamp matches the one recorded in the index
//! is kept as indexed. Anything new or touched is parsed again and anything
//! that vanished from storage is dropped from the index.

use crate::repository::snapshot::RepositorySnapshot;
use crate::storage::FileInfo;
use std::collections::HashSet;
use std::fmt;

/// Why a package needs parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReason {
    /// Not in the index yet
    Added,
    /// In the index with a different modification time
    Updated,
}

impl fmt::Display for ParseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "Adding"),
            Self::Updated => write!(f, "Updating"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTask {
    pub file: FileInfo,
    pub reason: ParseReason,
}

/// What a run does with each package location
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Live packages to decode, in listing order
    pub to_parse: Vec<ParseTask>,
    /// Indexed packages kept verbatim, in listing order
    pub to_retain: Vec<String>,
    /// Indexed packages no longer on storage, sorted
    pub to_purge: Vec<String>,
}

impl ReconcilePlan {
    /// Whether the run would leave the package set untouched
    pub fn is_noop(&self) -> bool {
        self.to_parse.is_empty() && self.to_purge.is_empty()
    }
}

/// Diff the indexed state against the live package listing
///
/// `listing` must contain package files only.
pub fn plan(snapshot: &RepositorySnapshot, listing: &[FileInfo]) -> ReconcilePlan {
    let mut result = ReconcilePlan::default();
    let mut live: HashSet<&str> = HashSet::with_capacity(listing.len());

    for file in listing {
        if !live.insert(file.location.as_str()) {
            continue;
        }
        match snapshot.modified_at(&file.location) {
            Some(indexed) if indexed == file.modified_at => {
                result.to_retain.push(file.location.clone());
            }
            Some(_) => result.to_parse.push(ParseTask {
                file: file.clone(),
                reason: ParseReason::Updated,
            }),
            None => result.to_parse.push(ParseTask {
                file: file.clone(),
                reason: ParseReason::Added,
            }),
        }
    }

    result.to_purge = snapshot
        .locations()
        .filter(|location| !live.contains(location))
        .map(str::to_string)
        .collect();

    result
}
