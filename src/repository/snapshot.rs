// src/repository/snapshot.rs

//! Index state as last published

use crate::packages::PackageRecord;
use std::collections::BTreeMap;
use tracing::warn;

/// Records of the existing index keyed by package location
///
/// Read once at the start of a run and replaced wholesale by its output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySnapshot {
    records: BTreeMap<String, PackageRecord>,
}

impl RepositorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records; when a location repeats, the last record wins
    pub fn from_records(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    pub fn insert(&mut self, record: PackageRecord) {
        if let Some(previous) = self.records.insert(record.location.clone(), record) {
            warn!("Index lists {} more than once", previous.location);
        }
    }

    pub fn get(&self, location: &str) -> Option<&PackageRecord> {
        self.records.get(location)
    }

    pub fn contains(&self, location: &str) -> bool {
        self.records.contains_key(location)
    }

    /// Modification time recorded for a location
    pub fn modified_at(&self, location: &str) -> Option<i64> {
        self.records.get(location).map(|r| r.modified_at)
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    /// Take a record out of the snapshot
    pub fn remove(&mut self, location: &str) -> Option<PackageRecord> {
        self.records.remove(location)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
