// src/repository/documents.rs

//! Index documents produced by a run and the options that shape them

use crate::repository::debian::ReleaseInfo;
use crate::repository::repodata::PrimaryFileRule;
use std::collections::BTreeSet;

/// Whether a document is referenced by another one or is an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Referenced from a top-level document by checksum
    Data,
    /// `repomd.xml` or `Release`; the only documents that get signed
    TopLevel,
}

/// One file to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub location: String,
    pub data: Vec<u8>,
    pub kind: DocumentKind,
    /// Where the detached signature goes when signing
    pub detached_signature: Option<String>,
    /// Where the clearsigned copy goes when signing
    pub inline_signature: Option<String>,
}

impl Document {
    pub fn data(location: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            location: location.into(),
            data,
            kind: DocumentKind::Data,
            detached_signature: None,
            inline_signature: None,
        }
    }

    pub fn top_level(location: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: DocumentKind::TopLevel,
            ..Self::data(location, data)
        }
    }

    pub fn with_detached_signature(mut self, location: impl Into<String>) -> Self {
        self.detached_signature = Some(location.into());
        self
    }

    pub fn with_inline_signature(mut self, location: impl Into<String>) -> Self {
        self.inline_signature = Some(location.into());
        self
    }

    /// Locations this document occupies when published
    pub fn locations(&self, signed: bool) -> Vec<&str> {
        let mut locations = vec![self.location.as_str()];
        if signed {
            locations.extend(self.detached_signature.as_deref());
            locations.extend(self.inline_signature.as_deref());
        }
        locations
    }
}

/// Complete output of an index build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDocuments {
    /// Data documents first, then top-level documents
    pub documents: Vec<Document>,
    /// Previously published managed files that the new set no longer contains
    pub stale: Vec<String>,
}

impl IndexDocuments {
    /// Assemble documents and work out which previous files become stale
    pub fn new(mut documents: Vec<Document>, previous: &[String], signed: bool) -> Self {
        documents.sort_by_key(|d| d.kind == DocumentKind::TopLevel);

        let current: BTreeSet<&str> = documents
            .iter()
            .flat_map(|d| d.locations(signed))
            .collect();
        let stale = previous
            .iter()
            .filter(|location| !current.contains(location.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self { documents, stale }
    }

    pub fn get(&self, location: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.location == location)
    }

    pub fn top_level(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().filter(|d| d.kind == DocumentKind::TopLevel)
    }
}

/// Settings that affect generated bytes
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Generation timestamp (unix seconds) written into top-level documents
    pub generated_at: i64,
    /// Whether top-level documents will be signed
    pub sign: bool,
    pub primary_files: PrimaryFileRule,
    pub release: ReleaseInfo,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            generated_at: 0,
            sign: false,
            primary_files: PrimaryFileRule::default(),
            release: ReleaseInfo::default(),
        }
    }
}
