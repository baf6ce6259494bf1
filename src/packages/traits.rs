// src/packages/traits.rs

//! Package records and the decoder interface shared by RPM and DEB

use crate::error::Result;
use crate::hash::Hash;
use crate::version::{Comparator, RpmVersion};
use std::cmp::Ordering;
use std::fmt;

/// Repository flavor a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoFormat {
    Rpm,
    Deb,
}

impl RepoFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::Deb => "deb",
        }
    }
}

impl fmt::Display for RepoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Name, epoch, version, release and architecture of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageIdentity {
    pub name: String,
    pub epoch: Option<u64>,
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl PackageIdentity {
    /// Version triple used for ordering
    pub fn evr(&self) -> RpmVersion {
        let release = (!self.release.is_empty()).then(|| self.release.clone());
        RpmVersion::new(self.epoch.unwrap_or(0), self.version.clone(), release)
    }

    /// Total order over identities: name, then version, then arch
    pub fn compare(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.evr().compare(&other.evr()))
            .then_with(|| self.arch.cmp(&other.arch))
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if let Some(epoch) = self.epoch.filter(|e| *e > 0) {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        write!(f, ".{}", self.arch)
    }
}

/// A declarative relationship on a capability name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub comparator: Option<Comparator>,
    pub version: Option<RpmVersion>,
    /// Needed before install scripts run (RPM only)
    pub pre: bool,
}

impl Dependency {
    pub fn unversioned(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparator: None,
            version: None,
            pre: false,
        }
    }

    pub fn versioned(name: impl Into<String>, comparator: Comparator, version: RpmVersion) -> Self {
        Self {
            name: name.into(),
            comparator: Some(comparator),
            version: Some(version),
            pre: false,
        }
    }

    pub fn is_versioned(&self) -> bool {
        self.comparator.is_some() && self.version.is_some()
    }

    /// Whether the capability is a file path
    pub fn is_path(&self) -> bool {
        self.name.starts_with('/')
    }

    /// Render as a Debian relationship: `name (>= 1.0)`
    pub fn to_deb_string(&self) -> String {
        match (&self.comparator, &self.version) {
            (Some(op), Some(version)) => {
                format!("{} ({} {})", self.name, op.deb_operator(), version)
            }
            _ => self.name.clone(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(op), Some(version)) = (&self.comparator, &self.version) {
            write!(f, " {} {}", op, version)?;
        }
        Ok(())
    }
}

/// Kind of an entry in a package file list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    File,
    Dir,
    /// Owned by the package but not shipped in the payload
    Ghost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageFile {
    pub path: String,
    pub kind: FileKind,
}

impl PackageFile {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub author: String,
    /// Unix seconds
    pub date: i64,
    pub text: String,
}

/// RPM header fields that only appear in repodata documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpmDetails {
    pub license: String,
    pub vendor: String,
    pub group: String,
    pub buildhost: String,
    pub sourcerpm: String,
    pub packager: String,
    pub url: String,
    pub build_time: i64,
    pub installed_size: u64,
    pub archive_size: u64,
    /// Byte range of the main header inside the package file
    pub header_start: u64,
    pub header_end: u64,
    /// Oldest entry first
    pub changelog: Vec<ChangelogEntry>,
}

/// Debian control data carried into `Packages` and `Sources` stanzas
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebDetails {
    /// Control fields in index order, values unfolded
    pub fields: Vec<(String, String)>,
    pub md5: String,
    /// Empty for records read from indices that predate the `SHA1` field
    pub sha1: String,
    /// Distribution the package is published in
    pub dist: String,
}

impl DebDetails {
    /// Case-insensitive field lookup
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatDetails {
    Rpm(RpmDetails),
    Deb(DebDetails),
}

/// Immutable result of decoding one package file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub identity: PackageIdentity,
    /// Path relative to the repository root
    pub location: String,
    /// Storage modification time (unix seconds) when the file was parsed
    pub modified_at: i64,
    pub size: u64,
    /// SHA-256 of the package file
    pub checksum: Hash,
    pub summary: String,
    pub description: String,
    pub provides: Vec<Dependency>,
    pub requires: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
    pub files: Vec<PackageFile>,
    pub details: FormatDetails,
}

impl PackageRecord {
    pub fn format(&self) -> RepoFormat {
        match self.details {
            FormatDetails::Rpm(_) => RepoFormat::Rpm,
            FormatDetails::Deb(_) => RepoFormat::Deb,
        }
    }

    pub fn rpm_details(&self) -> Option<&RpmDetails> {
        match &self.details {
            FormatDetails::Rpm(d) => Some(d),
            FormatDetails::Deb(_) => None,
        }
    }

    pub fn deb_details(&self) -> Option<&DebDetails> {
        match &self.details {
            FormatDetails::Deb(d) => Some(d),
            FormatDetails::Rpm(_) => None,
        }
    }
}

/// Raw package bytes handed to a decoder
#[derive(Debug, Clone, Copy)]
pub struct PackageSource<'a> {
    pub location: &'a str,
    pub modified_at: i64,
    pub data: &'a [u8],
}

/// Decoder for one package format
///
/// Implementations are pure functions over the source bytes and may be
/// called from several worker threads at once.
pub trait PackageDecoder: Send + Sync {
    /// Repository format produced by this decoder
    fn format(&self) -> RepoFormat;

    /// Whether a storage location holds a package of this format
    fn accepts(&self, location: &str) -> bool;

    /// Decode a package into a record
    ///
    /// Returns `Error::MalformedPackage` for anything that cannot be parsed.
    fn decode(&self, source: &PackageSource<'_>) -> Result<PackageRecord>;
}
