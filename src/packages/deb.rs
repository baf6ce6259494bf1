// src/packages/deb.rs

//! DEB package control decoder
//!
//! A `.deb` is an `ar` archive holding `debian-binary`, a control tarball
//! and a data tarball. Only the `control` file of the control tarball is read.
//! A `.dsc` source description is itself a control paragraph, possibly
//! wrapped in an OpenPGP clearsignature.

use crate::compression::{self, CompressionError, CompressionFormat};
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Hash, HashAlgorithm};
use crate::packages::control::{parse_relationships, ControlError, FieldOrder, Stanza};
use crate::packages::decode_text;
use crate::packages::traits::{
    DebDetails, Dependency, FormatDetails, PackageDecoder, PackageIdentity, PackageRecord,
    PackageSource, RepoFormat,
};
use crate::version::RpmVersion;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Distribution used for packages outside `pool/<dist>/main/`
pub const DEFAULT_DIST: &str = "all";

/// Architecture given to source package records
pub const SOURCE_ARCH: &str = "source";

/// `Packages` stanza order
pub const PACKAGE_FIELDS: FieldOrder = FieldOrder {
    head: &[
        "Package",
        "Source",
        "Version",
        "Architecture",
        "Maintainer",
        "Installed-Size",
        "Pre-Depends",
        "Depends",
        "Recommends",
        "Suggests",
        "Enhances",
        "Conflicts",
        "Breaks",
        "Replaces",
        "Provides",
        "Built-Using",
        "Section",
        "Priority",
    ],
    tail: &["Filename", "Size", "MD5sum", "SHA1", "SHA256", "FileTime", "Description"],
};

/// `Sources` stanza order
pub const SOURCE_FIELDS: FieldOrder = FieldOrder {
    head: &[
        "Package",
        "Binary",
        "Version",
        "Maintainer",
        "Uploaders",
        "Build-Depends",
        "Build-Depends-Indep",
        "Build-Depends-Arch",
        "Build-Conflicts",
        "Build-Conflicts-Indep",
        "Architecture",
        "Standards-Version",
        "Format",
    ],
    tail: &[
        "Directory",
        "Files",
        "Checksums-Sha1",
        "Checksums-Sha256",
        "Filename",
        "FileTime",
    ],
};

/// Source file lists of a `.dsc` and the digest each one carries
pub const SOURCE_FILE_LISTS: &[(&str, HashAlgorithm)] = &[
    ("Files", HashAlgorithm::Md5),
    ("Checksums-Sha1", HashAlgorithm::Sha1),
    ("Checksums-Sha256", HashAlgorithm::Sha256),
];

const CLEARSIGN_BEGIN: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";

#[derive(Error, Debug)]
enum DebError {
    #[error("not an ar archive: {0}")]
    Archive(std::io::Error),

    #[error("no control.tar member")]
    MissingControlArchive,

    #[error("control archive: {0}")]
    Compression(#[from] CompressionError),

    #[error("control archive: {0}")]
    Tar(std::io::Error),

    #[error("control archive has no control file")]
    MissingControlFile,

    #[error("control file: {0}")]
    Control(#[from] ControlError),

    #[error("missing required field {0}")]
    MissingField(&'static str),

    #[error("invalid version '{0}'")]
    BadVersion(String),

    #[error("clearsigned message without a signature block")]
    UnterminatedSignature,
}

/// Distribution a pool location belongs to: `pool/<dist>/main/...`
pub fn dist_from_location(location: &str) -> &str {
    location
        .strip_prefix("pool/")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(dist, rest)| !dist.is_empty() && rest.starts_with("main/"))
        .map(|(dist, _)| dist)
        .unwrap_or(DEFAULT_DIST)
}

/// Pull the raw `control.tar*` member out of the ar container
fn read_control_archive(data: &[u8]) -> std::result::Result<(String, Vec<u8>), DebError> {
    let mut archive = ar::Archive::new(data);

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(DebError::Archive)?;
        let name = String::from_utf8_lossy(entry.header().identifier())
            .trim_end_matches('/')
            .to_string();

        if name.starts_with("control.tar") {
            let mut member = Vec::new();
            entry.read_to_end(&mut member).map_err(DebError::Archive)?;
            return Ok((name, member));
        }
    }

    Err(DebError::MissingControlArchive)
}

fn read_control_file(data: &[u8]) -> std::result::Result<String, DebError> {
    let (member_name, member) = read_control_archive(data)?;
    let format = CompressionFormat::detect(&member_name, &member);
    let tarball = compression::decompress(&member, format)?;

    let mut archive = tar::Archive::new(tarball.as_slice());
    for entry in archive.entries().map_err(DebError::Tar)? {
        let mut entry = entry.map_err(DebError::Tar)?;
        let path = entry.path().map_err(DebError::Tar)?.into_owned();
        if path == Path::new("./control") || path == Path::new("control") {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).map_err(DebError::Tar)?;
            return Ok(decode_text(&bytes));
        }
    }

    Err(DebError::MissingControlFile)
}

fn relationships(stanza: &Stanza, key: &str) -> std::result::Result<Vec<Dependency>, DebError> {
    match stanza.get(key) {
        Some(value) => Ok(parse_relationships(value)?),
        None => Ok(Vec::new()),
    }
}

/// Fields added by the index generator rather than taken from `control`
pub const INDEX_FIELDS: &[&str] = &["Filename", "Size", "MD5sum", "SHA1", "SHA256", "FileTime"];

/// Whether a stanza field is one the index generator writes
pub fn is_index_field(key: &str) -> bool {
    INDEX_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key))
}

/// Whether a pool location is a source package description
pub fn is_source_location(location: &str) -> bool {
    location.ends_with(".dsc")
}

/// File facts that accompany a control stanza
#[derive(Debug, Clone)]
pub struct DebFileInfo<'a> {
    pub location: &'a str,
    pub modified_at: i64,
    pub size: u64,
    pub checksum: Hash,
    pub md5: String,
    pub sha1: String,
}

impl<'a> DebFileInfo<'a> {
    fn of(source: &PackageSource<'a>) -> Self {
        Self {
            location: source.location,
            modified_at: source.modified_at,
            size: source.data.len() as u64,
            checksum: hash_bytes(HashAlgorithm::Sha256, source.data),
            md5: hash_bytes(HashAlgorithm::Md5, source.data).value,
            sha1: hash_bytes(HashAlgorithm::Sha1, source.data).value,
        }
    }
}

fn identity(stanza: &Stanza, arch: &str) -> std::result::Result<PackageIdentity, DebError> {
    let name = stanza.get("Package").ok_or(DebError::MissingField("Package"))?;
    let raw_version = stanza.get("Version").ok_or(DebError::MissingField("Version"))?;
    let version =
        RpmVersion::parse(raw_version).map_err(|_| DebError::BadVersion(raw_version.to_string()))?;

    Ok(PackageIdentity {
        name: name.to_string(),
        epoch: raw_version.contains(':').then_some(version.epoch),
        version: version.version,
        release: version.release.unwrap_or_default(),
        arch: arch.to_string(),
    })
}

fn control_fields(stanza: Stanza, order: &FieldOrder) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = stanza
        .into_fields()
        .into_iter()
        .filter(|(key, _)| !is_index_field(key))
        .collect();
    order.sort(&mut fields);
    fields
}

fn build_record(file: DebFileInfo<'_>, stanza: Stanza) -> std::result::Result<PackageRecord, DebError> {
    let arch = stanza
        .get("Architecture")
        .ok_or(DebError::MissingField("Architecture"))?;
    let identity = identity(&stanza, arch)?;

    let (summary, description) = match stanza.get("Description") {
        Some(text) => match text.split_once('\n') {
            Some((first, rest)) => (first.to_string(), rest.to_string()),
            None => (text.to_string(), String::new()),
        },
        None => (String::new(), String::new()),
    };

    let mut requires = relationships(&stanza, "Depends")?;
    for mut dep in relationships(&stanza, "Pre-Depends")? {
        dep.pre = true;
        requires.push(dep);
    }
    let provides = relationships(&stanza, "Provides")?;
    let conflicts = relationships(&stanza, "Conflicts")?;

    Ok(PackageRecord {
        identity,
        location: file.location.to_string(),
        modified_at: file.modified_at,
        size: file.size,
        checksum: file.checksum,
        summary,
        description,
        provides,
        requires,
        conflicts,
        obsoletes: Vec::new(),
        files: Vec::new(),
        details: FormatDetails::Deb(DebDetails {
            fields: control_fields(stanza, &PACKAGE_FIELDS),
            md5: file.md5,
            sha1: file.sha1,
            dist: dist_from_location(file.location).to_string(),
        }),
    })
}

/// Source record from a paragraph whose file lists already name the `.dsc`
fn build_source_record(file: DebFileInfo<'_>, stanza: Stanza) -> std::result::Result<PackageRecord, DebError> {
    let identity = identity(&stanza, SOURCE_ARCH)?;

    Ok(PackageRecord {
        identity,
        location: file.location.to_string(),
        modified_at: file.modified_at,
        size: file.size,
        checksum: file.checksum,
        summary: String::new(),
        description: String::new(),
        provides: Vec::new(),
        requires: Vec::new(),
        conflicts: Vec::new(),
        obsoletes: Vec::new(),
        files: Vec::new(),
        details: FormatDetails::Deb(DebDetails {
            fields: control_fields(stanza, &SOURCE_FIELDS),
            md5: file.md5,
            sha1: file.sha1,
            dist: dist_from_location(file.location).to_string(),
        }),
    })
}

/// Body of a clearsigned message, or the text itself when unsigned
fn strip_clearsign(text: &str) -> std::result::Result<String, DebError> {
    if !text.trim_start().starts_with(CLEARSIGN_BEGIN) {
        return Ok(text.to_string());
    }

    // armor headers end at the first blank line
    let lines = text.trim_start().lines().skip(1).skip_while(|l| !l.trim().is_empty()).skip(1);
    let mut body = String::new();
    for line in lines {
        if line == SIGNATURE_BEGIN {
            return Ok(body);
        }
        body.push_str(line.strip_prefix("- ").unwrap_or(line));
        body.push('\n');
    }
    Err(DebError::UnterminatedSignature)
}

/// Parse a `.dsc` into its `Sources` paragraph
///
/// `Source` becomes `Package`, `Directory` is the pool directory and each
/// file list gains a line for the `.dsc` itself.
fn source_stanza(text: &str, file: &DebFileInfo<'_>) -> std::result::Result<Stanza, DebError> {
    let body = strip_clearsign(text)?;
    let fields = Stanza::parse(&body)?
        .into_fields()
        .into_iter()
        .map(|(key, value)| {
            if key.eq_ignore_ascii_case("Source") {
                ("Package".to_string(), value)
            } else {
                (key, value)
            }
        })
        .collect();
    let mut stanza = Stanza::from_fields(fields);

    let (directory, name) = file.location.rsplit_once('/').unwrap_or(("", file.location));
    stanza.set("Directory", directory);
    for (key, algorithm) in SOURCE_FILE_LISTS {
        let digest = match algorithm {
            HashAlgorithm::Md5 => file.md5.as_str(),
            HashAlgorithm::Sha1 => file.sha1.as_str(),
            HashAlgorithm::Sha256 => file.checksum.as_str(),
        };
        let list = stanza.get(key).unwrap_or("").to_string();
        stanza.set(key, format!("{}\n{} {} {}", list, digest, file.size, name));
    }
    Ok(stanza)
}

/// Rebuild a record from a control stanza and known file facts
///
/// Used when reading records back from a published `Packages` index.
pub fn record_from_stanza(file: DebFileInfo<'_>, stanza: Stanza) -> Result<PackageRecord> {
    let location = file.location.to_string();
    build_record(file, stanza).map_err(|e| Error::ParseError(format!("{}: {}", location, e)))
}

/// Rebuild a source record from a published `Sources` paragraph
pub fn source_record_from_stanza(file: DebFileInfo<'_>, stanza: Stanza) -> Result<PackageRecord> {
    let location = file.location.to_string();
    build_source_record(file, stanza).map_err(|e| Error::ParseError(format!("{}: {}", location, e)))
}

/// Decoder for `.deb` and `.dsc` files under `pool/`
#[derive(Debug, Clone, Copy, Default)]
pub struct DebDecoder;

impl DebDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PackageDecoder for DebDecoder {
    fn format(&self) -> RepoFormat {
        RepoFormat::Deb
    }

    fn accepts(&self, location: &str) -> bool {
        location.starts_with("pool/") && (location.ends_with(".deb") || is_source_location(location))
    }

    fn decode(&self, source: &PackageSource<'_>) -> Result<PackageRecord> {
        let file = DebFileInfo::of(source);

        if is_source_location(source.location) {
            debug!("Parsing DEB source: {}", source.location);
            return source_stanza(&decode_text(source.data), &file)
                .and_then(|stanza| build_source_record(file, stanza))
                .map_err(|e| Error::malformed(source.location, e));
        }

        debug!("Parsing DEB package: {}", source.location);
        read_control_file(source.data)
            .and_then(|text| Ok(Stanza::parse(&text)?))
            .and_then(|stanza| build_record(file, stanza))
            .map_err(|e| Error::malformed(source.location, e))
    }
}
