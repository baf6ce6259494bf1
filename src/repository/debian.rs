// src/repository/debian.rs

//! DEB `dists/` indices
//!
//! Per distribution, component `main` gets one `Packages` index (plain,
//! gzip and bzip2) per architecture and one `Sources` index for `.dsc`
//! source packages. A `Release` per distribution lists the MD5, SHA1 and
//! SHA256 checksums of those indices.

use crate::compression::{self, CompressionFormat};
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Hash, HashAlgorithm};
use crate::packages::control::{parse_stanzas, render_stanzas, FieldOrder, Stanza};
use crate::packages::deb::{
    is_index_field, record_from_stanza, source_record_from_stanza, DebFileInfo, PACKAGE_FIELDS,
    SOURCE_ARCH, SOURCE_FIELDS,
};
use crate::packages::{decode_text, PackageRecord};
use crate::repository::documents::{BuildOptions, Document, IndexDocuments};
use crate::repository::snapshot::RepositorySnapshot;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

pub const DISTS_PREFIX: &str = "dists/";
pub const COMPONENT: &str = "main";
pub const DEFAULT_RELEASE_FIELD: &str = "Repo generator";

/// File names under `dists/` owned by the generator
const MANAGED_FILES: &[&str] = &[
    "Packages",
    "Packages.gz",
    "Packages.bz2",
    "Packages.xz",
    "Sources",
    "Sources.gz",
    "Sources.bz2",
    "Sources.xz",
    "Release",
    "Release.gpg",
    "InRelease",
];

/// Compressed copies written next to every plain index
const INDEX_COMPRESSIONS: &[(CompressionFormat, &str)] =
    &[(CompressionFormat::Gzip, "gz"), (CompressionFormat::Bzip2, "bz2")];

/// `Release` checksum sections in the order they are written
const RELEASE_CHECKSUMS: &[(&str, HashAlgorithm)] = &[
    ("MD5Sum", HashAlgorithm::Md5),
    ("SHA1", HashAlgorithm::Sha1),
    ("SHA256", HashAlgorithm::Sha256),
];

/// Free-form `Release` metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub origin: String,
    pub label: String,
    pub description: String,
}

impl Default for ReleaseInfo {
    fn default() -> Self {
        Self {
            origin: DEFAULT_RELEASE_FIELD.to_string(),
            label: DEFAULT_RELEASE_FIELD.to_string(),
            description: DEFAULT_RELEASE_FIELD.to_string(),
        }
    }
}

/// Whether a location under `dists/` is rewritten by every run
pub fn is_managed(location: &str) -> bool {
    location.starts_with(DISTS_PREFIX)
        && location
            .rsplit('/')
            .next()
            .is_some_and(|name| MANAGED_FILES.contains(&name))
}

pub fn malformed_list_location(dist: &str) -> String {
    format!("{}{}/malformed_list.txt", DISTS_PREFIX, dist)
}

/// Plain index path relative to `dists/<dist>/`
fn index_path(arch: &str) -> String {
    if arch == SOURCE_ARCH {
        format!("{}/source/Sources", COMPONENT)
    } else {
        format!("{}/binary-{}/Packages", COMPONENT, arch)
    }
}

/// Control fields of a record followed by the generator's file facts
fn stanza_with(record: &PackageRecord, order: &FieldOrder, file_facts: &[(&str, String)]) -> Stanza {
    let fields = record
        .deb_details()
        .map(|details| {
            details
                .fields
                .iter()
                .filter(|(key, _)| !is_index_field(key))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let mut stanza = Stanza::from_fields(fields);
    for (key, value) in file_facts {
        stanza.set(key, value.clone());
    }
    stanza.sort_fields(order);
    stanza
}

/// Packages stanza: control fields and file facts in index order
fn package_stanza(record: &PackageRecord) -> Stanza {
    let (md5, sha1) = record
        .deb_details()
        .map(|d| (d.md5.clone(), d.sha1.clone()))
        .unwrap_or_default();

    let mut facts = vec![
        ("Filename", record.location.clone()),
        ("Size", record.size.to_string()),
        ("MD5sum", md5),
    ];
    if !sha1.is_empty() {
        facts.push(("SHA1", sha1));
    }
    facts.push(("SHA256", record.checksum.value.clone()));
    facts.push(("FileTime", record.modified_at.to_string()));
    stanza_with(record, &PACKAGE_FIELDS, &facts)
}

/// Sources stanza: the file lists already name the `.dsc` itself
fn source_stanza(record: &PackageRecord) -> Stanza {
    let facts = [
        ("Filename", record.location.clone()),
        ("FileTime", record.modified_at.to_string()),
    ];
    stanza_with(record, &SOURCE_FIELDS, &facts)
}

fn render_index(records: &[&PackageRecord], stanza: fn(&PackageRecord) -> Stanza) -> String {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| {
        a.identity
            .compare(&b.identity)
            .then_with(|| a.location.cmp(&b.location))
    });
    let stanzas: Vec<Stanza> = sorted.into_iter().map(stanza).collect();
    render_stanzas(&stanzas)
}

/// Render a `Packages` index; entries sorted by identity then location
pub fn packages_index(records: &[&PackageRecord]) -> String {
    render_index(records, package_stanza)
}

/// Render a `Sources` index, sorted like `Packages`
pub fn sources_index(records: &[&PackageRecord]) -> String {
    render_index(records, source_stanza)
}

fn release_date(generated_at: i64) -> String {
    DateTime::<Utc>::from_timestamp(generated_at, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S UTC")
        .to_string()
}

/// Render a `Release` file for one distribution
///
/// `files` maps paths relative to `dists/<dist>/` to their contents.
pub fn release_file(
    dist: &str,
    architectures: &[&str],
    files: &BTreeMap<String, Vec<u8>>,
    info: &ReleaseInfo,
    generated_at: i64,
) -> String {
    let checksums = |algorithm: HashAlgorithm| {
        let lines: Vec<String> = files
            .iter()
            .map(|(path, data)| format!("{} {} {}", hash_bytes(algorithm, data), data.len(), path))
            .collect();
        format!("\n{}", lines.join("\n"))
    };

    let mut stanza = Stanza::new();
    stanza.set("Origin", info.origin.clone());
    stanza.set("Label", info.label.clone());
    stanza.set("Codename", dist);
    stanza.set("Date", release_date(generated_at));
    stanza.set("Architectures", architectures.join(" "));
    stanza.set("Components", COMPONENT);
    stanza.set("Description", info.description.clone());
    for (field, algorithm) in RELEASE_CHECKSUMS {
        stanza.set(field, checksums(*algorithm));
    }
    stanza.render()
}

/// Build every `Packages`, `Sources` and `Release` document for `records`
///
/// `previous` lists the files currently under `dists/`; managed ones that
/// the new set does not contain are reported stale.
pub fn build(records: &[PackageRecord], previous: &[String], options: &BuildOptions) -> Result<IndexDocuments> {
    let mut partitions: BTreeMap<&str, BTreeMap<&str, Vec<&PackageRecord>>> = BTreeMap::new();
    for record in records {
        let dist = record
            .deb_details()
            .map(|d| d.dist.as_str())
            .unwrap_or(crate::packages::deb::DEFAULT_DIST);
        partitions
            .entry(dist)
            .or_default()
            .entry(record.identity.arch.as_str())
            .or_default()
            .push(record);
    }

    let mut documents = Vec::new();
    let mut releases = Vec::new();
    for (dist, arches) in &partitions {
        let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (arch, packages) in arches {
            let plain = if *arch == SOURCE_ARCH {
                sources_index(packages)
            } else {
                packages_index(packages)
            }
            .into_bytes();
            debug!("{}/{}: {} packages", dist, arch, packages.len());

            let path = index_path(arch);
            for (format, suffix) in INDEX_COMPRESSIONS {
                let packed =
                    compression::compress(&plain, *format).map_err(|e| Error::IoError(e.to_string()))?;
                files.insert(format!("{}.{}", path, suffix), packed);
            }
            files.insert(path, plain);
        }

        let architectures: Vec<&str> = arches.keys().copied().filter(|a| *a != SOURCE_ARCH).collect();
        let release = release_file(dist, &architectures, &files, &options.release, options.generated_at);
        let prefix = format!("{}{}", DISTS_PREFIX, dist);

        documents.extend(
            files
                .into_iter()
                .map(|(path, data)| Document::data(format!("{}/{}", prefix, path), data)),
        );
        releases.push(
            Document::top_level(format!("{}/Release", prefix), release.into_bytes())
                .with_detached_signature(format!("{}/Release.gpg", prefix))
                .with_inline_signature(format!("{}/InRelease", prefix)),
        );
    }
    documents.extend(releases);

    let previous: Vec<String> = previous.iter().filter(|l| is_managed(l)).cloned().collect();
    Ok(IndexDocuments::new(documents, &previous, options.sign))
}

fn inconsistent(location: &str, e: impl std::fmt::Display) -> Error {
    Error::InconsistentSnapshot(format!("{}: {}", location, e))
}

fn required<'a>(stanza: &'a Stanza, key: &str) -> std::result::Result<&'a str, String> {
    stanza.get(key).ok_or_else(|| format!("stanza without {}", key))
}

fn file_time(stanza: &Stanza, location: &str) -> std::result::Result<i64, String> {
    let modified_at = required(stanza, "FileTime")?;
    // older generators wrote fractional seconds
    modified_at
        .parse::<i64>()
        .or_else(|_| modified_at.parse::<f64>().map(|t| t as i64))
        .map_err(|_| format!("{}: invalid FileTime '{}'", location, modified_at))
}

fn snapshot_record(stanza: Stanza) -> std::result::Result<PackageRecord, String> {
    let location = required(&stanza, "Filename")?.trim_start_matches('/').to_string();
    let modified_at = file_time(&stanza, &location)?;
    let size = required(&stanza, "Size")?
        .parse::<u64>()
        .map_err(|_| format!("{}: invalid Size", location))?;
    let checksum = Hash::new(HashAlgorithm::Sha256, required(&stanza, "SHA256")?)
        .map_err(|e| format!("{}: {}", location, e))?;
    let md5 = required(&stanza, "MD5sum")?.to_string();
    let sha1 = stanza.get("SHA1").unwrap_or_default().to_string();

    let file = DebFileInfo {
        location: &location,
        modified_at,
        size,
        checksum,
        md5,
        sha1,
    };
    record_from_stanza(file, stanza).map_err(|e| e.to_string())
}

/// `<digest> <size>` of `name` in a `.dsc` file list field
fn listed_file<'a>(stanza: &'a Stanza, key: &str, name: &str) -> Option<(&'a str, &'a str)> {
    stanza.get(key)?.lines().rev().find_map(|line| {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(digest), Some(size), Some(file), None) if file == name => Some((digest, size)),
            _ => None,
        }
    })
}

fn source_snapshot_record(stanza: Stanza) -> std::result::Result<PackageRecord, String> {
    let location = required(&stanza, "Filename")?.trim_start_matches('/').to_string();
    let modified_at = file_time(&stanza, &location)?;
    let name = location.rsplit('/').next().unwrap_or_default();
    let unlisted = |key: &str| format!("{}: {} does not list the .dsc", location, key);

    let (sha256, size) = listed_file(&stanza, "Checksums-Sha256", name).ok_or_else(|| unlisted("Checksums-Sha256"))?;
    let size = size
        .parse::<u64>()
        .map_err(|_| format!("{}: invalid size '{}'", location, size))?;
    let checksum = Hash::new(HashAlgorithm::Sha256, sha256).map_err(|e| format!("{}: {}", location, e))?;
    let (md5, _) = listed_file(&stanza, "Files", name).ok_or_else(|| unlisted("Files"))?;
    let md5 = md5.to_string();
    let sha1 = listed_file(&stanza, "Checksums-Sha1", name)
        .map(|(digest, _)| digest.to_string())
        .unwrap_or_default();

    let file = DebFileInfo {
        location: &location,
        modified_at,
        size,
        checksum,
        md5,
        sha1,
    };
    source_record_from_stanza(file, stanza).map_err(|e| e.to_string())
}

/// Split `dists/<dist>/<component>/binary-<arch>/Packages` or
/// `dists/<dist>/<component>/source/Sources` into dist and arch
fn published_index(location: &str) -> Option<(&str, &str)> {
    let parts: Vec<&str> = location.split('/').collect();
    match parts.as_slice() {
        ["dists", dist, _component, binary, "Packages"] => {
            binary.strip_prefix("binary-").map(|arch| (*dist, arch))
        }
        ["dists", dist, _component, "source", "Sources"] => Some((*dist, SOURCE_ARCH)),
        _ => None,
    }
}

fn read_index(
    data: &[u8],
    record: fn(Stanza) -> std::result::Result<PackageRecord, String>,
) -> Result<Vec<PackageRecord>> {
    let stanzas = parse_stanzas(&decode_text(data)).map_err(|e| Error::ParseError(e.to_string()))?;
    stanzas
        .into_iter()
        .map(|stanza| record(stanza).map_err(Error::ParseError))
        .collect()
}

/// Records listed by one `Packages` index
pub fn read_packages(data: &[u8]) -> Result<Vec<PackageRecord>> {
    read_index(data, snapshot_record)
}

/// Records listed by one `Sources` index
pub fn read_sources(data: &[u8]) -> Result<Vec<PackageRecord>> {
    read_index(data, source_snapshot_record)
}

/// Reconstruct the snapshot from every published `Packages` and `Sources` index
pub fn read_snapshot(storage: &dyn Storage) -> Result<RepositorySnapshot> {
    let mut snapshot = RepositorySnapshot::new();

    for file in storage.list(DISTS_PREFIX)? {
        let Some((dist, arch)) = published_index(&file.location) else {
            continue;
        };
        let data = storage.read(&file.location)?;
        let records = if arch == SOURCE_ARCH {
            read_sources(&data)
        } else {
            read_packages(&data)
        }
        .map_err(|e| inconsistent(&file.location, e))?;
        debug!("Read {} packages from {} ({})", records.len(), dist, arch);
        for record in records {
            snapshot.insert(record);
        }
    }

    Ok(snapshot)
}
