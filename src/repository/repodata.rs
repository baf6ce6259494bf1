// src/repository/repodata.rs

//! RPM `repodata/` documents
//!
//! Writes `primary.xml`, `filelists.xml` and `other.xml` (gzip-compressed and
//! named by their SHA-256) plus `repomd.xml` referencing them, and reads an
//! existing set back into a snapshot.

use crate::compression::{self, CompressionFormat};
use crate::dependencies::{normalize, ProvidedFiles};
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Hash, HashAlgorithm};
use crate::packages::{
    ChangelogEntry, Dependency, FileKind, FormatDetails, PackageFile, PackageIdentity,
    PackageRecord, RpmDetails,
};
use crate::repository::documents::{BuildOptions, Document, IndexDocuments};
use crate::repository::snapshot::RepositorySnapshot;
use crate::repository::xml::{parse_document, Element, XmlWriter};
use crate::storage::Storage;
use crate::version::{Comparator, RpmVersion};
use regex::RegexSet;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use tracing::{debug, warn};

pub const REPODATA_PREFIX: &str = "repodata/";
pub const REPOMD_LOCATION: &str = "repodata/repomd.xml";
pub const REPOMD_SIGNATURE_LOCATION: &str = "repodata/repomd.xml.asc";

const NS_COMMON: &str = "http://linux.duke.edu/metadata/common";
const NS_RPM: &str = "http://linux.duke.edu/metadata/rpm";
const NS_FILELISTS: &str = "http://linux.duke.edu/metadata/filelists";
const NS_OTHER: &str = "http://linux.duke.edu/metadata/other";
const NS_REPO: &str = "http://linux.duke.edu/metadata/repo";

/// Paths listed in `primary.xml` unless configured otherwise
pub const DEFAULT_PRIMARY_PATTERNS: &[&str] = &[r".*bin/.*", r"^/etc/.*", r"^/usr/lib/sendmail$"];

/// Decides which files of a package are listed in `primary.xml`
///
/// Directories and ghosts are never primary. Without configured patterns the
/// built-in rule matches the same paths as `DEFAULT_PRIMARY_PATTERNS`.
#[derive(Debug, Clone, Default)]
pub struct PrimaryFileRule {
    patterns: Option<RegexSet>,
}

impl PrimaryFileRule {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = RegexSet::new(patterns.iter().map(|p| p.as_ref()))
            .map_err(|e| Error::ConfigError(format!("Invalid primary file pattern: {}", e)))?;
        Ok(Self {
            patterns: Some(patterns),
        })
    }

    pub fn is_primary(&self, file: &PackageFile) -> bool {
        if file.kind != FileKind::File {
            return false;
        }
        match &self.patterns {
            Some(patterns) => patterns.is_match(&file.path),
            None => is_default_primary(&file.path),
        }
    }
}

fn is_default_primary(path: &str) -> bool {
    path.contains("bin/") || path.starts_with("/etc/") || path == "/usr/lib/sendmail"
}

fn sorted_records(records: &[PackageRecord]) -> Vec<&PackageRecord> {
    let mut sorted: Vec<&PackageRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.identity
            .compare(&b.identity)
            .then_with(|| a.location.cmp(&b.location))
    });
    sorted
}

fn epoch_str(identity: &PackageIdentity) -> String {
    identity.epoch.unwrap_or(0).to_string()
}

fn write_version(w: &mut XmlWriter, identity: &PackageIdentity) -> Result<()> {
    w.empty(
        "version",
        &[
            ("epoch", &epoch_str(identity)),
            ("ver", &identity.version),
            ("rel", &identity.release),
        ],
    )
}

fn write_entries(w: &mut XmlWriter, section: &str, deps: &[Dependency], with_pre: bool) -> Result<()> {
    if deps.is_empty() {
        return Ok(());
    }

    w.start(section, &[])?;
    for dep in deps {
        let mut attrs: Vec<(&str, String)> = vec![("name", dep.name.clone())];
        if let (Some(op), Some(version)) = (&dep.comparator, &dep.version) {
            attrs.push(("flags", op.rpm_name().to_string()));
            attrs.push(("epoch", version.epoch.to_string()));
            attrs.push(("ver", version.version.clone()));
            if let Some(release) = &version.release {
                attrs.push(("rel", release.clone()));
            }
        }
        if with_pre && dep.pre {
            attrs.push(("pre", "1".to_string()));
        }
        let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        w.empty("rpm:entry", &attrs)?;
    }
    w.end(section)
}

fn write_file(w: &mut XmlWriter, file: &PackageFile) -> Result<()> {
    match file.kind {
        FileKind::File => w.text_element("file", &[], &file.path),
        FileKind::Dir => w.text_element("file", &[("type", "dir")], &file.path),
        FileKind::Ghost => w.text_element("file", &[("type", "ghost")], &file.path),
    }
}

fn primary_xml(records: &[&PackageRecord], provided: &ProvidedFiles, rule: &PrimaryFileRule) -> Result<Vec<u8>> {
    let default_details = RpmDetails::default();
    let mut w = XmlWriter::new()?;
    let count = records.len().to_string();
    w.start(
        "metadata",
        &[("xmlns", NS_COMMON), ("xmlns:rpm", NS_RPM), ("packages", &count)],
    )?;

    for record in records {
        let details = record.rpm_details().unwrap_or(&default_details);
        let deps = normalize(record, provided);

        w.start("package", &[("type", "rpm")])?;
        w.text_element("name", &[], &record.identity.name)?;
        w.text_element("arch", &[], &record.identity.arch)?;
        write_version(&mut w, &record.identity)?;
        w.text_element(
            "checksum",
            &[("type", record.checksum.algorithm.name()), ("pkgid", "YES")],
            record.checksum.as_str(),
        )?;
        w.text_element("summary", &[], &record.summary)?;
        w.text_element("description", &[], &record.description)?;
        w.text_element("packager", &[], &details.packager)?;
        w.text_element("url", &[], &details.url)?;
        w.empty(
            "time",
            &[
                ("file", &record.modified_at.to_string()),
                ("build", &details.build_time.to_string()),
            ],
        )?;
        w.empty(
            "size",
            &[
                ("package", &record.size.to_string()),
                ("installed", &details.installed_size.to_string()),
                ("archive", &details.archive_size.to_string()),
            ],
        )?;
        w.empty("location", &[("href", &record.location)])?;

        w.start("format", &[])?;
        w.text_element("rpm:license", &[], &details.license)?;
        w.text_element("rpm:vendor", &[], &details.vendor)?;
        w.text_element("rpm:group", &[], &details.group)?;
        w.text_element("rpm:buildhost", &[], &details.buildhost)?;
        w.text_element("rpm:sourcerpm", &[], &details.sourcerpm)?;
        w.empty(
            "rpm:header-range",
            &[
                ("start", &details.header_start.to_string()),
                ("end", &details.header_end.to_string()),
            ],
        )?;
        write_entries(&mut w, "rpm:provides", &deps.provides, false)?;
        write_entries(&mut w, "rpm:requires", &deps.requires, true)?;
        write_entries(&mut w, "rpm:conflicts", &deps.conflicts, false)?;
        write_entries(&mut w, "rpm:obsoletes", &deps.obsoletes, false)?;
        for file in record.files.iter().filter(|f| rule.is_primary(f)) {
            write_file(&mut w, file)?;
        }
        w.end("format")?;
        w.end("package")?;
    }

    w.end("metadata")?;
    Ok(w.finish())
}

fn package_header(w: &mut XmlWriter, record: &PackageRecord) -> Result<()> {
    w.start(
        "package",
        &[
            ("pkgid", record.checksum.as_str()),
            ("name", &record.identity.name),
            ("arch", &record.identity.arch),
        ],
    )?;
    write_version(w, &record.identity)
}

fn filelists_xml(records: &[&PackageRecord]) -> Result<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    let count = records.len().to_string();
    w.start("filelists", &[("xmlns", NS_FILELISTS), ("packages", &count)])?;
    for record in records {
        package_header(&mut w, record)?;
        for file in &record.files {
            write_file(&mut w, file)?;
        }
        w.end("package")?;
    }
    w.end("filelists")?;
    Ok(w.finish())
}

fn other_xml(records: &[&PackageRecord]) -> Result<Vec<u8>> {
    let mut w = XmlWriter::new()?;
    let count = records.len().to_string();
    w.start("otherdata", &[("xmlns", NS_OTHER), ("packages", &count)])?;
    for record in records {
        package_header(&mut w, record)?;
        if let Some(details) = record.rpm_details() {
            for entry in &details.changelog {
                w.text_element(
                    "changelog",
                    &[("author", &entry.author), ("date", &entry.date.to_string())],
                    &entry.text,
                )?;
            }
        }
        w.end("package")?;
    }
    w.end("otherdata")?;
    Ok(w.finish())
}

/// A compressed data document and the figures `repomd.xml` records for it
struct DataFile {
    kind: &'static str,
    location: String,
    checksum: String,
    open_checksum: String,
    size: usize,
    open_size: usize,
    data: Vec<u8>,
}

impl DataFile {
    fn new(kind: &'static str, open: Vec<u8>) -> Result<Self> {
        let data = compression::compress(&open, CompressionFormat::Gzip)
            .map_err(|e| Error::IoError(e.to_string()))?;
        let checksum = hash_bytes(HashAlgorithm::Sha256, &data).value;
        Ok(Self {
            kind,
            location: format!("{}{}-{}.xml.gz", REPODATA_PREFIX, checksum, kind),
            open_checksum: hash_bytes(HashAlgorithm::Sha256, &open).value,
            size: data.len(),
            open_size: open.len(),
            checksum,
            data,
        })
    }
}

fn repomd_xml(files: &[DataFile], generated_at: i64) -> Result<Vec<u8>> {
    let timestamp = generated_at.to_string();
    let mut w = XmlWriter::new()?;
    w.start("repomd", &[("xmlns", NS_REPO), ("xmlns:rpm", NS_RPM)])?;
    w.text_element("revision", &[], &timestamp)?;
    for file in files {
        w.start("data", &[("type", file.kind)])?;
        w.text_element("checksum", &[("type", "sha256")], &file.checksum)?;
        w.text_element("open-checksum", &[("type", "sha256")], &file.open_checksum)?;
        w.empty("location", &[("href", &file.location)])?;
        w.text_element("timestamp", &[], &timestamp)?;
        w.text_element("size", &[], &file.size.to_string())?;
        w.text_element("open-size", &[], &file.open_size.to_string())?;
        w.end("data")?;
    }
    w.end("repomd")?;
    Ok(w.finish())
}

/// Build the full `repodata/` document set for `records`
///
/// `previous` lists the files currently under `repodata/`; those the new set
/// does not contain are reported stale.
pub fn build(records: &[PackageRecord], previous: &[String], options: &BuildOptions) -> Result<IndexDocuments> {
    let sorted = sorted_records(records);
    let provided = ProvidedFiles::from_records(records.iter());

    let files = vec![
        DataFile::new("primary", primary_xml(&sorted, &provided, &options.primary_files)?)?,
        DataFile::new("filelists", filelists_xml(&sorted)?)?,
        DataFile::new("other", other_xml(&sorted)?)?,
    ];
    let repomd = repomd_xml(&files, options.generated_at)?;

    debug!("Built repodata for {} packages", sorted.len());

    let mut documents: Vec<Document> = files
        .into_iter()
        .map(|f| Document::data(f.location, f.data))
        .collect();
    documents.push(
        Document::top_level(REPOMD_LOCATION, repomd).with_detached_signature(REPOMD_SIGNATURE_LOCATION),
    );

    Ok(IndexDocuments::new(documents, previous, options.sign))
}

fn number<T: FromStr + Default>(element: &Element, key: &str) -> Result<T> {
    match element.attr(key) {
        None | Some("") => Ok(T::default()),
        Some(value) => value.parse().map_err(|_| {
            Error::ParseError(format!("<{}> has invalid {}='{}'", element.name, key, value))
        }),
    }
}

fn read_entries(format: &Element, section: &str) -> Result<Vec<Dependency>> {
    let Some(section) = format.child(section) else {
        return Ok(Vec::new());
    };

    section
        .children_named("rpm:entry")
        .map(|entry| {
            let name = entry.required_attr("name")?.to_string();
            let comparator = match entry.attr("flags") {
                Some(flags) => Some(Comparator::from_rpm_name(flags).ok_or_else(|| {
                    Error::ParseError(format!("Unknown dependency flags '{}'", flags))
                })?),
                None => None,
            };
            let version = entry.attr("ver").map(|ver| {
                RpmVersion::new(
                    entry.attr("epoch").and_then(|e| e.parse().ok()).unwrap_or(0),
                    ver,
                    entry.attr("rel").map(str::to_string),
                )
            });
            Ok(Dependency {
                name,
                comparator,
                version,
                pre: entry.attr("pre") == Some("1"),
            })
        })
        .collect()
}

fn read_files(parent: &Element) -> Vec<PackageFile> {
    parent
        .children_named("file")
        .map(|file| {
            let kind = match file.attr("type") {
                Some("dir") => FileKind::Dir,
                Some("ghost") => FileKind::Ghost,
                _ => FileKind::File,
            };
            PackageFile::new(file.text.clone(), kind)
        })
        .collect()
}

fn read_identity(package: &Element) -> Result<PackageIdentity> {
    let version = package.required_child("version")?;
    let epoch: u64 = number(version, "epoch")?;
    Ok(PackageIdentity {
        name: package.child_text("name").to_string(),
        epoch: (epoch > 0).then_some(epoch),
        version: version.required_attr("ver")?.to_string(),
        release: version.attr("rel").unwrap_or("").to_string(),
        arch: package.child_text("arch").to_string(),
    })
}

fn read_primary_package(package: &Element) -> Result<PackageRecord> {
    let checksum = package.required_child("checksum")?;
    let algorithm = HashAlgorithm::from_str(checksum.attr("type").unwrap_or("sha256"))
        .map_err(|e| Error::ParseError(e.to_string()))?;
    let checksum =
        Hash::new(algorithm, checksum.text.trim()).map_err(|e| Error::ParseError(e.to_string()))?;

    let time = package.required_child("time")?;
    let size = package.required_child("size")?;
    let format = package.required_child("format")?;
    let header_range = format.child("rpm:header-range");

    let details = RpmDetails {
        license: format.child_text("rpm:license").to_string(),
        vendor: format.child_text("rpm:vendor").to_string(),
        group: format.child_text("rpm:group").to_string(),
        buildhost: format.child_text("rpm:buildhost").to_string(),
        sourcerpm: format.child_text("rpm:sourcerpm").to_string(),
        packager: package.child_text("packager").to_string(),
        url: package.child_text("url").to_string(),
        build_time: number(time, "build")?,
        installed_size: number(size, "installed")?,
        archive_size: number(size, "archive")?,
        header_start: header_range.map(|r| number(r, "start")).transpose()?.unwrap_or(0),
        header_end: header_range.map(|r| number(r, "end")).transpose()?.unwrap_or(0),
        changelog: Vec::new(),
    };

    Ok(PackageRecord {
        identity: read_identity(package)?,
        location: package.required_child("location")?.required_attr("href")?.to_string(),
        modified_at: number(time, "file")?,
        size: number(size, "package")?,
        checksum,
        summary: package.child_text("summary").to_string(),
        description: package.child_text("description").to_string(),
        provides: read_entries(format, "rpm:provides")?,
        requires: read_entries(format, "rpm:requires")?,
        conflicts: read_entries(format, "rpm:conflicts")?,
        obsoletes: read_entries(format, "rpm:obsoletes")?,
        files: read_files(format),
        details: FormatDetails::Rpm(details),
    })
}

/// Per-pkgid queues, so two locations sharing a checksum still join in order
fn index_by_pkgid(root: &Element) -> Result<HashMap<String, VecDeque<&Element>>> {
    let mut index: HashMap<String, VecDeque<&Element>> = HashMap::new();
    for package in root.children_named("package") {
        let pkgid = package.required_attr("pkgid")?.to_string();
        index.entry(pkgid).or_default().push_back(package);
    }
    Ok(index)
}

/// Records described by primary, filelists and other documents
pub fn read_documents(primary: &[u8], filelists: Option<&[u8]>, other: Option<&[u8]>) -> Result<Vec<PackageRecord>> {
    let primary = parse_document(primary)?;
    let filelists = filelists.map(parse_document).transpose()?;
    let other = other.map(parse_document).transpose()?;

    let mut files_by_id = match &filelists {
        Some(root) => index_by_pkgid(root)?,
        None => HashMap::new(),
    };
    let mut other_by_id = match &other {
        Some(root) => index_by_pkgid(root)?,
        None => HashMap::new(),
    };

    let mut records = Vec::new();
    for package in primary.children_named("package") {
        let mut record = read_primary_package(package)?;
        let pkgid = record.checksum.value.clone();

        if let Some(entry) = files_by_id.get_mut(&pkgid).and_then(VecDeque::pop_front) {
            record.files = read_files(entry);
        }
        if let Some(entry) = other_by_id.get_mut(&pkgid).and_then(VecDeque::pop_front) {
            let changelog = entry
                .children_named("changelog")
                .map(|c| {
                    Ok(ChangelogEntry {
                        author: c.attr("author").unwrap_or("").to_string(),
                        date: number(c, "date")?,
                        text: c.text.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if let FormatDetails::Rpm(details) = &mut record.details {
                details.changelog = changelog;
            }
        }

        records.push(record);
    }

    Ok(records)
}

fn inconsistent(location: &str, e: impl std::fmt::Display) -> Error {
    Error::InconsistentSnapshot(format!("{}: {}", location, e))
}

fn read_data_file(storage: &dyn Storage, location: &str) -> Result<Option<Vec<u8>>> {
    let raw = match storage.read(location) {
        Ok(raw) => raw,
        Err(Error::NotFoundError(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    compression::decompress(&raw, CompressionFormat::detect(location, &raw))
        .map(Some)
        .map_err(|e| inconsistent(location, e))
}

/// Reconstruct the snapshot described by `repodata/repomd.xml`
///
/// A missing `repomd.xml` is an empty repository. A missing data document
/// means the index cannot be trusted for incremental updates, so the whole
/// repository gets parsed again.
pub fn read_snapshot(storage: &dyn Storage) -> Result<RepositorySnapshot> {
    let repomd = match storage.read(REPOMD_LOCATION) {
        Ok(data) => data,
        Err(Error::NotFoundError(_)) => return Ok(RepositorySnapshot::new()),
        Err(e) => return Err(e),
    };
    let repomd = parse_document(&repomd).map_err(|e| inconsistent(REPOMD_LOCATION, e))?;

    let mut documents: HashMap<String, Vec<u8>> = HashMap::new();
    for data in repomd.children_named("data") {
        let kind = data.required_attr("type").map_err(|e| inconsistent(REPOMD_LOCATION, e))?;
        if !matches!(kind, "primary" | "filelists" | "other") {
            continue;
        }
        let href = data
            .required_child("location")
            .and_then(|l| l.required_attr("href"))
            .map_err(|e| inconsistent(REPOMD_LOCATION, e))?;

        match read_data_file(storage, href)? {
            Some(content) => {
                documents.insert(kind.to_string(), content);
            }
            None => {
                warn!("{} references missing {}, rebuilding from scratch", REPOMD_LOCATION, href);
                return Ok(RepositorySnapshot::new());
            }
        }
    }

    let Some(primary) = documents.get("primary") else {
        return Err(inconsistent(REPOMD_LOCATION, "no primary document"));
    };
    let records = read_documents(
        primary,
        documents.get("filelists").map(Vec::as_slice),
        documents.get("other").map(Vec::as_slice),
    )
    .map_err(|e| inconsistent(REPODATA_PREFIX, e))?;

    debug!("Read {} packages from existing repodata", records.len());
    Ok(RepositorySnapshot::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::ChangelogEntry;

    fn record(name: &str, version: &str) -> PackageRecord {
        let location = format!("Packages/{}-{}-1.x86_64.rpm", name, version);
        PackageRecord {
            identity: PackageIdentity {
                name: name.to_string(),
                epoch: None,
                version: version.to_string(),
                release: "1".to_string(),
                arch: "x86_64".to_string(),
            },
            checksum: hash_bytes(HashAlgorithm::Sha256, location.as_bytes()),
            location,
            modified_at: 1_600_000_000,
            size: 1234,
            summary: format!("{} summary", name),
            description: "A <b>bold</b> & 'quoted' description".to_string(),
            provides: vec![Dependency::versioned(
                name,
                Comparator::Eq,
                RpmVersion::parse(&format!("{}-1", version)).unwrap(),
            )],
            requires: vec![
                Dependency {
                    pre: true,
                    ..Dependency::unversioned("/bin/sh")
                },
                Dependency::versioned("libc.so.6", Comparator::Ge, RpmVersion::parse("2.5").unwrap()),
                Dependency::versioned("libc.so.6", Comparator::Ge, RpmVersion::parse("2.17").unwrap()),
                Dependency::versioned("rpmlib(CompressedFileNames)", Comparator::Le, RpmVersion::parse("3.0.4-1").unwrap()),
            ],
            conflicts: Vec::new(),
            obsoletes: vec![Dependency::unversioned("old-name")],
            files: vec![
                PackageFile::new(format!("/usr/bin/{}", name), FileKind::File),
                PackageFile::new(format!("/usr/share/doc/{}", name), FileKind::Dir),
                PackageFile::new(format!("/usr/share/doc/{}/README", name), FileKind::File),
                PackageFile::new(format!("/etc/{}.conf", name), FileKind::Ghost),
            ],
            details: FormatDetails::Rpm(RpmDetails {
                license: "MIT".to_string(),
                buildhost: "builder".to_string(),
                sourcerpm: format!("{}-{}-1.src.rpm", name, version),
                build_time: 1_599_999_999,
                installed_size: 4096,
                archive_size: 4500,
                header_start: 280,
                header_end: 2000,
                changelog: vec![ChangelogEntry {
                    author: "Dev <dev@example.org> - 1.0-1".to_string(),
                    date: 1_500_000_000,
                    text: "- Initial package".to_string(),
                }],
                ..Default::default()
            }),
        }
    }

    fn decompress(doc: &Document) -> String {
        String::from_utf8(compression::decompress(&doc.data, CompressionFormat::Gzip).unwrap()).unwrap()
    }

    #[test]
    fn test_primary_file_rule() {
        let rule = PrimaryFileRule::default();
        assert!(rule.is_primary(&PackageFile::new("/usr/bin/foo", FileKind::File)));
        assert!(rule.is_primary(&PackageFile::new("/usr/sbin/foo", FileKind::File)));
        assert!(rule.is_primary(&PackageFile::new("/etc/foo.conf", FileKind::File)));
        assert!(rule.is_primary(&PackageFile::new("/usr/lib/sendmail", FileKind::File)));
        assert!(!rule.is_primary(&PackageFile::new("/usr/lib/sendmail.cf", FileKind::File)));
        assert!(!rule.is_primary(&PackageFile::new("/usr/share/doc/README", FileKind::File)));
        assert!(!rule.is_primary(&PackageFile::new("/etc/foo.d", FileKind::Dir)));
        assert!(!rule.is_primary(&PackageFile::new("/etc/foo.conf", FileKind::Ghost)));

        let custom = PrimaryFileRule::new(&["^/opt/"]).unwrap();
        assert!(custom.is_primary(&PackageFile::new("/opt/tool", FileKind::File)));
        assert!(!custom.is_primary(&PackageFile::new("/usr/bin/foo", FileKind::File)));
        assert!(PrimaryFileRule::new(&["("]).is_err());
    }

    #[test]
    fn test_builtin_rule_matches_default_patterns() {
        let builtin = PrimaryFileRule::default();
        let compiled = PrimaryFileRule::new(DEFAULT_PRIMARY_PATTERNS).unwrap();
        for path in [
            "/usr/bin/foo",
            "/sbin/init",
            "/opt/tool/bin/run",
            "/usr/binary",
            "/etc/hosts",
            "/srv/etc/hosts",
            "/usr/lib/sendmail",
            "/usr/lib/sendmail.cf",
            "/usr/share/doc/README",
        ] {
            let file = PackageFile::new(path, FileKind::File);
            assert_eq!(builtin.is_primary(&file), compiled.is_primary(&file), "{}", path);
        }
    }

    #[test]
    fn test_build_layout() {
        let records = vec![record("zeta", "1.0"), record("alpha", "2.0")];
        let docs = build(&records, &[], &BuildOptions::default()).unwrap();

        assert_eq!(docs.documents.len(), 4);
        let repomd = docs.documents.last().unwrap();
        assert_eq!(repomd.location, REPOMD_LOCATION);
        assert_eq!(repomd.detached_signature.as_deref(), Some(REPOMD_SIGNATURE_LOCATION));

        let primary = &docs.documents[0];
        let checksum = hash_bytes(HashAlgorithm::Sha256, &primary.data).value;
        assert_eq!(primary.location, format!("repodata/{}-primary.xml.gz", checksum));

        let text = decompress(primary);
        assert!(text.contains("packages=\"2\""));
        assert!(text.find("<name>alpha</name>").unwrap() < text.find("<name>zeta</name>").unwrap());
        assert!(text.contains("<description>A &lt;b&gt;bold&lt;/b&gt; &amp; &apos;quoted&apos; description</description>"));
        assert!(text.contains("<rpm:entry name=\"/bin/sh\" pre=\"1\"/>"));
        assert!(text.contains("<rpm:entry name=\"libc.so.6\" flags=\"GE\" epoch=\"0\" ver=\"2.17\"/>"));
        assert!(!text.contains("ver=\"2.5\""));
        assert!(!text.contains("rpmlib("));
        assert!(text.contains("<file>/usr/bin/alpha</file>"));
        assert!(!text.contains("README"));
        assert!(!text.contains("type=\"ghost\""));
        assert!(text.contains("<rpm:header-range start=\"280\" end=\"2000\"/>"));

        let filelists = decompress(&docs.documents[1]);
        assert!(filelists.contains("<file type=\"dir\">/usr/share/doc/alpha</file>"));
        assert!(filelists.contains("<file type=\"ghost\">/etc/alpha.conf</file>"));
        assert!(filelists.contains("/usr/share/doc/alpha/README"));

        let other = decompress(&docs.documents[2]);
        assert!(other.contains("date=\"1500000000\""));
    }

    #[test]
    fn test_repomd_references_data_documents() {
        let docs = build(&[record("foo", "1.0")], &[], &BuildOptions { generated_at: 77, ..Default::default() }).unwrap();
        let repomd = parse_document(&docs.documents[3].data).unwrap();
        assert_eq!(repomd.child_text("revision"), "77");

        for (data, doc) in repomd.children_named("data").zip(&docs.documents) {
            let href = data.required_child("location").unwrap().attr("href").unwrap();
            assert_eq!(href, doc.location);
            assert_eq!(data.child_text("checksum"), hash_bytes(HashAlgorithm::Sha256, &doc.data).value);
            assert_eq!(data.child_text("size"), doc.data.len().to_string());
            let open = compression::decompress(&doc.data, CompressionFormat::Gzip).unwrap();
            assert_eq!(data.child_text("open-checksum"), hash_bytes(HashAlgorithm::Sha256, &open).value);
            assert_eq!(data.child_text("open-size"), open.len().to_string());
            assert_eq!(data.child_text("timestamp"), "77");
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let records = vec![record("a", "1"), record("b", "2")];
        let reversed: Vec<_> = records.iter().rev().cloned().collect();
        let first = build(&records, &[], &BuildOptions::default()).unwrap();
        let second = build(&reversed, &[], &BuildOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stale_repodata() {
        let previous = vec![
            "repodata/old-primary.xml.gz".to_string(),
            REPOMD_LOCATION.to_string(),
            REPOMD_SIGNATURE_LOCATION.to_string(),
        ];
        let docs = build(&[record("a", "1")], &previous, &BuildOptions::default()).unwrap();
        assert_eq!(docs.stale, vec!["repodata/old-primary.xml.gz", REPOMD_SIGNATURE_LOCATION]);

        let signed = BuildOptions { sign: true, ..Default::default() };
        let docs = build(&[record("a", "1")], &previous, &signed).unwrap();
        assert_eq!(docs.stale, vec!["repodata/old-primary.xml.gz"]);
    }

    #[test]
    fn test_read_back() {
        let records = vec![record("foo", "1.0"), record("bar", "0.9")];
        let docs = build(&records, &[], &BuildOptions::default()).unwrap();
        let open = |i: usize| compression::decompress(&docs.documents[i].data, CompressionFormat::Gzip).unwrap();

        let read = read_documents(&open(0), Some(&open(1)), Some(&open(2))).unwrap();
        assert_eq!(read.len(), 2);

        let foo = read.iter().find(|r| r.identity.name == "foo").unwrap();
        let original = &records[0];
        assert_eq!(foo.location, original.location);
        assert_eq!(foo.checksum, original.checksum);
        assert_eq!(foo.modified_at, original.modified_at);
        assert_eq!(foo.description, original.description);
        assert_eq!(foo.files, original.files);
        assert_eq!(foo.rpm_details(), original.rpm_details());

        let requires: Vec<String> = foo.requires.iter().map(|d| d.to_string()).collect();
        assert_eq!(requires, vec!["/bin/sh", "libc.so.6 >= 2.17"]);
        assert!(foo.requires[0].pre);
        assert_eq!(foo.provides, original.provides);
    }

    #[test]
    fn test_rebuild_from_read_back_is_identical() {
        let records = vec![record("foo", "1.0")];
        let docs = build(&records, &[], &BuildOptions::default()).unwrap();
        let open = |i: usize| compression::decompress(&docs.documents[i].data, CompressionFormat::Gzip).unwrap();
        let read = read_documents(&open(0), Some(&open(1)), Some(&open(2))).unwrap();

        let rebuilt = build(&read, &[], &BuildOptions::default()).unwrap();
        assert_eq!(rebuilt, docs);
    }

    #[test]
    fn test_read_rejects_garbage() {
        assert!(read_documents(b"<metadata><package><name>x</name></package></metadata>", None, None).is_err());
        assert!(read_documents(b"not xml <", None, None).is_err());
    }
}
