// src/packages/rpm.rs

//! RPM package header decoder
//!
//! The lead, both headers, typed tag values, dependencies and file paths are
//! read with the `rpm` crate. Two pieces stay local:
//!
//! - a bounds and type scan of the raw headers before the crate sees the
//!   bytes. Offsets outside the data store reject the package, and so does an
//!   unknown data type on a tag the record depends on. Unknown types on
//!   cosmetic tags are rewritten to NULL so the crate skips them.
//! - text tags (summary, description, license, ...) are taken from the raw
//!   entry bytes. Values that are not UTF-8 decode as Latin-1 and I18N values
//!   resolve to the C locale.

use crate::error::{Error, Result};
use crate::hash::{hash_bytes, HashAlgorithm};
use crate::packages::decode_text;
use crate::packages::traits::{
    ChangelogEntry, Dependency, FileKind, FormatDetails, PackageDecoder, PackageFile,
    PackageIdentity, PackageRecord, PackageSource, RepoFormat, RpmDetails,
};
use crate::version::{Comparator, RpmVersion};
use rpm::{DependencyFlags, FileFlags, IndexSignatureTag, IndexTag, PackageMetadata};
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

const LEAD_MAGIC: [u8; 4] = [0xed, 0xab, 0xee, 0xdb];
const HEADER_MAGIC: [u8; 3] = [0x8e, 0xad, 0xe8];
const LEAD_SIZE: usize = 96;
const HEADER_INTRO_SIZE: usize = 16;
const INDEX_ENTRY_SIZE: usize = 16;
const MIN_MAJOR_VERSION: u8 = 3;

const TYPE_NULL: u32 = 0;
const TYPE_INT16: u32 = 3;
const TYPE_INT32: u32 = 4;
const TYPE_INT64: u32 = 5;
const TYPE_STRING: u32 = 6;
const TYPE_STRING_ARRAY: u32 = 8;
const TYPE_I18NSTRING: u32 = 9;

// Raw tag numbers used by the scan and the text reader
const TAG_HEADERI18NTABLE: u32 = 100;
const TAG_NAME: u32 = 1000;
const TAG_VERSION: u32 = 1001;
const TAG_RELEASE: u32 = 1002;
const TAG_EPOCH: u32 = 1003;
const TAG_SUMMARY: u32 = 1004;
const TAG_DESCRIPTION: u32 = 1005;
const TAG_BUILDHOST: u32 = 1007;
const TAG_VENDOR: u32 = 1011;
const TAG_LICENSE: u32 = 1014;
const TAG_PACKAGER: u32 = 1015;
const TAG_GROUP: u32 = 1016;
const TAG_URL: u32 = 1020;
const TAG_ARCH: u32 = 1022;
const TAG_OLDFILENAMES: u32 = 1027;
const TAG_FILEMODES: u32 = 1030;
const TAG_FILEFLAGS: u32 = 1037;
const TAG_PROVIDENAME: u32 = 1047;
const TAG_REQUIREFLAGS: u32 = 1048;
const TAG_REQUIRENAME: u32 = 1049;
const TAG_REQUIREVERSION: u32 = 1050;
const TAG_CONFLICTFLAGS: u32 = 1053;
const TAG_CONFLICTNAME: u32 = 1054;
const TAG_CONFLICTVERSION: u32 = 1055;
const TAG_OBSOLETENAME: u32 = 1090;
const TAG_PROVIDEFLAGS: u32 = 1112;
const TAG_PROVIDEVERSION: u32 = 1113;
const TAG_OBSOLETEFLAGS: u32 = 1114;
const TAG_OBSOLETEVERSION: u32 = 1115;
const TAG_DIRINDEXES: u32 = 1116;
const TAG_BASENAMES: u32 = 1117;
const TAG_DIRNAMES: u32 = 1118;

const S_IFMT: u16 = 0o170000;
const S_IFDIR: u16 = 0o040000;

/// Tags whose absence or corruption makes the record meaningless
fn is_critical(tag: u32) -> bool {
    matches!(
        tag,
        TAG_HEADERI18NTABLE
            | TAG_NAME
            | TAG_VERSION
            | TAG_RELEASE
            | TAG_EPOCH
            | TAG_ARCH
            | TAG_OLDFILENAMES
            | TAG_FILEMODES
            | TAG_FILEFLAGS
            | TAG_PROVIDENAME
            | TAG_PROVIDEFLAGS
            | TAG_PROVIDEVERSION
            | TAG_REQUIRENAME
            | TAG_REQUIREFLAGS
            | TAG_REQUIREVERSION
            | TAG_CONFLICTNAME
            | TAG_CONFLICTFLAGS
            | TAG_CONFLICTVERSION
            | TAG_OBSOLETENAME
            | TAG_OBSOLETEFLAGS
            | TAG_OBSOLETEVERSION
            | TAG_DIRINDEXES
            | TAG_BASENAMES
            | TAG_DIRNAMES
    )
}

/// Problems found while reading an RPM header
#[derive(Error, Debug)]
enum HeaderError {
    #[error("not an RPM file: bad lead magic")]
    BadLeadMagic,

    #[error("unsupported RPM format version {0}")]
    UnsupportedVersion(u8),

    #[error("bad header magic at offset {0}")]
    BadHeaderMagic(usize),

    #[error("truncated header at offset {0}")]
    Truncated(usize),

    #[error("tag {tag} points outside the header data store")]
    OutOfRange { tag: u32 },

    #[error("tag {tag} has unsupported data type {type_id}")]
    UnknownType { tag: u32, type_id: u32 },

    #[error("tag {tag} has an unexpected data type")]
    WrongType { tag: u32 },

    #[error("missing required tag {0}")]
    MissingTag(&'static str),

    #[error("tag {tag} has {got} entries, expected {expected}")]
    CountMismatch { tag: u32, expected: usize, got: usize },

    #[error(transparent)]
    Rpm(#[from] rpm::Error),
}

type HeaderResult<T> = std::result::Result<T, HeaderError>;

/// Map the crate's "tag not present" to `None`
fn optional<T>(result: std::result::Result<T, rpm::Error>) -> HeaderResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rpm::Error::TagNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_u32(data: &[u8], offset: usize) -> HeaderResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(HeaderError::Truncated(offset))
}

#[derive(Debug, Clone, Copy)]
struct RawEntry {
    type_id: u32,
    offset: usize,
    count: usize,
}

/// Index entries and data store of one header, as laid out in the file
#[derive(Debug)]
struct RawHeader<'a> {
    entries: HashMap<u32, RawEntry>,
    store: &'a [u8],
    end: usize,
    /// File offsets of type fields to overwrite with NULL
    neutralised: Vec<usize>,
}

impl<'a> RawHeader<'a> {
    /// Check the header at `offset`; every entry must stay inside the store
    fn scan(data: &'a [u8], offset: usize, critical: fn(u32) -> bool) -> HeaderResult<Self> {
        let intro = data
            .get(offset..offset + HEADER_INTRO_SIZE)
            .ok_or(HeaderError::Truncated(offset))?;
        if intro[..3] != HEADER_MAGIC {
            return Err(HeaderError::BadHeaderMagic(offset));
        }

        let index_count = read_u32(data, offset + 8)? as usize;
        let store_size = read_u32(data, offset + 12)? as usize;
        let index_start = offset + HEADER_INTRO_SIZE;
        let store_start = index_count
            .checked_mul(INDEX_ENTRY_SIZE)
            .and_then(|n| n.checked_add(index_start))
            .ok_or(HeaderError::Truncated(index_start))?;
        let end = store_start
            .checked_add(store_size)
            .filter(|&end| end <= data.len())
            .ok_or(HeaderError::Truncated(store_start))?;
        let store = &data[store_start..end];

        let mut header = Self {
            entries: HashMap::with_capacity(index_count),
            store,
            end,
            neutralised: Vec::new(),
        };
        for i in 0..index_count {
            let position = index_start + i * INDEX_ENTRY_SIZE;
            let tag = read_u32(data, position)?;
            let entry = RawEntry {
                type_id: read_u32(data, position + 4)?,
                offset: read_u32(data, position + 8)? as usize,
                count: read_u32(data, position + 12)? as usize,
            };

            if entry.type_id > TYPE_I18NSTRING {
                if critical(tag) {
                    return Err(HeaderError::UnknownType { tag, type_id: entry.type_id });
                }
                debug!("Ignoring tag {} with unknown type {}", tag, entry.type_id);
                header.neutralised.push(position + 4);
                continue;
            }
            header.check_bounds(tag, entry)?;
            header.entries.insert(tag, entry);
        }
        Ok(header)
    }

    fn check_bounds(&self, tag: u32, entry: RawEntry) -> HeaderResult<()> {
        let width = match entry.type_id {
            TYPE_NULL => return Ok(()),
            TYPE_STRING | TYPE_STRING_ARRAY | TYPE_I18NSTRING => {
                let count = if entry.type_id == TYPE_STRING { 1 } else { entry.count };
                return self.strings(tag, entry.offset, count).map(|_| ());
            }
            TYPE_INT16 => 2,
            TYPE_INT32 => 4,
            TYPE_INT64 => 8,
            // CHAR, INT8, BIN
            _ => 1,
        };
        entry
            .count
            .checked_mul(width)
            .and_then(|len| entry.offset.checked_add(len))
            .filter(|&end| end <= self.store.len())
            .map(|_| ())
            .ok_or(HeaderError::OutOfRange { tag })
    }

    /// `count` NUL-terminated byte strings starting at `offset`
    fn strings(&self, tag: u32, offset: usize, count: usize) -> HeaderResult<Vec<&'a [u8]>> {
        let mut strings = Vec::with_capacity(count.min(4096));
        let mut pos = offset;
        for _ in 0..count {
            let rest = self.store.get(pos..).ok_or(HeaderError::OutOfRange { tag })?;
            let len = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or(HeaderError::OutOfRange { tag })?;
            strings.push(&rest[..len]);
            pos += len + 1;
        }
        Ok(strings)
    }

    /// Text value of a tag; I18N entries pick `locale`
    fn text(&self, tag: u32, locale: usize) -> HeaderResult<String> {
        let Some(entry) = self.entries.get(&tag).copied() else {
            return Ok(String::new());
        };
        let values = match entry.type_id {
            TYPE_NULL => return Ok(String::new()),
            TYPE_STRING => self.strings(tag, entry.offset, 1)?,
            TYPE_STRING_ARRAY | TYPE_I18NSTRING => self.strings(tag, entry.offset, entry.count)?,
            _ => return Err(HeaderError::WrongType { tag }),
        };
        Ok(values
            .get(locale)
            .or_else(|| values.first())
            .map(|bytes| decode_text(bytes))
            .unwrap_or_default())
    }
}

/// Scan the lead and both headers; returns the main header
fn scan_package(data: &[u8]) -> HeaderResult<RawHeader<'_>> {
    if data.len() < LEAD_SIZE {
        return Err(HeaderError::Truncated(0));
    }
    if data[..4] != LEAD_MAGIC {
        return Err(HeaderError::BadLeadMagic);
    }
    if data[4] < MIN_MAJOR_VERSION {
        return Err(HeaderError::UnsupportedVersion(data[4]));
    }

    let signature = RawHeader::scan(data, LEAD_SIZE, |_| true)?;
    // the signature store is padded to an 8-byte boundary
    let main_start = (signature.end + 7) & !7;
    RawHeader::scan(data, main_start, is_critical)
}

fn parse_version(s: &str) -> RpmVersion {
    RpmVersion::parse(s).unwrap_or_else(|_| RpmVersion::new(0, s, None))
}

fn convert_dependencies(deps: Vec<rpm::Dependency>, track_pre: bool) -> Vec<Dependency> {
    let pre_flags = DependencyFlags::PREREQ | DependencyFlags::SCRIPT_PRE | DependencyFlags::SCRIPT_POST;
    deps.into_iter()
        .map(|dep| {
            let version = Some(dep.version.as_str()).filter(|v| !v.is_empty());
            let comparator = version.and_then(|_| Comparator::from_rpm_flags(dep.flags.bits()));
            Dependency {
                version: comparator.and(version).map(parse_version),
                pre: track_pre && dep.flags.intersects(pre_flags),
                comparator,
                name: dep.name,
            }
        })
        .collect()
}

fn read_files(metadata: &PackageMetadata) -> HeaderResult<Vec<PackageFile>> {
    let header = &metadata.header;
    let paths: Vec<String> = match optional(header.get_entry_data_as_string_array(IndexTag::RPMTAG_BASENAMES))? {
        Some(basenames) => {
            let dirnames = optional(header.get_entry_data_as_string_array(IndexTag::RPMTAG_DIRNAMES))?
                .map_or(0, |dirs| dirs.len());
            let indexes = optional(header.get_entry_data_as_u32_array(IndexTag::RPMTAG_DIRINDEXES))?
                .unwrap_or_default();
            if indexes.len() != basenames.len() {
                return Err(HeaderError::CountMismatch {
                    tag: TAG_DIRINDEXES,
                    expected: basenames.len(),
                    got: indexes.len(),
                });
            }
            if indexes.iter().any(|&i| i as usize >= dirnames) {
                return Err(HeaderError::OutOfRange { tag: TAG_DIRINDEXES });
            }
            metadata
                .get_file_paths()?
                .iter()
                .map(|path| path.to_string_lossy().into_owned())
                .collect()
        }
        None => optional(header.get_entry_data_as_string_array(IndexTag::RPMTAG_OLDFILENAMES))?
            .map(|names| names.to_vec())
            .unwrap_or_default(),
    };

    let modes = optional(header.get_entry_data_as_u16_array(IndexTag::RPMTAG_FILEMODES))?.unwrap_or_default();
    let flags = optional(header.get_entry_data_as_u32_array(IndexTag::RPMTAG_FILEFLAGS))?.unwrap_or_default();

    let files = paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let mode = modes.get(i).copied().unwrap_or(0);
            let flag = flags.get(i).copied().unwrap_or(0);
            let kind = if flag & FileFlags::GHOST.bits() != 0 {
                FileKind::Ghost
            } else if mode & S_IFMT == S_IFDIR {
                FileKind::Dir
            } else {
                FileKind::File
            };
            PackageFile::new(path, kind)
        })
        .collect();

    Ok(files)
}

fn read_changelog(metadata: &PackageMetadata) -> HeaderResult<Vec<ChangelogEntry>> {
    let header = &metadata.header;
    let times = optional(header.get_entry_data_as_u32_array(IndexTag::RPMTAG_CHANGELOGTIME))?.unwrap_or_default();
    let names = optional(header.get_entry_data_as_string_array(IndexTag::RPMTAG_CHANGELOGNAME))?
        .map(|v| v.to_vec())
        .unwrap_or_default();
    let texts = optional(header.get_entry_data_as_string_array(IndexTag::RPMTAG_CHANGELOGTEXT))?
        .map(|v| v.to_vec())
        .unwrap_or_default();

    // headers store the newest entry first
    let mut entries: Vec<ChangelogEntry> = times
        .iter()
        .zip(names)
        .zip(texts)
        .map(|((&date, author), text)| ChangelogEntry {
            author,
            date: date as i64,
            text,
        })
        .collect();
    entries.reverse();
    Ok(entries)
}

fn archive_size(metadata: &PackageMetadata) -> HeaderResult<u64> {
    if let Some(size) = optional(metadata.header.get_entry_data_as_u32(IndexTag::RPMTAG_ARCHIVESIZE))? {
        return Ok(u64::from(size));
    }
    let signature = &metadata.signature;
    Ok(signature
        .get_entry_data_as_u64(IndexSignatureTag::RPMSIGTAG_LONGARCHIVESIZE)
        .ok()
        .or_else(|| {
            signature
                .get_entry_data_as_u32(IndexSignatureTag::RPMSIGTAG_PAYLOADSIZE)
                .ok()
                .map(u64::from)
        })
        .unwrap_or(0))
}

fn installed_size(metadata: &PackageMetadata) -> HeaderResult<u64> {
    if let Some(size) = optional(metadata.header.get_entry_data_as_u64(IndexTag::RPMTAG_LONGSIZE))? {
        return Ok(size);
    }
    Ok(optional(metadata.header.get_entry_data_as_u32(IndexTag::RPMTAG_SIZE))?
        .map(u64::from)
        .unwrap_or(0))
}

fn build_record(source: &PackageSource<'_>, raw: &RawHeader<'_>, metadata: &PackageMetadata) -> HeaderResult<PackageRecord> {
    let name = optional(metadata.get_name())?.ok_or(HeaderError::MissingTag("NAME"))?;
    let version = optional(metadata.get_version())?.ok_or(HeaderError::MissingTag("VERSION"))?;
    let release = optional(metadata.get_release())?.ok_or(HeaderError::MissingTag("RELEASE"))?;
    let sourcerpm = optional(metadata.get_source_rpm())?;
    let arch = match sourcerpm {
        Some(_) => optional(metadata.get_arch())?
            .ok_or(HeaderError::MissingTag("ARCH"))?
            .to_string(),
        None => "src".to_string(),
    };

    let locale = optional(metadata.header.get_entry_data_as_string_array(IndexTag::RPMTAG_HEADERI18NTABLE))?
        .and_then(|locales| locales.iter().position(|locale| locale == "C"))
        .unwrap_or(0);
    let offsets = metadata.get_package_segment_offsets();

    let details = RpmDetails {
        license: raw.text(TAG_LICENSE, locale)?,
        vendor: raw.text(TAG_VENDOR, locale)?,
        group: raw.text(TAG_GROUP, locale)?,
        buildhost: raw.text(TAG_BUILDHOST, locale)?,
        sourcerpm: sourcerpm.unwrap_or_default().to_string(),
        packager: raw.text(TAG_PACKAGER, locale)?,
        url: raw.text(TAG_URL, locale)?,
        build_time: optional(metadata.header.get_entry_data_as_u32(IndexTag::RPMTAG_BUILDTIME))?
            .map(i64::from)
            .unwrap_or(0),
        installed_size: installed_size(metadata)?,
        archive_size: archive_size(metadata)?,
        header_start: offsets.header,
        header_end: offsets.payload,
        changelog: read_changelog(metadata)?,
    };

    Ok(PackageRecord {
        identity: PackageIdentity {
            name: name.to_string(),
            epoch: optional(metadata.get_epoch())?.map(u64::from),
            version: version.to_string(),
            release: release.to_string(),
            arch,
        },
        location: source.location.to_string(),
        modified_at: source.modified_at,
        size: source.data.len() as u64,
        checksum: hash_bytes(HashAlgorithm::Sha256, source.data),
        summary: raw.text(TAG_SUMMARY, locale)?,
        description: raw.text(TAG_DESCRIPTION, locale)?,
        provides: convert_dependencies(optional(metadata.get_provides())?.unwrap_or_default(), false),
        requires: convert_dependencies(optional(metadata.get_requires())?.unwrap_or_default(), true),
        conflicts: convert_dependencies(optional(metadata.get_conflicts())?.unwrap_or_default(), false),
        obsoletes: convert_dependencies(optional(metadata.get_obsoletes())?.unwrap_or_default(), false),
        files: read_files(metadata)?,
        details: FormatDetails::Rpm(details),
    })
}

fn decode_package(source: &PackageSource<'_>) -> HeaderResult<PackageRecord> {
    let raw = scan_package(source.data)?;

    let data: Cow<'_, [u8]> = if raw.neutralised.is_empty() {
        Cow::Borrowed(source.data)
    } else {
        let mut owned = source.data.to_vec();
        for &position in &raw.neutralised {
            owned[position..position + 4].copy_from_slice(&TYPE_NULL.to_be_bytes());
        }
        Cow::Owned(owned)
    };

    let mut reader: &[u8] = &data;
    let metadata = PackageMetadata::parse(&mut reader)?;
    build_record(source, &raw, &metadata)
}

/// Decoder for `.rpm` files
#[derive(Debug, Clone, Copy, Default)]
pub struct RpmDecoder;

impl RpmDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl PackageDecoder for RpmDecoder {
    fn format(&self) -> RepoFormat {
        RepoFormat::Rpm
    }

    fn accepts(&self, location: &str) -> bool {
        location.ends_with(".rpm")
    }

    fn decode(&self, source: &PackageSource<'_>) -> Result<PackageRecord> {
        debug!("Parsing RPM package: {}", source.location);

        let record = decode_package(source).map_err(|e| Error::malformed(source.location, e))?;

        debug!(
            "Parsed {} ({} provides, {} requires, {} files)",
            record.identity,
            record.provides.len(),
            record.requires.len(),
            record.files.len()
        );

        Ok(record)
    }
}
