// tests/common/mod.rs

//! Shared fixtures for integration tests: synthetic RPM and DEB packages.

#![allow(dead_code)]

use mkrepo::compression::{compress, CompressionFormat};
use mkrepo::signing::Signer;
use mkrepo::storage::MemoryStorage;
use mkrepo::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

const TYPE_INT32: u32 = 4;
const TYPE_STRING: u32 = 6;
const TYPE_STRING_ARRAY: u32 = 8;

pub const TAG_NAME: u32 = 1000;
pub const TAG_VERSION: u32 = 1001;
pub const TAG_RELEASE: u32 = 1002;
pub const TAG_EPOCH: u32 = 1003;
pub const TAG_SUMMARY: u32 = 1004;
pub const TAG_DESCRIPTION: u32 = 1005;
pub const TAG_ARCH: u32 = 1022;
pub const TAG_SOURCERPM: u32 = 1044;
pub const TAG_PROVIDENAME: u32 = 1047;
pub const TAG_REQUIREFLAGS: u32 = 1048;
pub const TAG_REQUIRENAME: u32 = 1049;
pub const TAG_REQUIREVERSION: u32 = 1050;
pub const TAG_PROVIDEFLAGS: u32 = 1112;
pub const TAG_PROVIDEVERSION: u32 = 1113;
pub const TAG_DIRINDEXES: u32 = 1116;
pub const TAG_BASENAMES: u32 = 1117;
pub const TAG_DIRNAMES: u32 = 1118;

const SIGTAG_PAYLOADSIZE: u32 = 1007;

/// RPM sense flags
pub const SENSE_EQ: u32 = 8;
pub const SENSE_GE: u32 = 12;

/// Writer for RPM header structures
#[derive(Default, Clone)]
pub struct RpmHeader {
    entries: Vec<(u32, u32, Vec<u8>, u32)>,
}

impl RpmHeader {
    /// Header with the identity tags set
    pub fn package(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self::default()
            .string(TAG_NAME, name)
            .string(TAG_VERSION, version)
            .string(TAG_RELEASE, release)
            .string(TAG_ARCH, arch)
            .string(TAG_SOURCERPM, &format!("{}-{}-{}.src.rpm", name, version, release))
    }

    pub fn raw(mut self, tag: u32, type_id: u32, data: Vec<u8>, count: u32) -> Self {
        self.entries.push((tag, type_id, data, count));
        self
    }

    pub fn string(self, tag: u32, value: &str) -> Self {
        self.bytes(tag, value.as_bytes())
    }

    /// String tag with arbitrary (possibly non-UTF-8) bytes
    pub fn bytes(self, tag: u32, value: &[u8]) -> Self {
        let mut data = value.to_vec();
        data.push(0);
        self.raw(tag, TYPE_STRING, data, 1)
    }

    pub fn strings(self, tag: u32, values: &[&str]) -> Self {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        self.raw(tag, TYPE_STRING_ARRAY, data, values.len() as u32)
    }

    pub fn int32(self, tag: u32, values: &[u32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.raw(tag, TYPE_INT32, data, values.len() as u32)
    }

    /// Requirement list as parallel name/flags/version arrays
    pub fn requires(self, deps: &[(&str, u32, &str)]) -> Self {
        let names: Vec<&str> = deps.iter().map(|d| d.0).collect();
        let flags: Vec<u32> = deps.iter().map(|d| d.1).collect();
        let versions: Vec<&str> = deps.iter().map(|d| d.2).collect();
        self.strings(TAG_REQUIRENAME, &names)
            .int32(TAG_REQUIREFLAGS, &flags)
            .strings(TAG_REQUIREVERSION, &versions)
    }

    /// File list as one directory plus basenames
    pub fn files(self, dir: &str, basenames: &[&str]) -> Self {
        let indexes = vec![0; basenames.len()];
        self.strings(TAG_DIRNAMES, &[dir])
            .strings(TAG_BASENAMES, basenames)
            .int32(TAG_DIRINDEXES, &indexes)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut index = Vec::new();
        let mut store: Vec<u8> = Vec::new();
        for (tag, type_id, data, count) in &self.entries {
            if *type_id == TYPE_INT32 {
                while store.len() % 4 != 0 {
                    store.push(0);
                }
            }
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&type_id.to_be_bytes());
            index.extend_from_slice(&(store.len() as u32).to_be_bytes());
            index.extend_from_slice(&count.to_be_bytes());
            store.extend_from_slice(data);
        }

        let mut out = vec![0x8e, 0xad, 0xe8, 0x01, 0, 0, 0, 0];
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        out.extend_from_slice(&(store.len() as u32).to_be_bytes());
        out.extend_from_slice(&index);
        out.extend_from_slice(&store);
        out
    }

    /// Complete package file: lead, signature header, main header, payload
    pub fn package_file(&self) -> Vec<u8> {
        let mut out = vec![0u8; 96];
        out[..4].copy_from_slice(&[0xed, 0xab, 0xee, 0xdb]);
        out[4] = 3;
        // archnum, name, osnum, signature type
        out[8..10].copy_from_slice(&1u16.to_be_bytes());
        out[10..17].copy_from_slice(b"package");
        out[76..78].copy_from_slice(&1u16.to_be_bytes());
        out[78..80].copy_from_slice(&5u16.to_be_bytes());
        out.extend(RpmHeader::default().int32(SIGTAG_PAYLOADSIZE, &[1024]).build());
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out.extend(self.build());
        out.extend_from_slice(b"payload");
        out
    }
}

/// A small RPM with one binary and one versioned requirement
pub fn rpm(name: &str, version: &str) -> Vec<u8> {
    RpmHeader::package(name, version, "1", "x86_64")
        .string(TAG_SUMMARY, &format!("{} summary", name))
        .string(TAG_DESCRIPTION, &format!("The {} package.", name))
        .requires(&[("libc.so.6", SENSE_GE, "2.17")])
        .files("/usr/bin/", &[name])
        .package_file()
}

fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    let tarball = builder.into_inner().unwrap();
    compress(&tarball, CompressionFormat::Gzip).unwrap()
}

/// `.deb` archive around a control file
pub fn deb_with_control(control: &str) -> Vec<u8> {
    let members = [
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", tar_gz(&[("./control", control.as_bytes())])),
        ("data.tar.gz", tar_gz(&[])),
    ];
    let mut builder = ar::Builder::new(Vec::new());
    for (name, data) in &members {
        let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
        builder.append(&header, data.as_slice()).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn deb(name: &str, version: &str, arch: &str) -> Vec<u8> {
    deb_with_control(&format!(
        "Package: {}\n\
Version: {}\n\
Architecture: {}\n\
Maintainer: Example <dev@example.org>\n\
Depends: libc6 (>= 2.14)\n\
Description: {} package\n \
Longer description of {}.\n",
        name, version, arch, name, name
    ))
}

/// Unsigned `.dsc` source description
pub fn dsc(name: &str, version: &str) -> Vec<u8> {
    let upstream = version.split('-').next().unwrap_or(version);
    format!(
        "Format: 3.0 (quilt)\n\
Source: {name}\n\
Binary: {name}\n\
Architecture: any\n\
Version: {version}\n\
Maintainer: Example <dev@example.org>\n\
Checksums-Sha256:\n \
{sha} 1024 {name}_{upstream}.orig.tar.gz\n\
Files:\n \
{md5} 1024 {name}_{upstream}.orig.tar.gz\n",
        sha = "a".repeat(64),
        md5 = "b".repeat(32),
    )
    .into_bytes()
}

/// Signer producing recognisable fake signatures and counting calls
#[derive(Default)]
pub struct FakeSigner {
    pub inline: bool,
    pub calls: AtomicUsize,
}

impl FakeSigner {
    pub fn with_inline() -> Self {
        Self {
            inline: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Signer for FakeSigner {
    fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("SIGNATURE {}\n", data.len()).into_bytes())
    }

    fn sign_inline(&self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.inline {
            return Ok(None);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = b"-----BEGIN FAKE SIGNED MESSAGE-----\n".to_vec();
        out.extend_from_slice(data);
        Ok(Some(out))
    }
}

/// Signer that always fails
pub struct FailingSigner;

impl Signer for FailingSigner {
    fn sign_detached(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(mkrepo::Error::SigningFailure("no secret key".to_string()))
    }
}

/// Every location and its bytes, for whole-tree comparisons
pub fn contents(storage: &MemoryStorage) -> Vec<(String, Vec<u8>)> {
    storage
        .locations()
        .into_iter()
        .map(|location| {
            let data = storage.get(&location).unwrap();
            (location, data)
        })
        .collect()
}
