// src/compression/mod.rs
//! Compression for package archive members and index documents
//!
//! `.deb` control archives arrive as gzip, xz or zstd. Published indices are
//! gzip (written without a timestamp so equal input gives equal bytes) and,
//! for DEB, bzip2.

use std::io::{self, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("{format} stream is corrupt: {source}")]
    Corrupt {
        format: CompressionFormat,
        source: io::Error,
    },

    #[error("{format} encoder failed: {source}")]
    Encode {
        format: CompressionFormat,
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    None,
    Gzip,
    Xz,
    Zstd,
    Bzip2,
}

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const BZIP2_MAGIC: &[u8] = b"BZh";

impl CompressionFormat {
    /// Format implied by a file name suffix
    ///
    /// ```
    /// use mkrepo::compression::CompressionFormat;
    ///
    /// assert_eq!(CompressionFormat::from_extension("control.tar.xz"), CompressionFormat::Xz);
    /// assert_eq!(CompressionFormat::from_extension("repomd.xml"), CompressionFormat::None);
    /// ```
    pub fn from_extension(name: &str) -> Self {
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("gz" | "tgz") => Self::Gzip,
            Some("xz") => Self::Xz,
            Some("zst" | "zstd") => Self::Zstd,
            Some("bz2") => Self::Bzip2,
            _ => Self::None,
        }
    }

    /// Format announced by the leading bytes of a stream
    pub fn from_magic_bytes(data: &[u8]) -> Self {
        if data.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if data.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if data.starts_with(ZSTD_MAGIC) {
            Self::Zstd
        } else if data.starts_with(BZIP2_MAGIC) {
            Self::Bzip2
        } else {
            Self::None
        }
    }

    /// Suffix first, content second
    pub fn detect(name: &str, data: &[u8]) -> Self {
        match Self::from_extension(name) {
            Self::None => Self::from_magic_bytes(data),
            format => format,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "plain",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Bzip2 => "bzip2",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn decompress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let corrupt = |source| CompressionError::Corrupt { format, source };
    let mut out = Vec::new();
    match format {
        CompressionFormat::None => out.extend_from_slice(data),
        CompressionFormat::Gzip => {
            flate2::read::GzDecoder::new(data).read_to_end(&mut out).map_err(corrupt)?;
        }
        CompressionFormat::Xz => {
            xz2::read::XzDecoder::new(data).read_to_end(&mut out).map_err(corrupt)?;
        }
        CompressionFormat::Zstd => {
            out = zstd::decode_all(data).map_err(corrupt)?;
        }
        CompressionFormat::Bzip2 => {
            bzip2::read::BzDecoder::new(data).read_to_end(&mut out).map_err(corrupt)?;
        }
    }
    Ok(out)
}

pub fn compress(data: &[u8], format: CompressionFormat) -> Result<Vec<u8>, CompressionError> {
    let encode = |source| CompressionError::Encode { format, source };
    match format {
        CompressionFormat::None => Ok(data.to_vec()),
        CompressionFormat::Gzip => {
            let mut encoder = flate2::GzBuilder::new()
                .mtime(0)
                .write(Vec::new(), flate2::Compression::best());
            encoder.write_all(data).map_err(encode)?;
            encoder.finish().map_err(encode)
        }
        CompressionFormat::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).map_err(encode)?;
            encoder.finish().map_err(encode)
        }
        CompressionFormat::Zstd => zstd::encode_all(data, 0).map_err(encode),
        CompressionFormat::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
            encoder.write_all(data).map_err(encode)?;
            encoder.finish().map_err(encode)
        }
    }
}
