// src/packages/mod.rs

//! Package header decoders
//!
//! Each repository format has a decoder implementing `PackageDecoder` that
//! turns raw package bytes into a `PackageRecord`.

pub mod control;
pub mod deb;
pub mod rpm;
pub mod traits;

pub use deb::DebDecoder;
pub use rpm::RpmDecoder;
pub use traits::{
    ChangelogEntry, DebDetails, Dependency, FileKind, FormatDetails, PackageDecoder, PackageFile,
    PackageIdentity, PackageRecord, PackageSource, RepoFormat, RpmDetails,
};

/// Decode package text, falling back to Latin-1 for non-UTF-8 bytes
///
/// Latin-1 maps every byte to a code point, so decoding never fails and
/// never loses information.
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Decoder for a repository format
pub fn decoder_for(format: RepoFormat) -> Box<dyn PackageDecoder> {
    match format {
        RepoFormat::Rpm => Box::new(RpmDecoder::new()),
        RepoFormat::Deb => Box::new(DebDecoder::new()),
    }
}
