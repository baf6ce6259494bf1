// src/hash.rs

//! Checksums recorded in repository indices
//!
//! SHA-256 identifies packages (`pkgid` in `primary.xml`) and every index
//! file listed by `repomd.xml` or a `Release` file. MD5 and SHA-1 survive
//! only in the DEB `MD5sum`/`SHA1` fields and `Release` sections that older
//! APT clients still read.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    /// Digest length in hex characters
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha1 => 40,
            Self::Md5 => 32,
        }
    }

    /// Name used in `type="..."` attributes
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha1" | "sha-1" | "sha" => Ok(Self::Sha1),
            "md5" => Ok(Self::Md5),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown checksum type '{0}'")]
    UnknownAlgorithm(String),

    #[error("{algorithm} digest must be {expected} hex characters, got {got}")]
    BadLength {
        algorithm: HashAlgorithm,
        expected: usize,
        got: usize,
    },

    #[error("digest '{0}' is not hex")]
    NotHex(String),
}

/// Digest together with the algorithm that produced it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex
    pub value: String,
}

impl Hash {
    /// Accept a hex digest read from an index, normalising case
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        if value.len() != algorithm.hex_len() {
            return Err(HashError::BadLength {
                algorithm,
                expected: algorithm.hex_len(),
                got: value.len(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::NotHex(value));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

enum State {
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
}

/// Incremental digest; feed it with `update` or through `io::Write`
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: State,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => State::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => State::Md5(Md5::new()),
        };
        Self { algorithm, state }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Sha256(d) => d.update(data),
            State::Sha1(d) => d.update(data),
            State::Md5(d) => d.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let value = match self.state {
            State::Sha256(d) => hex(&d.finalize()),
            State::Sha1(d) => hex(&d.finalize()),
            State::Md5(d) => hex(&d.finalize()),
        };
        Hash {
            algorithm: self.algorithm,
            value,
        }
    }
}

impl io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Digest of an in-memory buffer
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Hex SHA-256 of a buffer
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data).value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            sha256(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Md5, b"hello world").value,
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha1, b"hello world").value,
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn test_write_matches_oneshot() {
        let data = vec![7u8; 20_000];
        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        std::io::copy(&mut data.as_slice(), &mut hasher).unwrap();
        hasher.flush().unwrap();
        assert_eq!(hasher.finalize().value, sha256(&data));
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("SHA1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert!("sha512".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Md5.to_string(), "md5");
    }

    #[test]
    fn test_hash_new_validates() {
        assert!(matches!(
            Hash::new(HashAlgorithm::Md5, "abc"),
            Err(HashError::BadLength { expected: 32, got: 3, .. })
        ));
        assert!(matches!(
            Hash::new(HashAlgorithm::Md5, "z".repeat(32)),
            Err(HashError::NotHex(_))
        ));
        let h = Hash::new(HashAlgorithm::Md5, "5EB63BBBE01EEED093CB22BB8F5ACDC3").unwrap();
        assert_eq!(h.as_str(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }
}
