// src/version/mod.rs

//! Version handling for repository index ordering
//!
//! Implements epoch:version-release parsing and the segment comparison used
//! to order packages in index documents and to collapse versioned
//! requirements. The ordering of the segment kinds is linear:
//!
//! `~` < letters < end of string < `^` < digits
//!
//! so the comparison is a total order for every pair of inputs. Note that a
//! trailing alphabetic segment sorts *below* its absence ("1.0a" < "1.0").

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed version with epoch, version, and release components
///
/// Equality follows the comparison: "1.0" and "1..0" are equal versions.
#[derive(Debug, Clone)]
pub struct RpmVersion {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    pub fn new(epoch: u64, version: impl Into<String>, release: Option<String>) -> Self {
        Self {
            epoch,
            version: version.into(),
            release,
        }
    }

    /// Parse a version string
    ///
    /// Format: [epoch:]version[-release]. The release is split at the last
    /// dash, which also matches Debian upstream-version/revision rules.
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1:2.3.4-5.el8" → epoch=1, version="2.3.4", release=Some("5.el8")
    /// - "1.0-beta-2" → version="1.0-beta", release=Some("2")
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch_str, rest) = match s.split_once(':') {
            Some((e, r)) => (e, r),
            None => ("", s),
        };

        let epoch = if epoch_str.is_empty() {
            0
        } else {
            epoch_str.trim().parse::<u64>().map_err(|e| {
                Error::ParseError(format!("Invalid epoch in version '{}': {}", s, e))
            })?
        };

        let (version, release) = match rest.rsplit_once('-') {
            Some((v, r)) => (v.to_string(), Some(r.to_string())),
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two versions: epoch, then version, then release
    ///
    /// A missing release compares like an empty one.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_segments(&self.version, &other.version))
            .then_with(|| {
                compare_segments(
                    self.release.as_deref().unwrap_or(""),
                    other.release.as_deref().unwrap_or(""),
                )
            })
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl PartialEq for RpmVersion {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for RpmVersion {}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One token of a version string. Variant order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Segment<'a> {
    Tilde,
    Alpha(&'a [u8]),
    End,
    Caret,
    /// Digit run without leading zeros, keyed by its length first
    Numeric(usize, &'a [u8]),
}

fn tokenize(s: &str) -> Vec<Segment<'_>> {
    let bytes = s.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'~' {
            segments.push(Segment::Tilde);
            i += 1;
        } else if c == b'^' {
            segments.push(Segment::Caret);
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let mut digits = &bytes[start..i];
            while digits.len() > 1 && digits[0] == b'0' {
                digits = &digits[1..];
            }
            if digits == b"0" {
                digits = &digits[..0];
            }
            segments.push(Segment::Numeric(digits.len(), digits));
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            segments.push(Segment::Alpha(&bytes[start..i]));
        } else {
            // separator
            i += 1;
        }
    }

    segments
}

/// Compare two version (or release) strings segment by segment
pub fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let left = tokenize(a);
    let right = tokenize(b);
    let len = left.len().max(right.len());

    for i in 0..len {
        let l = left.get(i).copied().unwrap_or(Segment::End);
        let r = right.get(i).copied().unwrap_or(Segment::End);
        match l.cmp(&r) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    Ordering::Equal
}

/// Relational operator of a versioned dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

/// RPM sense flag bits
pub const RPMSENSE_LESS: u32 = 1 << 1;
pub const RPMSENSE_GREATER: u32 = 1 << 2;
pub const RPMSENSE_EQUAL: u32 = 1 << 3;

impl Comparator {
    /// Decode the comparison bits of an RPM dependency flags word
    pub fn from_rpm_flags(flags: u32) -> Option<Self> {
        let less = flags & RPMSENSE_LESS != 0;
        let greater = flags & RPMSENSE_GREATER != 0;
        let equal = flags & RPMSENSE_EQUAL != 0;

        match (less, greater, equal) {
            (true, false, true) => Some(Self::Le),
            (true, false, false) => Some(Self::Lt),
            (false, true, true) => Some(Self::Ge),
            (false, true, false) => Some(Self::Gt),
            (false, false, true) => Some(Self::Eq),
            _ => None,
        }
    }

    /// Value of the `flags` attribute in repodata XML
    pub fn rpm_name(&self) -> &'static str {
        match self {
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Eq => "EQ",
            Self::Ge => "GE",
            Self::Gt => "GT",
        }
    }

    pub fn from_rpm_name(s: &str) -> Option<Self> {
        match s {
            "LT" => Some(Self::Lt),
            "LE" => Some(Self::Le),
            "EQ" => Some(Self::Eq),
            "GE" => Some(Self::Ge),
            "GT" => Some(Self::Gt),
            _ => None,
        }
    }

    /// Operator as written in Debian relationship fields
    pub fn deb_operator(&self) -> &'static str {
        match self {
            Self::Lt => "<<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">>",
        }
    }

    /// Parse a Debian relationship operator
    ///
    /// The obsolete single `<` and `>` forms mean `<=` and `>=`.
    pub fn from_deb_operator(s: &str) -> Option<Self> {
        match s {
            "<<" => Some(Self::Lt),
            "<=" | "<" => Some(Self::Le),
            "=" => Some(Self::Eq),
            ">=" | ">" => Some(Self::Ge),
            ">>" => Some(Self::Gt),
            _ => None,
        }
    }

    /// How tightly the operator pins a version; larger is stricter
    pub fn restrictiveness(&self) -> u8 {
        match self {
            Self::Eq => 5,
            Self::Gt => 4,
            Self::Ge => 3,
            Self::Lt => 2,
            Self::Le => 1,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Gt => ">",
        };
        write!(f, "{}", symbol)
    }
}
