// src/packages/control.rs

//! Debian control stanzas (RFC-822 style `Key: Value` paragraphs)
//!
//! Used for `control` files inside `.deb` archives and for the `Packages`
//! and `Release` indices. Field values are stored unfolded: continuation
//! lines lose their leading blank and are joined with `\n`. Rendering folds
//! them back, writing empty continuation lines as ` .`.

use crate::packages::traits::Dependency;
use crate::version::{Comparator, RpmVersion};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error("line {0}: continuation line before the first field")]
    OrphanContinuation(usize),

    #[error("line {0}: missing ':' separator")]
    MissingSeparator(usize),

    #[error("line {0}: empty field name")]
    EmptyKey(usize),

    #[error("invalid relationship '{0}'")]
    BadRelationship(String),
}

/// Output order of a paragraph's fields
///
/// `head` fields come first in the listed order, then every unlisted field
/// in its existing order, then the `tail` fields.
#[derive(Debug, Clone, Copy)]
pub struct FieldOrder {
    pub head: &'static [&'static str],
    pub tail: &'static [&'static str],
}

impl FieldOrder {
    fn rank(&self, key: &str) -> usize {
        let position = |list: &[&str]| list.iter().position(|f| f.eq_ignore_ascii_case(key));
        match (position(self.head), position(self.tail)) {
            (Some(n), _) => n,
            (None, Some(n)) => self.head.len() + 1 + n,
            (None, None) => self.head.len(),
        }
    }

    /// Stable sort, so unlisted fields keep their relative order
    pub fn sort(&self, fields: &mut [(String, String)]) {
        fields.sort_by_key(|(key, _)| self.rank(key));
    }
}

/// One paragraph of ordered fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stanza {
    fields: Vec<(String, String)>,
}

impl Stanza {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Parse a single paragraph; blank lines are ignored
    pub fn parse(text: &str) -> Result<Self, ControlError> {
        let mut fields: Vec<(String, String)> = Vec::new();

        for (n, line) in text.lines().enumerate() {
            let lineno = n + 1;
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let (_, value) = fields
                    .last_mut()
                    .ok_or(ControlError::OrphanContinuation(lineno))?;
                value.push('\n');
                value.push_str(line[1..].trim_end());
                continue;
            }

            let (key, value) = line
                .split_once(':')
                .ok_or(ControlError::MissingSeparator(lineno))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ControlError::EmptyKey(lineno));
            }
            fields.push((key.to_string(), value.trim().to_string()));
        }

        Ok(Self { fields })
    }

    /// Case-insensitive lookup
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing field in place or append a new one
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.fields.iter().position(|(k, _)| k.eq_ignore_ascii_case(key))?;
        Some(self.fields.remove(pos).1)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, String)> {
        self.fields
    }

    pub fn sort_fields(&mut self, order: &FieldOrder) {
        order.sort(&mut self.fields);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render with folding; the result ends with a newline
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            render_field(&mut out, key, value);
        }
        out
    }
}

fn render_field(out: &mut String, key: &str, value: &str) {
    let mut lines = value.split('\n');
    let first = lines.next().unwrap_or("");

    out.push_str(key);
    out.push(':');
    if !first.is_empty() {
        out.push(' ');
        out.push_str(first);
    }
    out.push('\n');

    for line in lines {
        if line.is_empty() {
            out.push_str(" .\n");
        } else {
            out.push(' ');
            out.push_str(line);
            out.push('\n');
        }
    }
}

/// Split text into paragraphs separated by blank lines and parse each
pub fn parse_stanzas(text: &str) -> Result<Vec<Stanza>, ControlError> {
    let mut stanzas = Vec::new();
    let mut current = String::new();
    let mut first_line = 0;

    for (n, line) in text.lines().chain(std::iter::once("")).enumerate() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                let stanza = Stanza::parse(&current).map_err(|e| shift_line(e, first_line))?;
                stanzas.push(stanza);
                current.clear();
            }
            first_line = n + 1;
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }

    Ok(stanzas)
}

fn shift_line(e: ControlError, offset: usize) -> ControlError {
    match e {
        ControlError::OrphanContinuation(n) => ControlError::OrphanContinuation(n + offset),
        ControlError::MissingSeparator(n) => ControlError::MissingSeparator(n + offset),
        ControlError::EmptyKey(n) => ControlError::EmptyKey(n + offset),
        other => other,
    }
}

/// Render paragraphs separated by blank lines
pub fn render_stanzas(stanzas: &[Stanza]) -> String {
    stanzas
        .iter()
        .map(Stanza::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a relationship field such as `Depends`
///
/// Alternatives (`a | b`) are kept as one opaque capability name since the
/// index only records what the package declares.
pub fn parse_relationships(value: &str) -> Result<Vec<Dependency>, ControlError> {
    value
        .split(',')
        .map(|item| item.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|item| !item.is_empty())
        .map(|item| {
            if item.contains('|') {
                return Ok(Dependency::unversioned(item));
            }
            parse_relationship(&item)
        })
        .collect()
}

fn parse_relationship(item: &str) -> Result<Dependency, ControlError> {
    let Some((name, rest)) = item.split_once('(') else {
        return Ok(Dependency::unversioned(item));
    };

    let bad = || ControlError::BadRelationship(item.to_string());
    let inner = rest.split_once(')').map(|(inner, _)| inner.trim()).ok_or_else(bad)?;
    let op_len = inner
        .find(|c: char| !matches!(c, '<' | '>' | '='))
        .unwrap_or(inner.len());
    let comparator = Comparator::from_deb_operator(&inner[..op_len]).ok_or_else(bad)?;
    let version = inner[op_len..].trim();
    let name = name.trim();
    if name.is_empty() || version.is_empty() {
        return Err(bad());
    }
    let version = RpmVersion::parse(version).map_err(|_| bad())?;

    Ok(Dependency::versioned(name, comparator, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: &str = "Package: hello\n\
Version: 2.10-2\n\
Architecture: amd64\n\
Depends: libc6 (>= 2.14), dpkg (>= 1.15.4) | install-info\n\
Description: example package\n \
GNU hello prints a greeting.\n \
.\n \
It is an example.\n";

    #[test]
    fn test_parse_control() {
        let stanza = Stanza::parse(CONTROL).unwrap();
        assert_eq!(stanza.get("package"), Some("hello"));
        assert_eq!(stanza.get("Version"), Some("2.10-2"));
        assert_eq!(
            stanza.get("Description"),
            Some("example package\nGNU hello prints a greeting.\n.\nIt is an example.")
        );
    }

    #[test]
    fn test_render_reproduces_input() {
        let stanza = Stanza::parse(CONTROL).unwrap();
        assert_eq!(stanza.render(), CONTROL);
    }

    #[test]
    fn test_render_empty_continuation_line() {
        let mut stanza = Stanza::new();
        stanza.set("Description", "short\nfirst\n\nsecond");
        assert_eq!(stanza.render(), "Description: short\n first\n .\n second\n");
    }

    #[test]
    fn test_render_value_starting_with_newline() {
        let mut stanza = Stanza::new();
        stanza.set("SHA256", "\nabc 10 main/Packages");
        assert_eq!(stanza.render(), "SHA256:\n abc 10 main/Packages\n");
    }

    #[test]
    fn test_set_and_remove() {
        let mut stanza = Stanza::parse("A: 1\nB: 2\n").unwrap();
        stanza.set("a", "3");
        stanza.set("C", "4");
        assert_eq!(stanza.remove("b"), Some("2".to_string()));
        assert_eq!(stanza.render(), "A: 3\nC: 4\n");
    }

    #[test]
    fn test_sort_fields() {
        const ORDER: FieldOrder = FieldOrder {
            head: &["Package", "Version"],
            tail: &["Size", "Description"],
        };
        let mut stanza = Stanza::parse("Description: d\nB: 2\nversion: 1\nSize: 3\nA: 4\nPackage: p\n").unwrap();
        stanza.sort_fields(&ORDER);
        assert_eq!(stanza.render(), "Package: p\nversion: 1\nB: 2\nA: 4\nSize: 3\nDescription: d\n");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Stanza::parse(" orphan"), Err(ControlError::OrphanContinuation(1)));
        assert_eq!(Stanza::parse("A: 1\nnocolon"), Err(ControlError::MissingSeparator(2)));
        assert_eq!(Stanza::parse(": value"), Err(ControlError::EmptyKey(1)));
    }

    #[test]
    fn test_parse_stanzas() {
        let text = "Package: a\nVersion: 1\n\n\nPackage: b\nVersion: 2\n\n";
        let stanzas = parse_stanzas(text).unwrap();
        assert_eq!(stanzas.len(), 2);
        assert_eq!(stanzas[1].get("Package"), Some("b"));
        assert_eq!(render_stanzas(&stanzas), "Package: a\nVersion: 1\n\nPackage: b\nVersion: 2\n");
    }

    #[test]
    fn test_parse_stanzas_reports_absolute_line() {
        let err = parse_stanzas("A: 1\n\nB: 2\nbroken\n").unwrap_err();
        assert_eq!(err, ControlError::MissingSeparator(4));
    }

    #[test]
    fn test_parse_relationships() {
        let deps = parse_relationships("libc6 (>= 2.14), dpkg (>= 1.15.4) | install-info,  zlib1g").unwrap();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps[0].name, "libc6");
        assert_eq!(deps[0].comparator, Some(Comparator::Ge));
        assert_eq!(deps[0].version.as_ref().unwrap().version, "2.14");
        assert_eq!(deps[1].name, "dpkg (>= 1.15.4) | install-info");
        assert!(!deps[1].is_versioned());
        assert_eq!(deps[2], Dependency::unversioned("zlib1g"));
    }

    #[test]
    fn test_parse_relationship_operators() {
        let deps = parse_relationships("a (<< 1), b (< 2), c (= 1:3-1), d (>>4)").unwrap();
        let ops: Vec<_> = deps.iter().map(|d| d.comparator.unwrap()).collect();
        assert_eq!(ops, vec![Comparator::Lt, Comparator::Le, Comparator::Eq, Comparator::Gt]);
        assert_eq!(deps[2].version.as_ref().unwrap().epoch, 1);
    }

    #[test]
    fn test_parse_relationship_errors() {
        assert!(parse_relationships("a (>= 1").is_err());
        assert!(parse_relationships("a (!= 1)").is_err());
        assert!(parse_relationships("a (>=)").is_err());
    }
}
