// src/repository/xml.rs

//! XML serialization for repodata documents
//!
//! Escaping is done here rather than by quick-xml so attribute whitespace
//! survives a round trip through any conforming parser. Characters that XML
//! 1.0 does not allow at all (most C0 controls, U+FFFE, U+FFFF) cannot be
//! written even as references; they become U+FFFD.

use crate::error::{Error, Result};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::fmt::Write as _;

/// Whether `c` matches the XML 1.0 `Char` production
pub fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' if !attribute => out.push(c),
            // parsers normalise literal whitespace here, references survive
            '\t' | '\n' | '\r' => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c if !is_xml_char(c) => out.push(char::REPLACEMENT_CHARACTER),
            c => out.push(c),
        }
    }
    out
}

/// Escape character data
pub fn escape_text(s: &str) -> String {
    escape(s, false)
}

/// Escape an attribute value; tab, newline and carriage return included
pub fn escape_attribute(s: &str) -> String {
    escape(s, true)
}

fn write_error(e: quick_xml::Error) -> Error {
    Error::IoError(format!("XML write failed: {}", e))
}

/// Indented document writer
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Start a document with the `<?xml ...?>` declaration
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        Ok(Self { writer })
    }

    fn element<'a>(name: &'a str, attrs: &[(&'a str, &str)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for (key, value) in attrs {
            start.push_attribute(Attribute {
                key: QName(key.as_bytes()),
                value: Cow::Owned(escape_attribute(value).into_bytes()),
            });
        }
        start
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.writer
            .write_event(Event::Start(Self::element(name, attrs)))
            .map_err(write_error)
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(write_error)
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        self.writer
            .write_event(Event::Empty(Self::element(name, attrs)))
            .map_err(write_error)
    }

    /// `<name attrs>text</name>`, or `<name attrs/>` for empty text
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<()> {
        if text.is_empty() {
            return self.empty(name, attrs);
        }
        self.start(name, attrs)?;
        self.writer
            .write_event(Event::Text(BytesText::from_escaped(escape_text(text))))
            .map_err(write_error)?;
        self.end(name)
    }

    /// Finished document bytes, newline terminated
    pub fn finish(self) -> Vec<u8> {
        let mut data = self.writer.into_inner();
        data.push(b'\n');
        data
    }
}

/// A parsed element with its attributes, text and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `rpm:entry`
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Character data directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::ParseError(format!("Bad XML attribute: {}", e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::ParseError(format!("Bad XML attribute '{}': {}", key, e)))?
                .into_owned();
            check_chars(&value)?;
            attributes.push((key, value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            ..Default::default()
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute that must be present
    pub fn required_attr(&self, key: &str) -> Result<&str> {
        self.attr(key).ok_or_else(|| {
            Error::ParseError(format!("<{}> is missing attribute '{}'", self.name, key))
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn required_child(&self, name: &str) -> Result<&Element> {
        self.child(name)
            .ok_or_else(|| Error::ParseError(format!("<{}> has no <{}>", self.name, name)))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of a leaf child, empty when the child is missing
    pub fn child_text(&self, name: &str) -> &str {
        self.child(name).map(|c| c.text.as_str()).unwrap_or("")
    }
}

fn check_chars(s: &str) -> Result<()> {
    match s.chars().find(|&c| !is_xml_char(c)) {
        Some(c) => Err(Error::ParseError(format!(
            "Character U+{:04X} is not allowed in XML",
            c as u32
        ))),
        None => Ok(()),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(Error::ParseError(format!(
                "XML document has a second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}

/// Parse a whole document into its root element
pub fn parse_document(data: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(data);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::ParseError(format!("XML error at byte {}: {}", reader.buffer_position(), e))
        })?;

        match event {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::ParseError("Unbalanced XML end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| Error::ParseError(format!("Bad XML text: {}", e)))?;
                    check_chars(&text)?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::ParseError(format!("Unclosed XML element <{}>", open.name)));
    }
    root.ok_or_else(|| Error::ParseError("Empty XML document".to_string()))
}
