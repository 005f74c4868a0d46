//! Small XML toolkit for the documents HCP exchanges: a read-only element
//! tree, typed attribute values and request body writers.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesText, Event};
use serde::Serialize;

use crate::error::HcpError;

/// An attribute value, typed the way HCP means it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// `"true"`/`"false"` become booleans, integers become `Int`, anything
    /// else stays a string
    #[must_use]
    pub fn cast(raw: &str) -> Self {
        match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => raw
                .parse::<i64>()
                .map_or_else(|_| Value::Str(raw.to_owned()), Value::Int),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Parsed XML element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Attributes in document order, values unescaped
    pub attributes: Vec<(String, String)>,
    /// Concatenated, unescaped text content (trimmed)
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the named child element
    #[must_use]
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Attributes cast to [`Value`]; namespace declarations and
    /// namespace-qualified attributes (`xmlns`, `xsi:...`) are dropped
    #[must_use]
    pub fn typed_attributes(&self) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter(|(k, _)| k != "xmlns" && !k.contains(':'))
            .map(|(k, v)| (k.clone(), Value::cast(v)))
            .collect()
    }
}

fn xml_err(e: impl fmt::Display) -> HcpError {
    HcpError::Xml(e.to_string())
}

fn start_element(e: &quick_xml::events::BytesStart<'_>) -> Result<Element, HcpError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = std::str::from_utf8(&attr.value).map_err(xml_err)?;
        let value = quick_xml::escape::unescape(raw).map_err(xml_err)?;
        attributes.push((key, value.into_owned()));
    }
    Ok(Element {
        name,
        attributes,
        ..Element::default()
    })
}

/// Parse a document into its root element.
///
/// # Errors
/// [`HcpError::Xml`] for malformed input or a document without a root.
pub fn parse(document: &[u8]) -> Result<Element, HcpError> {
    let mut reader = Reader::from_reader(document);

    // Open elements; text is collected raw, then unescaped and trimmed on
    // close (entity references split text events, so trimming earlier would
    // eat inner spaces)
    let mut stack: Vec<(Element, String)> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push((start_element(&e)?, String::new())),
            Event::Empty(e) => {
                let element = start_element(&e)?;
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(e) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push_str(&e.decode().map_err(xml_err)?);
                }
            }
            Event::CData(e) => {
                if let Some((_, text)) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&e);
                    text.push_str(&quick_xml::escape::escape(raw.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some((_, text)) = stack.last_mut() {
                    text.push('&');
                    text.push_str(&e.decode().map_err(xml_err)?);
                    text.push(';');
                }
            }
            Event::End(_) => {
                let Some((mut element, raw)) = stack.pop() else {
                    return Err(HcpError::Xml("unbalanced end tag".to_owned()));
                };
                element.text = quick_xml::escape::unescape(&raw)
                    .map_err(xml_err)?
                    .trim()
                    .to_owned();
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => return Err(HcpError::Xml("missing root element".to_owned())),
            _ => {}
        }
    }
}

/// Write `<root><tag>text</tag>...</root>` with each text escaped
///
/// # Errors
/// I/O errors of the in-memory writer.
pub fn write_simple(root: &str, fields: &[(&str, &str)]) -> Result<String, HcpError> {
    let mut buf = Vec::with_capacity(128);
    let mut writer = Writer::new(&mut buf);
    writer.create_element(root).write_inner_content(|w| {
        for (tag, text) in fields {
            w.create_element(*tag)
                .write_text_content(BytesText::new(text))?;
        }
        Ok::<(), std::io::Error>(())
    })?;
    String::from_utf8(buf).map_err(xml_err)
}

/// Write a self-closing `<name a="..." b="..."/>` element
///
/// # Errors
/// I/O errors of the in-memory writer.
pub fn write_empty(name: &str, attributes: &[(&str, &str)]) -> Result<String, HcpError> {
    let mut buf = Vec::with_capacity(128);
    let mut writer = Writer::new(&mut buf);
    writer
        .create_element(name)
        .with_attributes(attributes.iter().copied())
        .write_empty()?;
    String::from_utf8(buf).map_err(xml_err)
}
