//! CoRE link-format (RFC 6690) documents
//!
//! Discover responses list paths and their attributes as
//! `</3/0>;pmin=10,</3/0/1>,</3/0/9>;pmax=60`.

use std::fmt;

use crate::error::{Lwm2mError, Result};

/// Value of a link attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAttributeValue {
    /// Attribute without value, e.g. `;obs`
    Flag,
    Integer(i64),
    /// Unquoted non-integer value, e.g. `;gt=20.5`
    Token(String),
    /// Quoted value, e.g. `;rt="oma.lwm2m"`
    Quoted(String),
}

impl fmt::Display for LinkAttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => Ok(()),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Token(s) => f.write_str(s),
            Self::Quoted(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

/// One entry of a link-format document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkObject {
    pub url: String,
    /// Attributes in document order
    pub attributes: Vec<(String, LinkAttributeValue)>,
}

impl LinkObject {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: LinkAttributeValue) -> Self {
        self.attributes.push((name.into(), value));
        self
    }

    /// First attribute with the given name
    pub fn attribute(&self, name: &str) -> Option<&LinkAttributeValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for LinkObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.url)?;
        for (name, value) in &self.attributes {
            match value {
                LinkAttributeValue::Flag => write!(f, ";{}", name)?,
                _ => write!(f, ";{}={}", name, value)?,
            }
        }
        Ok(())
    }
}

/// Serialize links as one document; entries are separated by `,` with no trailing separator
pub fn serialize(links: &[LinkObject]) -> String {
    links
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a link-format document
///
/// Whitespace around entries is ignored, as are empty entries. Attributes are optional.
pub fn parse(content: &[u8]) -> Result<Vec<LinkObject>> {
    let text = std::str::from_utf8(content)
        .map_err(|e| Lwm2mError::InvalidLinkFormat(format!("not UTF-8: {}", e)))?;

    split_unquoted(text, ',')
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<LinkObject> {
    let rest = entry
        .strip_prefix('<')
        .ok_or_else(|| Lwm2mError::InvalidLinkFormat(format!("missing '<' in '{}'", entry)))?;
    let (url, params) = rest
        .split_once('>')
        .ok_or_else(|| Lwm2mError::InvalidLinkFormat(format!("missing '>' in '{}'", entry)))?;

    let mut link = LinkObject::new(url.trim());
    let params = params.trim();
    if params.is_empty() {
        return Ok(link);
    }

    let params = params.strip_prefix(';').ok_or_else(|| {
        Lwm2mError::InvalidLinkFormat(format!("unexpected text after '>' in '{}'", entry))
    })?;

    for param in split_unquoted(params, ';') {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let attribute = match param.split_once('=') {
            None => (param.to_string(), LinkAttributeValue::Flag),
            Some((name, value)) => (name.trim().to_string(), parse_value(value.trim())),
        };
        link.attributes.push(attribute);
    }

    Ok(link)
}

fn parse_value(value: &str) -> LinkAttributeValue {
    if let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    {
        return LinkAttributeValue::Quoted(inner.replace("\\\"", "\""));
    }
    match value.parse::<i64>() {
        Ok(n) => LinkAttributeValue::Integer(n),
        Err(_) => LinkAttributeValue::Token(value.to_string()),
    }
}

/// Split on `separator` outside of quoted strings and `<...>` targets
fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_target = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_target = true,
            '>' if !in_quotes => in_target = false,
            c if c == separator && !in_quotes && !in_target => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}
