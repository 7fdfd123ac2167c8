// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed XML event reader.
//!
//! Thin adapter over `quick-xml` delivering start/empty/end/text events
//! with resolved namespace ids on elements and attributes. Namespace
//! scopes are tracked here rather than in the parser so attribute values
//! that embed prefixes (`select`, `key`) can be compiled against the
//! live context: those two attributes carry an eagerly compiled XPath
//! program, because validation later needs prefixes resolved while the
//! declarations are still in scope.

use ncs_core::xmlns::NsId;
use ncs_core::xpath::{XPathError, XPathProgram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("unexpected end of document")]
    UnexpectedEof,
    #[error("attribute syntax: {0}")]
    Attr(String),
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Malformed(e.to_string())
    }
}

/// One attribute, delivered with its start/empty node.
#[derive(Debug, Clone)]
pub struct XmlAttr {
    pub ns: NsId,
    /// Local name (prefix stripped).
    pub name: String,
    /// Length of the prefix on the wire; 0 for unqualified attributes,
    /// letting callers distinguish the two cheaply.
    pub prefix_len: usize,
    pub value: String,
    /// Eager compilation result for `select`/`key` attributes.
    pub xpath: Option<Result<XPathProgram, XPathError>>,
}

impl XmlAttr {
    pub fn is_qualified(&self) -> bool {
        self.prefix_len > 0
    }
}

/// Typed node events.
#[derive(Debug, Clone)]
pub enum XmlEvent {
    Start { ns: NsId, name: String, attrs: Vec<XmlAttr> },
    Empty { ns: NsId, name: String, attrs: Vec<XmlAttr> },
    End { ns: NsId, name: String },
    Text(String),
    Eof,
}

impl XmlEvent {
    /// Element name for start/empty/end events.
    pub fn name(&self) -> Option<&str> {
        match self {
            XmlEvent::Start { name, .. }
            | XmlEvent::Empty { name, .. }
            | XmlEvent::End { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attrs(&self) -> &[XmlAttr] {
        match self {
            XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn find_attr(&self, name: &str) -> Option<&XmlAttr> {
        self.attrs().iter().find(|a| a.name == name)
    }
}

/// Namespace binding introduced by one element.
#[derive(Debug, Clone)]
struct NsBinding {
    depth: usize,
    /// Empty string is the default namespace.
    prefix: String,
    uri: String,
    id: NsId,
}

/// Event reader for one inbound message.
pub struct XmlReader {
    reader: Reader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    bindings: Vec<NsBinding>,
    depth: usize,
    lookup: Box<dyn Fn(&str) -> NsId + Send>,
    /// Pending scope pop for an Empty element.
    pop_after_empty: bool,
}

impl XmlReader {
    /// Create a reader over one complete message. A prolog is
    /// synthesized when the peer omitted the XML declaration so the
    /// underlying parser starts in the expected state.
    pub fn new(input: Vec<u8>, lookup: impl Fn(&str) -> NsId + Send + 'static) -> Self {
        let mut doc = input;
        let trimmed_start = doc.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(0);
        if !doc[trimmed_start..].starts_with(b"<?xml") {
            let mut with_prolog =
                Vec::with_capacity(doc.len() + 40);
            with_prolog.extend_from_slice(b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
            with_prolog.extend_from_slice(&doc);
            doc = with_prolog;
        }
        let mut reader = Reader::from_reader(Cursor::new(doc));
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            bindings: Vec::new(),
            depth: 0,
            lookup: Box::new(lookup),
            pop_after_empty: false,
        }
    }

    /// Pull the next typed event.
    pub fn next_event(&mut self) -> Result<XmlEvent, XmlError> {
        if self.pop_after_empty {
            self.pop_after_empty = false;
            self.pop_scope();
            self.depth -= 1;
        }
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| XmlError::Malformed(e.to_string()))?;
            match event {
                Event::Start(e) => {
                    let e = e.into_owned();
                    self.depth += 1;
                    return self.element_event(&e, false);
                }
                Event::Empty(e) => {
                    let e = e.into_owned();
                    self.depth += 1;
                    // scope stays pushed until the caller has consumed
                    // the event, so select/key attrs resolve correctly
                    let ev = self.element_event(&e, true)?;
                    self.pop_after_empty = true;
                    return Ok(ev);
                }
                Event::End(e) => {
                    let raw = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let (prefix, local) = split_qname(&raw);
                    let ns = self.resolve_element(prefix);
                    self.pop_scope();
                    self.depth = self.depth.saturating_sub(1);
                    return Ok(XmlEvent::End { ns, name: local.to_string() });
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| XmlError::Malformed(e.to_string()))?
                        .into_owned();
                    if text.is_empty() {
                        continue;
                    }
                    return Ok(XmlEvent::Text(text));
                }
                Event::CData(t) => {
                    return Ok(XmlEvent::Text(String::from_utf8_lossy(t.as_ref()).into_owned()));
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::Eof => return Ok(XmlEvent::Eof),
            }
        }
    }

    /// Discard events until the subtree opened by the last Start event
    /// is closed. Used by error-recovery paths.
    pub fn skip_subtree(&mut self) -> Result<(), XmlError> {
        let target = self.depth.saturating_sub(1);
        loop {
            match self.next_event()? {
                XmlEvent::Eof => return Err(XmlError::UnexpectedEof),
                XmlEvent::End { .. } if self.depth == target => return Ok(()),
                _ => {}
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn element_event(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<XmlEvent, XmlError> {
        // first pass: namespace declarations open this element's scope
        for attr in e.attributes() {
            let attr = attr.map_err(|err| XmlError::Attr(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Attr(err.to_string()))?
                .into_owned();
            let prefix = if key == "xmlns" {
                Some(String::new())
            } else {
                key.strip_prefix("xmlns:").map(str::to_string)
            };
            if let Some(prefix) = prefix {
                let id = (self.lookup)(&value);
                self.bindings.push(NsBinding { depth: self.depth, prefix, uri: value, id });
            }
        }

        let raw = String::from_utf8_lossy(e.name().as_ref()).to_string();
        let (prefix, local) = split_qname(&raw);
        let ns = self.resolve_element(prefix);

        // second pass: real attributes
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| XmlError::Attr(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Attr(err.to_string()))?
                .into_owned();
            let (aprefix, alocal) = split_qname(&key);
            // unprefixed attributes carry no namespace
            let ans = match aprefix {
                Some(p) => self.resolve_prefix(p).unwrap_or(NsId::INVALID),
                None => NsId::NONE,
            };
            let xpath = if alocal == "select" || alocal == "key" {
                Some(self.compile_xpath(&value))
            } else {
                None
            };
            attrs.push(XmlAttr {
                ns: ans,
                name: alocal.to_string(),
                prefix_len: aprefix.map_or(0, str::len),
                value,
                xpath,
            });
        }

        let name = local.to_string();
        Ok(if empty {
            XmlEvent::Empty { ns, name, attrs }
        } else {
            XmlEvent::Start { ns, name, attrs }
        })
    }

    fn compile_xpath(&self, expr: &str) -> Result<XPathProgram, XPathError> {
        let resolve = |prefix: &str| -> Option<NsId> {
            self.bindings
                .iter()
                .rev()
                .find(|b| b.prefix == prefix)
                .map(|b| b.id)
        };
        XPathProgram::compile(expr, &resolve)
    }

    fn resolve_element(&self, prefix: Option<&str>) -> NsId {
        match prefix {
            Some(p) => self.resolve_prefix(p).unwrap_or(NsId::INVALID),
            // default namespace applies to unprefixed elements
            None => self
                .bindings
                .iter()
                .rev()
                .find(|b| b.prefix.is_empty())
                .map(|b| b.id)
                .unwrap_or(NsId::NONE),
        }
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<NsId> {
        self.bindings.iter().rev().find(|b| b.prefix == prefix).map(|b| b.id)
    }

    fn pop_scope(&mut self) {
        let depth = self.depth;
        self.bindings.retain(|b| b.depth < depth);
    }

    /// URI bound to a prefix in the current scope, for error reports.
    pub fn uri_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.bindings.iter().rev().find(|b| b.prefix == prefix).map(|b| b.uri.as_str())
    }
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw),
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
