//! Source: a request descriptor
//!
//! A source describes one thing to fetch and how derived requests inherit
//! from the record that produced them. Sources are value-like: they are
//! cloned, never aliased, as they move between the frontier, the fetch
//! pool and the parse stage, so no stage observes another stage's
//! mutation mid-flight.

use crate::model::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP method a source is fetched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            _ => None,
        }
    }
}

/// Which attributes of the originating record a derived source inherits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyAttrs {
    /// Copy one named attribute
    Single(String),
    /// Copy a named subset
    Subset(Vec<String>),
    /// Copy every attribute
    All,
}

/// One named value carried on a source or assembled into a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAttr {
    pub name: String,
    pub value: Value,
}

impl RecordAttr {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A request descriptor
///
/// Created by phase seeding or by record-driven spawning during parsing;
/// dropped once dequeued and fetched. The `url` is the dedup key.
#[derive(Debug, Clone)]
pub struct Source {
    /// Request URL (resolved against the model domain before enqueue)
    pub url: String,

    /// Inactive sources are forwarded to the next phase instead of fetched
    pub active: bool,

    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub body: BTreeMap<String, String>,

    /// Literal attributes carried along for provenance; they pre-populate
    /// every record extracted from this source's document
    pub attrs: Vec<RecordAttr>,

    /// When false the document is fetched for side effects only and
    /// skipped by the parse stage
    pub parse: bool,

    /// Positional rewrite template applied to discovered URLs; `{}` is
    /// replaced by the extracted value
    pub src_template: String,

    /// Remaining fetch retry budget
    pub retries: u32,

    /// Dotted path unwrapping a JSON payload before document parsing
    pub json_key: Vec<String>,

    /// Bypass frontier deduplication for this source
    pub duplicate: bool,

    /// Attribute inheritance policy for derived sources
    pub copy_attrs: Option<CopyAttrs>,

    /// Name of the attribute whose stored value gates spawning: the
    /// derived source is emitted only when the extracted value differs
    /// from what the sink currently holds for the record
    pub attr_condition: Option<String>,

    /// Link the derived request back to its originating record by URL
    pub parent: bool,

    /// Seed this source from records previously stored under the named
    /// template instead of fetching
    pub from_db: Option<String>,
}

impl Default for Source {
    fn default() -> Self {
        Self {
            url: String::new(),
            active: true,
            method: Method::Get,
            headers: BTreeMap::new(),
            params: BTreeMap::new(),
            body: BTreeMap::new(),
            attrs: Vec::new(),
            parse: true,
            src_template: String::new(),
            retries: 3,
            json_key: Vec::new(),
            duplicate: false,
            copy_attrs: None,
            attr_condition: None,
            parent: false,
            from_db: None,
        }
    }
}

impl Source {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Applies the positional rewrite template to a discovered URL.
    ///
    /// An empty template passes the value through; a template without a
    /// placeholder replaces the value entirely.
    pub fn apply_src_template(&self, value: &str) -> String {
        if self.src_template.is_empty() {
            value.to_string()
        } else {
            self.src_template.replacen("{}", value, 1)
        }
    }

    /// Looks up a carried attribute by name.
    pub fn attr(&self, name: &str) -> Option<&RecordAttr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Adds or replaces a carried attribute.
    pub fn set_attr(&mut self, attr: RecordAttr) {
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == attr.name) {
            existing.value = attr.value;
        } else {
            self.attrs.push(attr);
        }
    }
}
