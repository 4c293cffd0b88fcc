//! Template: a record schema bound to a storage target
//!
//! A template describes how to carve a fetched document into zero or
//! more records, and where finished records go.

use crate::model::{Attr, RecordAttr, Source, Value};
use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Storage backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Sqlite,
    Memory,
}

impl SinkKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Fully-specified storage target: backend kind plus collection name.
///
/// The type makes the sink identity all-or-nothing; a kind without a
/// collection (or the reverse) is rejected at model load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    pub kind: SinkKind,
    pub collection: String,
}

/// A record schema
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,

    /// Selector carving the document into repeated record contexts;
    /// `None` treats the whole document as one context
    pub selector: Option<String>,

    /// Script-embedded-JSON extraction mode: scan script nodes for the
    /// first regex match and JSON-decode it into items
    pub js_regex: Option<String>,

    /// Ordered attribute definitions
    pub attrs: Vec<Attr>,

    /// Record-level source template spawning one request per record
    pub source: Option<Box<Source>>,

    /// Storage target; records without one are extracted but not stored
    pub sink: Option<SinkTarget>,

    /// Literal url attribute, synthesized first when set
    pub url: Option<String>,

    /// Zero records from an entire document resets the phase frontier
    pub required: bool,

    /// Dump assembled records through the diagnostic logger
    pub preview: bool,

    /// Accept records with empty attributes
    pub partial: bool,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: None,
            js_regex: None,
            attrs: Vec::new(),
            source: None,
            sink: None,
            url: None,
            required: false,
            preview: false,
            partial: false,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Vec<Attr>) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_sink(mut self, kind: SinkKind, collection: impl Into<String>) -> Self {
        self.sink = Some(SinkTarget {
            kind,
            collection: collection.into(),
        });
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Checks cross-field invariants that the types alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for attr in &self.attrs {
            if !seen.insert(attr.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "template '{}': duplicate attr '{}'",
                    self.name, attr.name
                )));
            }
        }
        if self.js_regex.is_some() && self.selector.is_some() {
            return Err(ConfigError::Validation(format!(
                "template '{}': selector and js-regex are mutually exclusive",
                self.name
            )));
        }
        Ok(())
    }

    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

/// A finished record assembled by the parse stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Name of the template that produced this record
    pub template: String,

    /// URL of the document the record was extracted from; doubles as
    /// the storage key
    pub url: String,

    /// Ordered attribute values
    pub attrs: Vec<RecordAttr>,
}

impl Record {
    pub fn new(template: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            url: url.into(),
            attrs: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == name) {
            existing.value = value;
        } else {
            self.attrs.push(RecordAttr { name, value });
        }
    }

    pub fn attr_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.iter().map(|a| a.name.as_str())
    }
}
