//! Raw TOML shapes for scrape model files
//!
//! These mirror the file format one-to-one; semantic checks and the
//! conversion into the validated record model live in `validation`.
//! Unknown keys anywhere in the file are rejected outright.

use serde::Deserialize;
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_retries() -> u32 {
    3
}

/// Top level of a model file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    pub name: String,

    /// Base URL relative source and discovered URLs resolve against
    pub domain: String,

    #[serde(rename = "num-workers", default = "default_workers")]
    pub num_workers: usize,

    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    #[serde(rename = "phase", default)]
    pub phases: Vec<PhaseFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseFile {
    pub name: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub repeat: u32,

    #[serde(default)]
    pub synchronize: bool,

    /// Parser kind: "html", "json" or "text"; omitted reuses the
    /// previous phase's
    #[serde(default)]
    pub parser: Option<String>,

    /// Named fetcher implementation
    #[serde(default)]
    pub fetcher: Option<String>,

    #[serde(rename = "source", default)]
    pub sources: Vec<SourceFile>,

    #[serde(rename = "template", default)]
    pub templates: Vec<TemplateFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFile {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub params: BTreeMap<String, String>,

    #[serde(default)]
    pub body: BTreeMap<String, String>,

    /// Literal attrs carried onto every record this source produces
    #[serde(default)]
    pub attrs: BTreeMap<String, toml::Value>,

    #[serde(default = "default_true")]
    pub parse: bool,

    #[serde(rename = "src-template", default)]
    pub src_template: String,

    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Dotted path, e.g. "payload.html"
    #[serde(rename = "json-key", default)]
    pub json_key: Option<String>,

    #[serde(default)]
    pub duplicate: bool,

    /// "*" for all, a single attr name, or a list of names
    #[serde(rename = "copy-attrs", default)]
    pub copy_attrs: Option<toml::Value>,

    #[serde(rename = "attr-condition", default)]
    pub attr_condition: Option<String>,

    #[serde(default)]
    pub parent: bool,

    #[serde(rename = "from-db", default)]
    pub from_db: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateFile {
    pub name: String,

    #[serde(default)]
    pub selector: Option<String>,

    #[serde(rename = "js-regex", default)]
    pub js_regex: Option<String>,

    /// Sink kind ("sqlite" or "memory"); requires `collection`
    #[serde(default)]
    pub store: Option<String>,

    #[serde(default)]
    pub collection: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub preview: bool,

    #[serde(default)]
    pub partial: bool,

    #[serde(rename = "attr", default)]
    pub attrs: Vec<AttrFile>,

    #[serde(default)]
    pub source: Option<SourceFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrFile {
    pub name: String,

    #[serde(default)]
    pub selector: Option<String>,

    /// One function name or a pipeline of them
    #[serde(default)]
    pub func: Option<FuncList>,

    /// Keyword-argument bundles, one per pipeline stage; a single
    /// bundle applies to the first stage
    #[serde(default)]
    pub kws: Option<KwargsList>,

    #[serde(rename = "type", default)]
    pub value_type: Option<String>,

    #[serde(rename = "attr-condition", default)]
    pub attr_condition: Option<String>,

    #[serde(rename = "source-condition", default)]
    pub source_condition: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub source: Option<SourceFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FuncList {
    One(String),
    Many(Vec<String>),
}

impl FuncList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            FuncList::One(name) => vec![name],
            FuncList::Many(names) => names,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KwargsList {
    One(BTreeMap<String, toml::Value>),
    Many(Vec<BTreeMap<String, toml::Value>>),
}

impl KwargsList {
    pub fn into_vec(self) -> Vec<BTreeMap<String, toml::Value>> {
        match self {
            KwargsList::One(bundle) => vec![bundle],
            KwargsList::Many(bundles) => bundles,
        }
    }
}
