//! Selector engines: carving documents into extraction contexts
//!
//! The parse stage is agnostic to document shape; this module hides the
//! three parser kinds behind a small set of operations:
//!
//! - `prepare` turns a fetched payload into a document item, unwrapping
//!   a `json_key` path first when the source declares one
//! - `extract_items` applies a template selector (or `js_regex`) to a
//!   document, yielding repeated record contexts
//! - `select_within` narrows one context through an attr selector into
//!   materialized elements ready for transform pipelines

use crate::model::{EngineKind, Source};
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Extraction-time errors. Recovered locally: the offending document or
/// item is logged and skipped, processing continues.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid payload from {url}: {message}")]
    Payload { url: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transform '{function}' failed: {message}")]
    Transform { function: String, message: String },
}

/// A materialized element: the engine-neutral snapshot transforms see
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Text content, trimmed
    pub text: String,

    /// Element attributes; URL-carrying ones (`href`, `src`, `action`)
    /// are resolved against the document URL
    pub attrs: BTreeMap<String, String>,

    /// Raw form: outer HTML, JSON source, or the text itself
    pub raw: String,
}

impl ElementData {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            text,
            attrs: BTreeMap::new(),
        }
    }
}

/// One extraction context flowing between template and attr selection
#[derive(Debug, Clone)]
pub enum Item {
    /// An HTML fragment, kept as its outer markup
    Html(String),
    Json(serde_json::Value),
    Text(String),
}

/// A selector compiled once per template at phase start
#[derive(Debug, Clone)]
pub enum CompiledSelector {
    /// CSS selector (html kind)
    Css(Selector),
    /// Dotted path (json kind and js-regex items)
    Path(Vec<String>),
    /// Separator split (text kind)
    Split(String),
}

/// Compiles a selector for the given parser kind; failures are fatal
/// configuration errors naming the template.
pub fn compile_selector(
    kind: EngineKind,
    raw: &str,
    template: &str,
) -> Result<CompiledSelector, ConfigError> {
    match kind {
        EngineKind::Html => Selector::parse(raw).map(CompiledSelector::Css).map_err(|e| {
            ConfigError::InvalidSelector {
                template: template.to_string(),
                selector: raw.to_string(),
                message: e.to_string(),
            }
        }),
        EngineKind::Json => Ok(CompiledSelector::Path(
            raw.split('.').map(str::to_string).collect(),
        )),
        EngineKind::Text => Ok(CompiledSelector::Split(raw.to_string())),
    }
}

/// Turns a fetched payload into a whole-document item, applying the
/// source's `json_key` unwrapping first.
pub fn prepare(
    kind: EngineKind,
    source: &Source,
    doc_url: &str,
    body: &str,
) -> Result<Item, ExtractError> {
    if source.json_key.is_empty() {
        return Ok(match kind {
            EngineKind::Html => Item::Html(body.to_string()),
            EngineKind::Json => Item::Json(serde_json::from_str(body)?),
            EngineKind::Text => Item::Text(body.to_string()),
        });
    }

    let json: serde_json::Value = serde_json::from_str(body)?;
    let unwrapped = walk_path(&json, &source.json_key).ok_or_else(|| ExtractError::Payload {
        url: doc_url.to_string(),
        message: format!("json-key '{}' not found", source.json_key.join(".")),
    })?;

    match kind {
        EngineKind::Json => Ok(Item::Json(unwrapped.clone())),
        EngineKind::Html | EngineKind::Text => {
            let payload = unwrapped.as_str().ok_or_else(|| ExtractError::Payload {
                url: doc_url.to_string(),
                message: format!(
                    "json-key '{}' does not hold a string payload",
                    source.json_key.join(".")
                ),
            })?;
            Ok(match kind {
                EngineKind::Html => Item::Html(payload.to_string()),
                _ => Item::Text(payload.to_string()),
            })
        }
    }
}

/// Applies a template's selector (or js-regex mode) to a document,
/// producing its extraction contexts.
pub fn extract_items(
    document: &Item,
    selector: Option<&CompiledSelector>,
    js_regex: Option<&Regex>,
) -> Vec<Item> {
    if let Some(regex) = js_regex {
        return extract_script_json(document, regex);
    }

    match (document, selector) {
        (Item::Html(markup), Some(CompiledSelector::Css(sel))) => {
            let doc = Html::parse_document(markup);
            doc.select(sel).map(|el| Item::Html(el.html())).collect()
        }
        (Item::Json(value), Some(CompiledSelector::Path(path))) => {
            select_path(value, path).into_iter().map(Item::Json).collect()
        }
        (Item::Json(value), None) => match value {
            serde_json::Value::Array(items) => {
                items.iter().cloned().map(Item::Json).collect()
            }
            other => vec![Item::Json(other.clone())],
        },
        (Item::Text(text), Some(CompiledSelector::Split(sep))) => text
            .split(sep.as_str())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Item::Text(part.to_string()))
            .collect(),
        (item, None) => vec![item.clone()],
        (item, Some(_)) => {
            tracing::debug!("selector kind does not match document kind, using whole document");
            vec![item.clone()]
        }
    }
}

/// Script-embedded-JSON extraction: scan script-bearing nodes for the
/// first regex match each and JSON-decode it. Decoded arrays contribute
/// one item per element.
fn extract_script_json(document: &Item, regex: &Regex) -> Vec<Item> {
    let markup = match document {
        Item::Html(markup) => markup,
        _ => {
            tracing::debug!("js-regex extraction requires an html document");
            return Vec::new();
        }
    };

    let doc = Html::parse_document(markup);
    let Ok(script_sel) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for script in doc.select(&script_sel) {
        let content: String = script.text().collect();
        let Some(captures) = regex.captures(&content) else {
            continue;
        };
        let matched = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str())
            .unwrap_or_default();

        match serde_json::from_str::<serde_json::Value>(matched) {
            Ok(serde_json::Value::Array(elements)) => {
                items.extend(elements.into_iter().map(Item::Json));
            }
            Ok(value) => items.push(Item::Json(value)),
            Err(e) => {
                tracing::debug!("script match is not valid JSON: {}", e);
            }
        }
    }
    items
}

/// Narrows one item through an attr selector into materialized elements.
///
/// `base_url` resolves relative URLs found in element attributes.
pub fn select_within(
    item: &Item,
    selector: Option<&CompiledSelector>,
    base_url: Option<&Url>,
) -> Vec<ElementData> {
    match (item, selector) {
        (Item::Html(markup), Some(CompiledSelector::Css(sel))) => {
            let fragment = Html::parse_fragment(markup);
            fragment
                .select(sel)
                .map(|el| materialize(el, base_url))
                .collect()
        }
        (Item::Html(markup), None) => {
            let fragment = Html::parse_fragment(markup);
            vec![materialize(fragment.root_element(), base_url)]
        }
        (Item::Json(value), Some(CompiledSelector::Path(path))) => select_path(value, path)
            .iter()
            .map(json_element)
            .collect(),
        (Item::Json(value), None) => vec![json_element(value)],
        (Item::Text(text), Some(CompiledSelector::Split(sep))) => text
            .split(sep.as_str())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ElementData::from_text)
            .collect(),
        (Item::Text(text), None) => vec![ElementData::from_text(text.trim())],
        (item, Some(_)) => {
            tracing::debug!("selector kind does not match item kind, using whole item");
            select_within(item, None, base_url)
        }
    }
}

/// Attributes whose values are URLs and get resolved against the
/// document URL
const URL_ATTRS: [&str; 3] = ["href", "src", "action"];

fn materialize(el: ElementRef<'_>, base_url: Option<&Url>) -> ElementData {
    let text = el.text().collect::<String>().trim().to_string();
    let mut attrs = BTreeMap::new();
    for (name, value) in el.value().attrs() {
        let value = if URL_ATTRS.contains(&name) {
            resolve(base_url, value)
        } else {
            value.to_string()
        };
        attrs.insert(name.to_string(), value);
    }
    ElementData {
        text,
        attrs,
        raw: el.html(),
    }
}

fn json_element(value: &serde_json::Value) -> ElementData {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    let mut attrs = BTreeMap::new();
    if let serde_json::Value::Object(entries) = value {
        for (key, entry) in entries {
            let rendered = match entry {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(_) | serde_json::Value::Object(_) => continue,
                other => other.to_string(),
            };
            attrs.insert(key.clone(), rendered);
        }
    }
    ElementData {
        text,
        attrs,
        raw: value.to_string(),
    }
}

/// Walks a dotted path through nested objects, returning the single
/// value it points at.
pub fn walk_path<'a>(
    value: &'a serde_json::Value,
    path: &[String],
) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Path selection over JSON: objects are keyed, arrays are indexed by
/// numeric segments or mapped over by named ones. A trailing array
/// expands into its elements.
pub fn select_path(value: &serde_json::Value, path: &[String]) -> Vec<serde_json::Value> {
    let mut current = vec![value.clone()];
    for segment in path {
        let mut next = Vec::new();
        for value in current {
            match value {
                serde_json::Value::Object(map) => {
                    if let Some(found) = map.get(segment.as_str()) {
                        next.push(found.clone());
                    }
                }
                serde_json::Value::Array(items) => {
                    if let Ok(index) = segment.parse::<usize>() {
                        if let Some(found) = items.get(index) {
                            next.push(found.clone());
                        }
                    } else {
                        for item in items {
                            if let Some(found) = item.get(segment.as_str()) {
                                next.push(found.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }

    if current.len() == 1 {
        if let serde_json::Value::Array(items) = &current[0] {
            return items.clone();
        }
    }
    current
}

/// Resolves a possibly-relative URL against a base; unresolvable inputs
/// pass through unchanged.
pub fn absolutize(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

fn resolve(base_url: Option<&Url>, href: &str) -> String {
    match base_url.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}
