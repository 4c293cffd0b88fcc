//! Transform function registry and the pipeline interpreter
//!
//! An attr's pipeline is functional composition: stage i's output is
//! stage i+1's input, each stage paired with its own keyword-argument
//! bundle. The first stage usually consumes selected elements; later
//! stages refine values. Unknown function names are configuration
//! errors caught at phase start, not swallowed at call time.

use crate::crawler::engine::ElementData;
use crate::crawler::ExtractError;
use crate::model::{Kwargs, TransformCall, Value};
use crate::ConfigError;
use std::collections::{BTreeMap, HashMap};

/// What flows between pipeline stages
#[derive(Debug, Clone)]
pub enum PipeValue {
    /// Elements selected by the attr's selector, before any transform
    Elements(Vec<ElementData>),
    Value(Value),
}

impl PipeValue {
    /// Final conversion: untouched elements default to their text
    /// content, a single element collapsing to a scalar.
    pub fn into_value(self) -> Value {
        match self {
            PipeValue::Elements(elements) => Value::collapse(
                elements
                    .into_iter()
                    .map(|e| e.text)
                    .filter(|t| !t.is_empty())
                    .map(Value::Text)
                    .collect(),
            ),
            PipeValue::Value(value) => value,
        }
    }
}

/// A registered transform function
pub type TransformFn = fn(PipeValue, &Kwargs) -> Result<PipeValue, ExtractError>;

/// Registry mapping function names to implementations, resolved once
/// per template at phase start
pub struct TransformRegistry {
    funcs: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            funcs: HashMap::new(),
        };
        registry.register("text", text);
        registry.register("attribute", attribute);
        registry.register("links", links);
        registry.register("raw", raw);
        registry.register("strip", strip);
        registry.register("replace", replace);
        registry.register("regex", regex_extract);
        registry.register("numbers", numbers);
        registry.register("first", first);
        registry.register("index", index);
        registry.register("join", join);
        registry.register("exists", exists);
        registry.register("date", date);
        registry.register("table", table);
        registry
    }

    /// Adds or overrides a function; lets the embedding application
    /// extend the vocabulary.
    pub fn register(&mut self, name: &str, func: TransformFn) {
        self.funcs.insert(name.to_string(), func);
    }

    pub fn resolve(&self, template: &str, call: &TransformCall) -> Result<TransformFn, ConfigError> {
        self.funcs
            .get(&call.func)
            .copied()
            .ok_or_else(|| ConfigError::UnknownTransform {
                template: template.to_string(),
                function: call.func.clone(),
            })
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Runs a compiled pipeline over the selected elements.
pub fn run_pipeline(
    seed: PipeValue,
    stages: &[(TransformFn, Kwargs)],
) -> Result<Value, ExtractError> {
    let mut current = seed;
    for (func, kwargs) in stages {
        current = func(current, kwargs)?;
    }
    Ok(current.into_value())
}

// ---- kwarg helpers ----

fn kw_str<'a>(kwargs: &'a Kwargs, key: &str) -> Option<&'a str> {
    kwargs.get(key).and_then(Value::as_text)
}

fn kw_int(kwargs: &Kwargs, key: &str) -> Option<i64> {
    match kwargs.get(key) {
        Some(Value::Int(n)) => Some(*n),
        _ => None,
    }
}

fn require_elements(input: PipeValue, function: &str) -> Result<Vec<ElementData>, ExtractError> {
    match input {
        PipeValue::Elements(elements) => Ok(elements),
        PipeValue::Value(_) => Err(ExtractError::Transform {
            function: function.to_string(),
            message: "expects selected elements as input".to_string(),
        }),
    }
}

/// Applies a string function over every text member, preserving shape.
fn map_texts(input: PipeValue, f: impl Fn(&str) -> Option<Value>) -> Value {
    let value = input.into_value();
    let mapped: Vec<Value> = value
        .members()
        .into_iter()
        .filter_map(|member| match member {
            Value::Text(s) => f(s),
            other => Some(other.clone()),
        })
        .collect();
    Value::collapse(mapped)
}

// ---- element transforms ----

/// Text content of each selected element.
fn text(input: PipeValue, _kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let elements = require_elements(input, "text")?;
    Ok(PipeValue::Value(Value::collapse(
        elements
            .into_iter()
            .map(|e| e.text)
            .filter(|t| !t.is_empty())
            .map(Value::Text)
            .collect(),
    )))
}

/// A named attribute of each selected element. kwargs: `name`.
fn attribute(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let name = kw_str(kwargs, "name").ok_or_else(|| ExtractError::Transform {
        function: "attribute".to_string(),
        message: "missing 'name' kwarg".to_string(),
    })?;
    let elements = require_elements(input, "attribute")?;
    Ok(PipeValue::Value(Value::collapse(
        elements
            .into_iter()
            .filter_map(|mut e| e.attrs.remove(name))
            .map(Value::Text)
            .collect(),
    )))
}

/// `href` of each selected element, resolved against the document URL.
fn links(input: PipeValue, _kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let mut kwargs = Kwargs::new();
    kwargs.insert("name".to_string(), Value::Text("href".to_string()));
    attribute(input, &kwargs)
}

/// Raw form of each selected element (outer HTML / JSON source).
fn raw(input: PipeValue, _kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let elements = require_elements(input, "raw")?;
    Ok(PipeValue::Value(Value::collapse(
        elements.into_iter().map(|e| Value::Text(e.raw)).collect(),
    )))
}

// ---- value transforms ----

/// Trims whitespace, or the characters given in `chars`.
fn strip(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let chars: Vec<char> = kw_str(kwargs, "chars")
        .map(|s| s.chars().collect())
        .unwrap_or_default();
    Ok(PipeValue::Value(map_texts(input, |s| {
        let trimmed = if chars.is_empty() {
            s.trim()
        } else {
            s.trim_matches(|c| chars.contains(&c))
        };
        Some(Value::Text(trimmed.to_string()))
    })))
}

/// Regex substitution. kwargs: `pattern`, `with` (default empty).
fn replace(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let pattern = kw_str(kwargs, "pattern").ok_or_else(|| ExtractError::Transform {
        function: "replace".to_string(),
        message: "missing 'pattern' kwarg".to_string(),
    })?;
    let substitute = kw_str(kwargs, "with").unwrap_or("");
    let regex = regex::Regex::new(pattern).map_err(|e| ExtractError::Transform {
        function: "replace".to_string(),
        message: e.to_string(),
    })?;
    Ok(PipeValue::Value(map_texts(input, |s| {
        Some(Value::Text(regex.replace_all(s, substitute).into_owned()))
    })))
}

/// Regex extraction; capture group 1 when present, the whole match
/// otherwise. kwargs: `pattern`.
fn regex_extract(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let pattern = kw_str(kwargs, "pattern").ok_or_else(|| ExtractError::Transform {
        function: "regex".to_string(),
        message: "missing 'pattern' kwarg".to_string(),
    })?;
    let regex = regex::Regex::new(pattern).map_err(|e| ExtractError::Transform {
        function: "regex".to_string(),
        message: e.to_string(),
    })?;

    let value = input.into_value();
    let mut found = Vec::new();
    for member in value.members() {
        if let Value::Text(s) = member {
            for captures in regex.captures_iter(s) {
                let matched = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                found.push(Value::Text(matched));
            }
        }
    }
    Ok(PipeValue::Value(Value::collapse(found)))
}

/// Concatenated digits of each text as an integer.
fn numbers(input: PipeValue, _kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    Ok(PipeValue::Value(map_texts(input, |s| {
        let digits: String = s.chars().filter(char::is_ascii_digit).collect();
        digits.parse::<i64>().ok().map(Value::Int)
    })))
}

/// First member of a list value.
fn first(input: PipeValue, _kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let value = input.into_value();
    let member = value.members().first().cloned().cloned();
    Ok(PipeValue::Value(member.unwrap_or(Value::Null)))
}

/// The i-th member of a list value. kwargs: `i`.
fn index(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let i = kw_int(kwargs, "i").unwrap_or(0).max(0) as usize;
    let value = input.into_value();
    let member = value.members().get(i).cloned().cloned();
    Ok(PipeValue::Value(member.unwrap_or(Value::Null)))
}

/// Joins list members into one string. kwargs: `sep` (default space).
fn join(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let sep = kw_str(kwargs, "sep").unwrap_or(" ");
    let value = input.into_value();
    let parts: Vec<String> = value
        .members()
        .into_iter()
        .filter_map(|m| m.render())
        .collect();
    Ok(PipeValue::Value(Value::Text(parts.join(sep))))
}

/// True when any text member contains the needle. kwargs: `needle`.
fn exists(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let needle = kw_str(kwargs, "needle").ok_or_else(|| ExtractError::Transform {
        function: "exists".to_string(),
        message: "missing 'needle' kwarg".to_string(),
    })?;
    let value = input.into_value();
    let found = value
        .members()
        .iter()
        .any(|m| matches!(m, Value::Text(s) if s.contains(needle)));
    Ok(PipeValue::Value(Value::Bool(found)))
}

/// Parses each text with a chrono format string and renders ISO 8601.
/// kwargs: `format`.
fn date(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let format = kw_str(kwargs, "format").ok_or_else(|| ExtractError::Transform {
        function: "date".to_string(),
        message: "missing 'format' kwarg".to_string(),
    })?;
    Ok(PipeValue::Value(map_texts(input, |s| {
        let s = s.trim();
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, format) {
            return Some(Value::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
        chrono::NaiveDate::parse_from_str(s, format)
            .ok()
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
    })))
}

/// Folds an n-column cell sequence into a key/value map.
/// kwargs: `columns` (default 2), `offset` (default 0).
fn table(input: PipeValue, kwargs: &Kwargs) -> Result<PipeValue, ExtractError> {
    let columns = kw_int(kwargs, "columns").unwrap_or(2).max(2) as usize;
    let offset = kw_int(kwargs, "offset").unwrap_or(0).max(0) as usize;

    let elements = require_elements(input, "table")?;
    let cells: Vec<String> = elements.into_iter().skip(offset).map(|e| e.text).collect();

    let mut entries = BTreeMap::new();
    for row in cells.chunks(columns) {
        if let [key, value, ..] = row {
            if !key.is_empty() {
                entries.insert(key.clone(), Value::Text(value.clone()));
            }
        }
    }
    Ok(PipeValue::Value(Value::Map(entries)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(texts: &[&str]) -> PipeValue {
        PipeValue::Elements(texts.iter().map(|t| ElementData::from_text(*t)).collect())
    }

    fn kwargs(pairs: &[(&str, Value)]) -> Kwargs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_three_stage_composition() {
        // h(g(f(elements), k=1)) with f=text, g=index(i=1), h=numbers
        let registry = TransformRegistry::with_builtins();
        let stages: Vec<(TransformFn, Kwargs)> = vec![
            (
                registry
                    .resolve("t", &TransformCall::new("text"))
                    .unwrap(),
                Kwargs::new(),
            ),
            (
                registry
                    .resolve("t", &TransformCall::new("index"))
                    .unwrap(),
                kwargs(&[("i", Value::Int(1))]),
            ),
            (
                registry
                    .resolve("t", &TransformCall::new("numbers"))
                    .unwrap(),
                Kwargs::new(),
            ),
        ];

        let result = run_pipeline(elements(&["€ 10", "€ 25"]), &stages).unwrap();
        assert_eq!(result, Value::Int(25));
    }

    #[test]
    fn test_unknown_function_is_config_error() {
        let registry = TransformRegistry::with_builtins();
        let result = registry.resolve("items", &TransformCall::new("frobnicate"));
        match result {
            Err(ConfigError::UnknownTransform { template, function }) => {
                assert_eq!(template, "items");
                assert_eq!(function, "frobnicate");
            }
            other => panic!("expected UnknownTransform, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_pipeline_defaults_to_text() {
        let result = run_pipeline(elements(&["Title"]), &[]).unwrap();
        assert_eq!(result, Value::Text("Title".into()));

        let result = run_pipeline(elements(&["a", "b"]), &[]).unwrap();
        assert_eq!(
            result,
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())])
        );
    }

    #[test]
    fn test_attribute_transform() {
        let mut el = ElementData::from_text("link");
        el.attrs.insert("href".into(), "https://e.com/x".into());

        let func: TransformFn = attribute;
        let out = func(
            PipeValue::Elements(vec![el]),
            &kwargs(&[("name", Value::Text("href".into()))]),
        )
        .unwrap();
        assert_eq!(out.into_value(), Value::Text("https://e.com/x".into()));
    }

    #[test]
    fn test_replace_and_strip() {
        let stages: Vec<(TransformFn, Kwargs)> = vec![
            (text, Kwargs::new()),
            (
                replace,
                kwargs(&[
                    ("pattern", Value::Text(r"[€$]".into())),
                    ("with", Value::Text("".into())),
                ]),
            ),
            (strip, Kwargs::new()),
        ];
        let result = run_pipeline(elements(&["€ 10"]), &stages).unwrap();
        assert_eq!(result, Value::Text("10".into()));
    }

    #[test]
    fn test_regex_prefers_capture_group() {
        let out = regex_extract(
            PipeValue::Value(Value::Text("id=42;".into())),
            &kwargs(&[("pattern", Value::Text(r"id=(\d+)".into()))]),
        )
        .unwrap();
        assert_eq!(out.into_value(), Value::Text("42".into()));
    }

    #[test]
    fn test_numbers_ignores_textless_entries() {
        let out = numbers(
            PipeValue::Value(Value::List(vec![
                Value::Text("12 items".into()),
                Value::Text("none".into()),
            ])),
            &Kwargs::new(),
        )
        .unwrap();
        assert_eq!(out.into_value(), Value::Int(12));
    }

    #[test]
    fn test_exists() {
        let out = exists(
            elements(&["in stock", "sold out"]),
            &kwargs(&[("needle", Value::Text("stock".into()))]),
        )
        .unwrap();
        assert_eq!(out.into_value(), Value::Bool(true));
    }

    #[test]
    fn test_date_parses_and_normalizes() {
        let out = date(
            PipeValue::Value(Value::Text("03/01/2026".into())),
            &kwargs(&[("format", Value::Text("%d/%m/%Y".into()))]),
        )
        .unwrap();
        assert_eq!(out.into_value(), Value::Text("2026-01-03".into()));
    }

    #[test]
    fn test_table_folds_cells() {
        let out = table(
            elements(&["Brand", "Acme", "Color", "Red"]),
            &Kwargs::new(),
        )
        .unwrap();
        match out.into_value() {
            Value::Map(entries) => {
                assert_eq!(entries["Brand"], Value::Text("Acme".into()));
                assert_eq!(entries["Color"], Value::Text("Red".into()));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_value_transform_on_elements_auto_converts() {
        // strip accepts raw elements by falling back to their text
        let out = strip(elements(&[" padded "]), &Kwargs::new()).unwrap();
        assert_eq!(out.into_value(), Value::Text("padded".into()));
    }

    #[test]
    fn test_element_transform_rejects_value_input() {
        let result = text(PipeValue::Value(Value::Int(1)), &Kwargs::new());
        assert!(matches!(result, Err(ExtractError::Transform { .. })));
    }
}
