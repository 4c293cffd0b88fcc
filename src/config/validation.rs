//! Conversion of raw model files into the validated record model
//!
//! Everything that can be wrong with a model file is caught here, once,
//! before the orchestrator sees it: unknown method/parser/sink names,
//! partial sink identities, malformed predicates, pipeline/kwargs
//! mismatches. The parse stage still re-checks selectors and transform
//! names per phase, since embedding applications can construct models
//! directly.

use crate::config::types::{AttrFile, ModelFile, PhaseFile, SourceFile, TemplateFile};
use crate::model::{
    Attr, CopyAttrs, EngineKind, Kwargs, Method, Phase, Predicate, RecordAttr, ScrapeModel,
    SinkKind, SinkTarget, Source, Template, Value, ValueType,
};
use crate::ConfigError;
use url::Url;

/// Builds and validates a scrape model from its raw file form.
pub fn build_model(raw: ModelFile) -> Result<ScrapeModel, ConfigError> {
    Url::parse(&raw.domain)
        .map_err(|e| ConfigError::InvalidUrl(format!("domain '{}': {}", raw.domain, e)))?;

    if raw.phases.is_empty() {
        return Err(ConfigError::Validation(
            "model declares no phases".to_string(),
        ));
    }

    let mut phases = Vec::with_capacity(raw.phases.len());
    for phase in raw.phases {
        phases.push(build_phase(phase)?);
    }

    Ok(ScrapeModel {
        name: raw.name,
        domain: raw.domain,
        num_workers: raw.num_workers.max(1),
        database_path: raw.database_path,
        phases,
    })
}

fn build_phase(raw: PhaseFile) -> Result<Phase, ConfigError> {
    let parser = raw
        .parser
        .as_deref()
        .map(|name| EngineKind::parse(name).ok_or_else(|| ConfigError::UnknownParser(name.into())))
        .transpose()?;

    let sources = raw
        .sources
        .into_iter()
        .map(build_source)
        .collect::<Result<Vec<_>, _>>()?;

    let templates = raw
        .templates
        .into_iter()
        .map(build_template)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Phase {
        name: raw.name,
        active: raw.active,
        n_workers: raw.workers,
        repeat: raw.repeat,
        synchronize: raw.synchronize,
        sources,
        parser,
        fetcher: raw.fetcher,
        templates,
    })
}

fn build_source(raw: SourceFile) -> Result<Source, ConfigError> {
    let method = match raw.method.as_deref() {
        None => Method::Get,
        Some(name) => Method::parse(name).ok_or_else(|| {
            ConfigError::Validation(format!("unknown method '{}' for '{}'", name, raw.url))
        })?,
    };

    let copy_attrs = raw.copy_attrs.map(parse_copy_attrs).transpose()?;

    let attrs = raw
        .attrs
        .into_iter()
        .map(|(name, value)| RecordAttr::new(name, toml_to_value(value)))
        .collect();

    Ok(Source {
        url: raw.url,
        active: raw.active,
        method,
        headers: raw.headers,
        params: raw.params,
        body: raw.body,
        attrs,
        parse: raw.parse,
        src_template: raw.src_template,
        retries: raw.retries,
        json_key: raw
            .json_key
            .map(|key| key.split('.').map(str::to_string).collect())
            .unwrap_or_default(),
        duplicate: raw.duplicate,
        copy_attrs,
        attr_condition: raw.attr_condition,
        parent: raw.parent,
        from_db: raw.from_db,
    })
}

fn parse_copy_attrs(value: toml::Value) -> Result<CopyAttrs, ConfigError> {
    match value {
        toml::Value::String(s) if s == "*" => Ok(CopyAttrs::All),
        toml::Value::String(name) => Ok(CopyAttrs::Single(name)),
        toml::Value::Array(items) => {
            let names = items
                .into_iter()
                .map(|item| match item {
                    toml::Value::String(name) => Ok(name),
                    other => Err(ConfigError::Validation(format!(
                        "copy-attrs entries must be strings, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CopyAttrs::Subset(names))
        }
        other => Err(ConfigError::Validation(format!(
            "copy-attrs must be \"*\", a name, or a list of names, got {}",
            other
        ))),
    }
}

fn build_template(raw: TemplateFile) -> Result<Template, ConfigError> {
    let sink = match (raw.store, raw.collection) {
        (None, None) => None,
        (Some(kind), Some(collection)) => {
            let kind = SinkKind::parse(&kind).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "template '{}': unknown sink kind '{}'",
                    raw.name, kind
                ))
            })?;
            Some(SinkTarget { kind, collection })
        }
        _ => {
            return Err(ConfigError::PartialSinkTarget {
                template: raw.name,
            })
        }
    };

    let attrs = raw
        .attrs
        .into_iter()
        .map(|attr| build_attr(&raw.name, attr))
        .collect::<Result<Vec<_>, _>>()?;

    let source = raw.source.map(build_source).transpose()?.map(Box::new);

    let template = Template {
        name: raw.name,
        selector: raw.selector,
        js_regex: raw.js_regex,
        attrs,
        source,
        sink,
        url: raw.url,
        required: raw.required,
        preview: raw.preview,
        partial: raw.partial,
    };
    template.validate()?;
    Ok(template)
}

fn build_attr(template: &str, raw: AttrFile) -> Result<Attr, ConfigError> {
    let funcs = raw.func.map(|list| list.into_vec()).unwrap_or_default();
    let kwargs: Vec<Kwargs> = raw
        .kws
        .map(|list| {
            list.into_vec()
                .into_iter()
                .map(|bundle| {
                    bundle
                        .into_iter()
                        .map(|(k, v)| (k, toml_to_value(v)))
                        .collect()
                })
                .collect()
        })
        .unwrap_or_default();

    let mut attr = Attr::from_parts(raw.name, raw.selector, funcs, kwargs)?;

    attr.value_type = raw
        .value_type
        .as_deref()
        .map(|name| {
            ValueType::parse(name).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "template '{}', attr '{}': unknown type '{}'",
                    template, attr.name, name
                ))
            })
        })
        .transpose()?;

    attr.attr_condition = raw.attr_condition;

    for (name, value) in raw.source_condition {
        attr.source_condition
            .insert(name, parse_predicate(template, value)?);
    }

    attr.source = raw.source.map(build_source).transpose()?.map(Box::new);

    Ok(attr)
}

/// Parses a predicate table like `{ gt = 5.0 }` or `{ in = ["a"] }`.
fn parse_predicate(template: &str, value: toml::Value) -> Result<Predicate, ConfigError> {
    let toml::Value::Table(table) = value else {
        return Err(ConfigError::Validation(format!(
            "template '{}': predicate must be a table like {{ eq = ... }}",
            template
        )));
    };
    if table.len() != 1 {
        return Err(ConfigError::Validation(format!(
            "template '{}': predicate must have exactly one comparison",
            template
        )));
    }
    let (op, operand) = table.into_iter().next().expect("length checked");

    match op.as_str() {
        "eq" => Ok(Predicate::Eq(toml_to_value(operand))),
        "ne" => Ok(Predicate::Ne(toml_to_value(operand))),
        "gt" => Ok(Predicate::Gt(numeric_operand(template, &op, operand)?)),
        "lt" => Ok(Predicate::Lt(numeric_operand(template, &op, operand)?)),
        "in" => match operand {
            toml::Value::Array(items) => {
                Ok(Predicate::In(items.into_iter().map(toml_to_value).collect()))
            }
            other => Err(ConfigError::Validation(format!(
                "template '{}': 'in' operand must be a list, got {}",
                template, other
            ))),
        },
        other => Err(ConfigError::Validation(format!(
            "template '{}': unknown predicate '{}'",
            template, other
        ))),
    }
}

fn numeric_operand(template: &str, op: &str, value: toml::Value) -> Result<f64, ConfigError> {
    match value {
        toml::Value::Integer(n) => Ok(n as f64),
        toml::Value::Float(n) => Ok(n),
        other => Err(ConfigError::Validation(format!(
            "template '{}': '{}' operand must be numeric, got {}",
            template, op, other
        ))),
    }
}

fn toml_to_value(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Text(s),
        toml::Value::Integer(n) => Value::Int(n),
        toml::Value::Float(n) => Value::Float(n),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::Text(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.into_iter().map(toml_to_value).collect()),
        toml::Value::Table(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, toml_to_value(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw(extra_phase_toml: &str) -> ModelFile {
        let text = format!(
            r#"
name = "shop"
domain = "https://example.com"

[[phase]]
name = "list"
parser = "html"
{}
"#,
            extra_phase_toml
        );
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn test_build_minimal_model() {
        let model = build_model(minimal_raw("")).unwrap();
        assert_eq!(model.name, "shop");
        assert_eq!(model.phases.len(), 1);
        assert_eq!(model.phases[0].parser, Some(EngineKind::Html));
    }

    #[test]
    fn test_invalid_domain_rejected() {
        let mut raw = minimal_raw("");
        raw.domain = "not a url".to_string();
        assert!(matches!(
            build_model(raw),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_no_phases_rejected() {
        let raw: ModelFile = toml::from_str(
            r#"
name = "empty"
domain = "https://example.com"
"#,
        )
        .unwrap();
        assert!(matches!(
            build_model(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_parser_rejected() {
        let raw: ModelFile = toml::from_str(
            r#"
name = "m"
domain = "https://example.com"

[[phase]]
name = "p"
parser = "xml"
"#,
        )
        .unwrap();
        assert!(matches!(
            build_model(raw),
            Err(ConfigError::UnknownParser(_))
        ));
    }

    #[test]
    fn test_partial_sink_identity_rejected() {
        let raw = minimal_raw(
            r#"
[[phase.template]]
name = "item"
store = "memory"
"#,
        );
        assert!(matches!(
            build_model(raw),
            Err(ConfigError::PartialSinkTarget { .. })
        ));
    }

    #[test]
    fn test_copy_attrs_forms() {
        let raw = minimal_raw(
            r#"
[[phase.source]]
url = "/a"
copy-attrs = "*"

[[phase.source]]
url = "/b"
copy-attrs = "price"

[[phase.source]]
url = "/c"
copy-attrs = ["price", "title"]
"#,
        );
        let model = build_model(raw).unwrap();
        let sources = &model.phases[0].sources;
        assert_eq!(sources[0].copy_attrs, Some(CopyAttrs::All));
        assert_eq!(
            sources[1].copy_attrs,
            Some(CopyAttrs::Single("price".into()))
        );
        assert_eq!(
            sources[2].copy_attrs,
            Some(CopyAttrs::Subset(vec!["price".into(), "title".into()]))
        );
    }

    #[test]
    fn test_attr_pipeline_and_predicates() {
        let raw = minimal_raw(
            r#"
[[phase.template]]
name = "item"
selector = "li"

[[phase.template.attr]]
name = "price"
selector = "span"
func = ["text", "numbers"]
kws = [{}]

[phase.template.attr.source-condition]
price = { gt = 5 }
"#,
        );
        let model = build_model(raw).unwrap();
        let attr = &model.phases[0].templates[0].attrs[0];
        assert_eq!(attr.pipeline.len(), 2);
        assert!(attr.pipeline[1].kwargs.is_empty());
        assert_eq!(
            attr.source_condition.get("price"),
            Some(&Predicate::Gt(5.0))
        );
    }

    #[test]
    fn test_unknown_predicate_rejected() {
        let raw = minimal_raw(
            r#"
[[phase.template]]
name = "item"

[[phase.template.attr]]
name = "price"

[phase.template.attr.source-condition]
price = { matches = "x" }
"#,
        );
        assert!(matches!(
            build_model(raw),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_json_key_split() {
        let raw = minimal_raw(
            r#"
[[phase.source]]
url = "/api"
json-key = "payload.html"
"#,
        );
        let model = build_model(raw).unwrap();
        assert_eq!(
            model.phases[0].sources[0].json_key,
            vec!["payload".to_string(), "html".to_string()]
        );
    }
}
