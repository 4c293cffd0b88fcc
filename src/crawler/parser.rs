//! Parse stage: template-driven record assembly and source spawning
//!
//! Consumes fetched documents and, for every configured template,
//! resolves selectors, runs attribute pipelines, assembles records, and
//! evaluates the spawning rules that derive new sources from extracted
//! values.
//!
//! Selector compilation and transform resolution happen once, in
//! [`ParseStage::new`], so unknown functions and malformed selectors
//! fail the phase before any fetch is issued. The stage runs in a
//! single consumer task, which also serializes the sink reads behind
//! `attr_condition` change detection per record key.

use crate::crawler::engine::{self, CompiledSelector, Item};
use crate::crawler::fetcher::FetchedDocument;
use crate::crawler::transforms::{run_pipeline, PipeValue, TransformFn, TransformRegistry};
use crate::model::{
    Attr, CopyAttrs, EngineKind, Kwargs, Method, Record, RecordAttr, Source, Template, Value,
};
use crate::storage::SinkRegistry;
use crate::ConfigError;
use regex::Regex;
use std::sync::Arc;
use url::Url;

/// An attr with its selector compiled and pipeline resolved
struct CompiledAttr {
    attr: Attr,
    selector: Option<CompiledSelector>,
    pipeline: Vec<(TransformFn, Kwargs)>,
}

/// A template ready for extraction
struct CompiledTemplate {
    template: Template,
    selector: Option<CompiledSelector>,
    js_regex: Option<Regex>,
    attrs: Vec<CompiledAttr>,
}

/// Everything a parsed document produced
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub records: Vec<Record>,
    pub sources: Vec<Source>,

    /// A `required` template matched nothing in this document; the
    /// owning phase's frontier must be reset
    pub required_reset: bool,
}

/// One phase's parse stage
pub struct ParseStage {
    kind: EngineKind,
    domain: String,
    templates: Vec<CompiledTemplate>,
    sinks: Arc<SinkRegistry>,
}

impl ParseStage {
    /// Compiles the phase's templates. Any invalid selector, malformed
    /// js-regex or unregistered transform aborts the phase here.
    pub fn new(
        kind: EngineKind,
        domain: impl Into<String>,
        templates: &[Template],
        registry: &TransformRegistry,
        sinks: Arc<SinkRegistry>,
    ) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(templates.len());
        for template in templates {
            template.validate()?;

            let selector = template
                .selector
                .as_deref()
                .map(|raw| engine::compile_selector(kind, raw, &template.name))
                .transpose()?;

            let js_regex = template
                .js_regex
                .as_deref()
                .map(|raw| {
                    Regex::new(raw).map_err(|e| ConfigError::InvalidJsRegex {
                        template: template.name.clone(),
                        message: e.to_string(),
                    })
                })
                .transpose()?;

            // js-regex items are decoded JSON, so attr selectors address
            // them as paths regardless of the phase's parser kind
            let attr_kind = if js_regex.is_some() {
                EngineKind::Json
            } else {
                kind
            };

            let mut attrs = Vec::with_capacity(template.attrs.len());
            for attr in &template.attrs {
                let selector = attr
                    .selector
                    .as_deref()
                    .map(|raw| engine::compile_selector(attr_kind, raw, &template.name))
                    .transpose()?;

                let pipeline = attr
                    .pipeline
                    .iter()
                    .map(|call| {
                        registry
                            .resolve(&template.name, call)
                            .map(|func| (func, call.kwargs.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                attrs.push(CompiledAttr {
                    attr: attr.clone(),
                    selector,
                    pipeline,
                });
            }

            compiled.push(CompiledTemplate {
                template: template.clone(),
                selector,
                js_regex,
                attrs,
            });
        }

        Ok(Self {
            kind,
            domain: domain.into(),
            templates: compiled,
            sinks,
        })
    }

    /// Parses one fetched document against every template, yielding
    /// finished records and newly derived sources.
    pub fn parse(&self, source: &Source, doc: &FetchedDocument) -> ParseOutput {
        let mut output = ParseOutput::default();

        let document = match engine::prepare(self.kind, source, &doc.url, &doc.body) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(url = %doc.url, "failed to prepare document: {}", e);
                output.required_reset = self.templates.iter().any(|t| t.template.required);
                return output;
            }
        };
        let base_url = Url::parse(&doc.url).ok();

        for compiled in &self.templates {
            let items = engine::extract_items(
                &document,
                compiled.selector.as_ref(),
                compiled.js_regex.as_ref(),
            );

            let mut produced = 0usize;
            for item in &items {
                let Some((record, spawned)) =
                    self.assemble(compiled, item, source, base_url.as_ref())
                else {
                    continue;
                };

                produced += 1;
                if compiled.template.preview {
                    tracing::info!(
                        template = %compiled.template.name,
                        record = %record_preview(&record),
                        "preview"
                    );
                }
                output.sources.extend(spawned);
                output.records.push(record);
            }

            if produced == 0 && compiled.template.required {
                tracing::warn!(
                    template = %compiled.template.name,
                    url = %doc.url,
                    "required template produced no records"
                );
                output.required_reset = true;
            }
        }

        output
    }

    /// Assembles one record from one extraction context. Returns `None`
    /// for failed or incomplete extractions.
    fn assemble(
        &self,
        compiled: &CompiledTemplate,
        item: &Item,
        source: &Source,
        base_url: Option<&Url>,
    ) -> Option<(Record, Vec<Source>)> {
        let mut record = Record::new(compiled.template.name.as_str(), source.url.as_str());

        // literal url attr is synthesized before anything else
        if let Some(url) = &compiled.template.url {
            record.set("url", Value::Text(url.clone()));
        }

        // provenance: literal attrs carried by the originating source
        for carried in &source.attrs {
            record.set(carried.name.as_str(), carried.value.clone());
        }

        let mut extracted = 0usize;
        let mut empty = 0usize;
        let mut spawn_candidates: Vec<(&CompiledAttr, Value)> = Vec::new();

        for ca in &compiled.attrs {
            let elements = engine::select_within(item, ca.selector.as_ref(), base_url);
            let value = match run_pipeline(PipeValue::Elements(elements), &ca.pipeline) {
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(attr = %ca.attr.name, "pipeline failed: {}", e);
                    Value::Null
                }
            };

            if let Some(expected) = ca.attr.value_type {
                if !value.is_empty() && !expected.matches(&value) {
                    tracing::debug!(
                        attr = %ca.attr.name,
                        value = %value,
                        "value does not match declared type"
                    );
                }
            }

            extracted += 1;
            if value.is_empty() {
                empty += 1;
            }
            if ca.attr.source.is_some() && !value.is_empty() {
                spawn_candidates.push((ca, value.clone()));
            }
            record.set(ca.attr.name.as_str(), value);
        }

        // Every newly-extracted field failed: the item is a failed
        // extraction. A fallback extractor collaborator could be
        // substituted here; none is active in the default pipeline.
        if extracted > 0 && empty == extracted {
            tracing::warn!(
                template = %compiled.template.name,
                url = %source.url,
                "no attrs extracted for item, skipping"
            );
            return None;
        }

        if empty > 0 && !compiled.template.partial {
            tracing::debug!(
                template = %compiled.template.name,
                url = %source.url,
                "skipping incomplete record ({} empty attrs)",
                empty
            );
            return None;
        }

        // a record's extracted url attr becomes its identity; records
        // without one keep the URL of the document they came from
        if let Some(url_attr) = record.get("url").and_then(|v| v.render()) {
            record.url = engine::absolutize(&self.domain, &url_attr);
        }

        let mut spawned = Vec::new();
        for (ca, value) in spawn_candidates {
            spawned.extend(self.spawn_from_attr(compiled, ca, &value, &record));
        }
        if let Some(proto) = &compiled.template.source {
            if let Some(new_source) = self.spawn_from_record(proto, &record, source) {
                spawned.push(new_source);
            }
        }

        Some((record, spawned))
    }

    /// Derives sources from one attr's extracted value, one per scalar
    /// member, gated by `source_condition` and `attr_condition`.
    fn spawn_from_attr(
        &self,
        compiled: &CompiledTemplate,
        ca: &CompiledAttr,
        value: &Value,
        record: &Record,
    ) -> Vec<Source> {
        let mut out = Vec::new();
        let proto = match &ca.attr.source {
            Some(proto) => proto.as_ref(),
            None => return out,
        };

        for (name, predicate) in &ca.attr.source_condition {
            let gate_value = record.get(name).cloned().unwrap_or(Value::Null);
            if !predicate.matches_all(&gate_value) {
                tracing::debug!(
                    attr = %ca.attr.name,
                    gate = %name,
                    "source condition rejected spawn"
                );
                return out;
            }
        }

        let condition = ca
            .attr
            .attr_condition
            .as_deref()
            .or(proto.attr_condition.as_deref());

        for member in value.members() {
            let Some(rendered) = member.render() else {
                continue;
            };

            let mut new_source = proto.clone();
            new_source.url = engine::absolutize(&self.domain, &proto.apply_src_template(&rendered));
            self.inherit_attrs(&mut new_source, record);
            if new_source.parent {
                new_source.set_attr(RecordAttr::new("_parent", self.record_identity(record)));
            }

            if let Some(attr_name) = condition {
                if !self.value_changed(compiled, record, attr_name) {
                    tracing::debug!(
                        attr = %ca.attr.name,
                        gate = %attr_name,
                        url = %new_source.url,
                        "stored value unchanged, not spawning"
                    );
                    continue;
                }
            }

            out.push(new_source);
        }
        out
    }

    /// Derives one source from a finished record (template-level
    /// spawning). The record's attrs ride along as query params or, for
    /// POST, as form fields.
    fn spawn_from_record(
        &self,
        proto: &Source,
        record: &Record,
        origin: &Source,
    ) -> Option<Source> {
        let mut new_source = proto.clone();

        if new_source.url.is_empty() {
            let discovered = record
                .get("url")
                .and_then(Value::render)
                .unwrap_or_else(|| origin.url.clone());
            // the originating source's rewrite template applies here
            new_source.url =
                engine::absolutize(&self.domain, &origin.apply_src_template(&discovered));
        }

        for attr in &record.attrs {
            if attr.name == "url" {
                continue;
            }
            let Some(rendered) = attr.value.render() else {
                continue;
            };
            match new_source.method {
                Method::Post => {
                    new_source.body.insert(attr.name.clone(), rendered);
                }
                Method::Get => {
                    new_source.params.insert(attr.name.clone(), rendered);
                }
            }
        }

        self.inherit_attrs(&mut new_source, record);
        if new_source.parent {
            new_source.set_attr(RecordAttr::new("_parent", self.record_identity(record)));
        }
        Some(new_source)
    }

    /// Applies the source's `copy_attrs` policy: exactly one of a
    /// single named attr, a named subset, or all attrs of the record.
    fn inherit_attrs(&self, new_source: &mut Source, record: &Record) {
        match new_source.copy_attrs.clone() {
            None => {}
            Some(CopyAttrs::Single(name)) => {
                self.copy_one(new_source, record, &name);
            }
            Some(CopyAttrs::Subset(names)) => {
                for name in names {
                    self.copy_one(new_source, record, &name);
                }
            }
            Some(CopyAttrs::All) => {
                for attr in &record.attrs {
                    new_source.set_attr(attr.clone());
                }
            }
        }
    }

    fn copy_one(&self, new_source: &mut Source, record: &Record, name: &str) {
        match record.get(name) {
            Some(value) => {
                new_source.set_attr(RecordAttr::new(name, value.clone()));
            }
            None => {
                tracing::warn!(attr = %name, "cannot copy missing attr onto derived source");
            }
        }
    }

    /// The value `_parent` links point at: the record's url attr when
    /// present, its originating URL otherwise.
    fn record_identity(&self, record: &Record) -> Value {
        record
            .get("url")
            .cloned()
            .unwrap_or_else(|| Value::Text(record.url.clone()))
    }

    /// Change detection through the template's sink: true when no prior
    /// record exists or the named attr's stored value differs. A failed
    /// sink read counts as "value is new".
    fn value_changed(&self, compiled: &CompiledTemplate, record: &Record, attr_name: &str) -> bool {
        let Some(target) = &compiled.template.sink else {
            return true;
        };
        let Some(sink) = self.sinks.for_target(target) else {
            return true;
        };

        match sink.read(&target.collection, &record.url) {
            Ok(Some(prior)) => prior.get(attr_name) != record.get(attr_name),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(
                    url = %record.url,
                    "sink read failed during condition evaluation, treating value as new: {}",
                    e
                );
                true
            }
        }
    }
}

fn record_preview(record: &Record) -> String {
    let fields: Vec<String> = record
        .attrs
        .iter()
        .map(|a| format!("{}={}", a.name, a.value))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Predicate, SinkKind, TransformCall};
    use crate::storage::{MemorySink, Sink};

    const LIST_PAGE: &str = r#"<html><body><ul>
        <li class="product"><a href="/item/1">First</a><span class="price">10</span></li>
        <li class="product"><a href="/item/2">Second</a><span class="price">20</span></li>
        <li class="product"><a href="/item/3">Third</a><span class="price">30</span></li>
    </ul></body></html>"#;

    fn doc(url: &str, body: &str) -> FetchedDocument {
        FetchedDocument {
            url: url.to_string(),
            status: 200,
            content_type: "text/html".to_string(),
            body: body.to_string(),
        }
    }

    fn product_template() -> Template {
        Template::new("product")
            .with_selector("li.product")
            .with_attrs(vec![
                Attr::new("title")
                    .with_selector("a")
                    .with_pipeline(vec![TransformCall::new("text")]),
                Attr::new("url")
                    .with_selector("a")
                    .with_pipeline(vec![TransformCall::new("links")]),
                Attr::new("price")
                    .with_selector("span.price")
                    .with_pipeline(vec![
                        TransformCall::new("text"),
                        TransformCall::new("numbers"),
                    ]),
            ])
    }

    fn stage(templates: &[Template], sinks: Arc<SinkRegistry>) -> ParseStage {
        ParseStage::new(
            EngineKind::Html,
            "https://example.com",
            templates,
            &TransformRegistry::with_builtins(),
            sinks,
        )
        .unwrap()
    }

    #[test]
    fn test_extracts_one_record_per_item() {
        let stage = stage(&[product_template()], Arc::new(SinkRegistry::empty()));
        let source = Source::new("https://example.com/list");
        let output = stage.parse(&source, &doc("https://example.com/list", LIST_PAGE));

        assert_eq!(output.records.len(), 3);
        assert!(!output.required_reset);

        let first = &output.records[0];
        assert_eq!(first.get("title"), Some(&Value::Text("First".into())));
        assert_eq!(
            first.get("url"),
            Some(&Value::Text("https://example.com/item/1".into()))
        );
        assert_eq!(first.get("price"), Some(&Value::Int(10)));
    }

    #[test]
    fn test_attr_spawning_derives_absolute_sources() {
        let mut template = product_template();
        template.attrs[1] = Attr::new("url")
            .with_selector("a")
            .with_pipeline(vec![TransformCall::new("links")])
            .with_source(Source::new(""));

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let source = Source::new("https://example.com/list");
        let output = stage.parse(&source, &doc("https://example.com/list", LIST_PAGE));

        assert_eq!(output.sources.len(), 3);
        assert_eq!(output.sources[0].url, "https://example.com/item/1");
        assert_eq!(output.sources[2].url, "https://example.com/item/3");
    }

    #[test]
    fn test_src_template_rewrites_spawned_urls() {
        let mut proto = Source::new("");
        proto.src_template = "https://api.example.com/product?ref={}".to_string();

        let mut template = product_template();
        template.attrs[0] = Attr::new("title")
            .with_selector("a")
            .with_pipeline(vec![TransformCall::new("text")])
            .with_source(proto);

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );

        assert_eq!(
            output.sources[0].url,
            "https://api.example.com/product?ref=First"
        );
    }

    #[test]
    fn test_copy_attrs_single_subset_all() {
        let run = |policy: Option<CopyAttrs>| -> Vec<String> {
            let mut proto = Source::new("");
            proto.copy_attrs = policy;

            let mut template = product_template();
            template.attrs[1] = Attr::new("url")
                .with_selector("a")
                .with_pipeline(vec![TransformCall::new("links")])
                .with_source(proto);

            let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
            let output = stage.parse(
                &Source::new("https://example.com/list"),
                &doc("https://example.com/list", LIST_PAGE),
            );
            let mut names: Vec<String> = output.sources[0]
                .attrs
                .iter()
                .map(|a| a.name.clone())
                .collect();
            names.sort();
            names
        };

        assert_eq!(run(None), Vec::<String>::new());
        assert_eq!(
            run(Some(CopyAttrs::Single("price".into()))),
            vec!["price".to_string()]
        );
        assert_eq!(
            run(Some(CopyAttrs::Subset(vec![
                "price".into(),
                "title".into()
            ]))),
            vec!["price".to_string(), "title".to_string()]
        );
        assert_eq!(
            run(Some(CopyAttrs::All)),
            vec![
                "price".to_string(),
                "title".to_string(),
                "url".to_string()
            ]
        );
    }

    #[test]
    fn test_source_condition_gates_spawn() {
        let mut template = product_template();
        let mut gated = Attr::new("url")
            .with_selector("a")
            .with_pipeline(vec![TransformCall::new("links")])
            .with_source(Source::new(""));
        gated
            .source_condition
            .insert("price".to_string(), Predicate::Gt(15.0));
        template.attrs[1] = gated;

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );

        // prices are 10, 20, 30: only the latter two pass the gate
        assert_eq!(output.sources.len(), 2);
        assert_eq!(output.sources[0].url, "https://example.com/item/2");
    }

    #[test]
    fn test_attr_condition_spawns_only_on_change() {
        let sink = Arc::new(MemorySink::new());
        let mut registry = SinkRegistry::empty();
        registry.insert(SinkKind::Memory, sink.clone());
        let registry = Arc::new(registry);

        let mut template = product_template().with_sink(SinkKind::Memory, "products");
        let mut gated = Attr::new("price")
            .with_selector("span.price")
            .with_pipeline(vec![
                TransformCall::new("text"),
                TransformCall::new("numbers"),
            ])
            .with_source(Source::new(""));
        gated.attr_condition = Some("price".to_string());
        template.attrs[2] = gated;

        let page = r#"<html><body><ul>
            <li class="product"><a href="/item/1">First</a><span class="price">10</span></li>
        </ul></body></html>"#;

        // the record's identity is its extracted url attr; store the
        // prior version under that key with a differing price: spawn
        let mut prior = Record::new("product", "https://example.com/item/1");
        prior.set("price", Value::Int(8));
        sink.store("products", &prior).unwrap();

        let stage = stage(&[template], registry);
        let source = Source::new("https://example.com/list");
        let output = stage.parse(&source, &doc("https://example.com/list", page));
        assert_eq!(output.sources.len(), 1);

        // stored value now matches the extraction: no spawn
        let mut same = Record::new("product", "https://example.com/item/1");
        same.set("price", Value::Int(10));
        sink.store("products", &same).unwrap();

        let output = stage.parse(&source, &doc("https://example.com/list", page));
        assert!(output.sources.is_empty());
    }

    #[test]
    fn test_failed_extraction_skips_item() {
        let template = Template::new("product")
            .with_selector("li.product")
            .with_attrs(vec![Attr::new("missing")
                .with_selector("em.nope")
                .with_pipeline(vec![TransformCall::new("text")])]);

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );
        assert!(output.records.is_empty());
    }

    #[test]
    fn test_carried_attrs_do_not_mask_failed_extraction() {
        let template = Template::new("product")
            .with_selector("li.product")
            .with_attrs(vec![Attr::new("missing")
                .with_selector("em.nope")
                .with_pipeline(vec![TransformCall::new("text")])]);

        let mut source = Source::new("https://example.com/list");
        source.attrs.push(RecordAttr::new(
            "category",
            Value::Text("widgets".into()),
        ));

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(&source, &doc("https://example.com/list", LIST_PAGE));
        // the carried attr alone cannot rescue an item whose extracted
        // fields all failed
        assert!(output.records.is_empty());
    }

    #[test]
    fn test_partial_accepts_incomplete_records() {
        let mut attrs = product_template().attrs;
        attrs.push(
            Attr::new("subtitle")
                .with_selector("em.subtitle")
                .with_pipeline(vec![TransformCall::new("text")]),
        );

        let strict = Template::new("product")
            .with_selector("li.product")
            .with_attrs(attrs.clone());
        let stage_strict = stage(&[strict], Arc::new(SinkRegistry::empty()));
        let output = stage_strict.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );
        assert!(output.records.is_empty());

        let mut lenient = Template::new("product")
            .with_selector("li.product")
            .with_attrs(attrs);
        lenient.partial = true;
        let stage_lenient = stage(&[lenient], Arc::new(SinkRegistry::empty()));
        let output = stage_lenient.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );
        assert_eq!(output.records.len(), 3);
        assert_eq!(output.records[0].get("subtitle"), Some(&Value::Null));
    }

    #[test]
    fn test_required_template_flags_reset() {
        let mut template = Template::new("product")
            .with_selector("li.product")
            .with_attrs(vec![Attr::new("title")
                .with_selector("a")
                .with_pipeline(vec![TransformCall::new("text")])]);
        template.required = true;

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let empty_page = "<html><body><p>nothing here</p></body></html>";
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", empty_page),
        );
        assert!(output.required_reset);
    }

    #[test]
    fn test_record_level_spawn_merges_attrs_into_params() {
        let template = product_template().with_source(Source::new(""));
        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));

        // the originating source's rewrite template applies to
        // record-level spawns
        let mut origin = Source::new("https://example.com/list");
        origin.src_template = "{}?format=full".to_string();

        let output = stage.parse(&origin, &doc("https://example.com/list", LIST_PAGE));

        assert_eq!(output.sources.len(), 3);
        let spawned = &output.sources[0];
        assert_eq!(spawned.url, "https://example.com/item/1?format=full");
        assert_eq!(spawned.params.get("title").map(String::as_str), Some("First"));
        assert_eq!(spawned.params.get("price").map(String::as_str), Some("10"));
        assert!(!spawned.params.contains_key("url"));
    }

    #[test]
    fn test_record_level_spawn_post_uses_body() {
        let mut proto = Source::new("");
        proto.method = Method::Post;

        let template = product_template().with_source(proto);
        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );

        let spawned = &output.sources[0];
        assert_eq!(spawned.body.get("title").map(String::as_str), Some("First"));
        assert!(spawned.params.is_empty());
    }

    #[test]
    fn test_parent_flag_links_originating_record() {
        let mut proto = Source::new("");
        proto.parent = true;

        let mut template = product_template();
        template.attrs[1] = Attr::new("url")
            .with_selector("a")
            .with_pipeline(vec![TransformCall::new("links")])
            .with_source(proto);

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );

        let parent = output.sources[0].attr("_parent").unwrap();
        assert_eq!(
            parent.value,
            Value::Text("https://example.com/item/1".into())
        );
    }

    #[test]
    fn test_unknown_transform_fails_compilation() {
        let template = Template::new("product").with_attrs(vec![
            Attr::new("x").with_pipeline(vec![TransformCall::new("nope")])
        ]);
        let result = ParseStage::new(
            EngineKind::Html,
            "https://example.com",
            &[template],
            &TransformRegistry::with_builtins(),
            Arc::new(SinkRegistry::empty()),
        );
        assert!(matches!(
            result,
            Err(ConfigError::UnknownTransform { .. })
        ));
    }

    #[test]
    fn test_literal_url_attr_synthesized_first() {
        let mut template = product_template();
        template.url = Some("https://example.com/static".to_string());
        // remove the extracted url attr so the literal survives
        template.attrs.remove(1);
        template.partial = true;

        let stage = stage(&[template], Arc::new(SinkRegistry::empty()));
        let output = stage.parse(
            &Source::new("https://example.com/list"),
            &doc("https://example.com/list", LIST_PAGE),
        );
        assert_eq!(
            output.records[0].get("url"),
            Some(&Value::Text("https://example.com/static".into()))
        );
        assert_eq!(output.records[0].attrs[0].name, "url");
    }
}
