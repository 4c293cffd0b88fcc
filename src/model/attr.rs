//! Attr: one named field of a record
//!
//! The value of an attr is obtained by applying its selector to the
//! current extraction context and threading the selected elements through
//! an ordered transform pipeline.

use crate::model::{Kwargs, Predicate, Source, ValueType};
use crate::ConfigError;
use std::collections::BTreeMap;

/// One stage of a transform pipeline: a registered function name plus
/// its keyword arguments
#[derive(Debug, Clone, PartialEq)]
pub struct TransformCall {
    pub func: String,
    pub kwargs: Kwargs,
}

impl TransformCall {
    pub fn new(func: impl Into<String>) -> Self {
        Self {
            func: func.into(),
            kwargs: Kwargs::new(),
        }
    }

    pub fn with_kwargs(func: impl Into<String>, kwargs: Kwargs) -> Self {
        Self {
            func: func.into(),
            kwargs,
        }
    }
}

/// One named field of a record
#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,

    /// Selector narrowing the extraction context; `None` selects the
    /// whole item
    pub selector: Option<String>,

    /// Ordered transform pipeline, composed left to right
    pub pipeline: Vec<TransformCall>,

    /// Record-level predicates over already-extracted attribute values
    /// gating the spawn of this attr's source
    pub source_condition: BTreeMap<String, Predicate>,

    /// Change-detection gate: spawn only when the named attribute's
    /// value differs from the one stored in the sink
    pub attr_condition: Option<String>,

    /// Source template spawning a request from this field's value
    pub source: Option<Box<Source>>,

    /// Declared type for soft validation (mismatch logs, never fails)
    pub value_type: Option<ValueType>,
}

impl Attr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: None,
            pipeline: Vec::new(),
            source_condition: BTreeMap::new(),
            attr_condition: None,
            source: None,
            value_type: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline: Vec<TransformCall>) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Builds an attr from parallel function-name and kwargs lists.
    ///
    /// Invariant: the pipeline and its kwargs bundles must have equal
    /// length. Missing trailing bundles default to empty; surplus
    /// bundles cannot be matched to a stage and are a configuration
    /// error. Enforced here, once, not per call.
    pub fn from_parts(
        name: impl Into<String>,
        selector: Option<String>,
        funcs: Vec<String>,
        mut kwargs: Vec<Kwargs>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if kwargs.len() > funcs.len() {
            return Err(ConfigError::Validation(format!(
                "attr '{}': {} kwargs bundles for {} pipeline functions",
                name,
                kwargs.len(),
                funcs.len()
            )));
        }
        kwargs.resize(funcs.len(), Kwargs::new());

        let pipeline = funcs
            .into_iter()
            .zip(kwargs)
            .map(|(func, kw)| TransformCall::with_kwargs(func, kw))
            .collect();

        Ok(Self {
            name,
            selector,
            pipeline,
            source_condition: BTreeMap::new(),
            attr_condition: None,
            source: None,
            value_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_from_parts_pads_missing_kwargs() {
        let mut kw = Kwargs::new();
        kw.insert("k".into(), Value::Int(1));

        let attr = Attr::from_parts(
            "price",
            None,
            vec!["text".into(), "regex".into(), "first".into()],
            vec![Kwargs::new(), kw.clone()],
        )
        .unwrap();

        assert_eq!(attr.pipeline.len(), 3);
        assert!(attr.pipeline[0].kwargs.is_empty());
        assert_eq!(attr.pipeline[1].kwargs, kw);
        assert!(attr.pipeline[2].kwargs.is_empty());
    }

    #[test]
    fn test_from_parts_rejects_surplus_kwargs() {
        let result = Attr::from_parts(
            "title",
            None,
            vec!["text".into()],
            vec![Kwargs::new(), Kwargs::new()],
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
