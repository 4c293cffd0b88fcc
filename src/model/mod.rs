//! Record model: the value types a scrape model is made of
//!
//! `Source` (request descriptor), `Attr` (named field + pipeline),
//! `Template` (record schema) and `Phase` (scheduling unit), plus the
//! `Value` and `Predicate` types that flow through extraction.

mod attr;
mod phase;
mod predicate;
mod source;
mod template;
mod value;

pub use attr::{Attr, TransformCall};
pub use phase::{EngineKind, Phase, ScrapeModel};
pub use predicate::Predicate;
pub use source::{CopyAttrs, Method, RecordAttr, Source};
pub use template::{Record, SinkKind, SinkTarget, Template};
pub use value::{Kwargs, Value, ValueType};
