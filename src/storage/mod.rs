//! Storage: record sinks and the per-run sink registry
//!
//! Sinks are external collaborators from the engine's point of view;
//! this module ships two backends (sqlite, memory) and the registry
//! binding one sink instance per distinct backend kind declared across
//! all templates of a model.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::SqliteSink;
pub use traits::{Sink, StorageError, StorageResult};

use crate::model::{ScrapeModel, SinkKind, SinkTarget};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One sink instance per backend kind used by a model
pub struct SinkRegistry {
    sinks: HashMap<SinkKind, Arc<dyn Sink>>,
}

impl SinkRegistry {
    /// Builds sinks for every backend kind any template declares.
    pub fn build(model: &ScrapeModel) -> StorageResult<Self> {
        let mut sinks: HashMap<SinkKind, Arc<dyn Sink>> = HashMap::new();

        let declared = model
            .phases
            .iter()
            .flat_map(|p| p.templates.iter())
            .filter_map(|t| t.sink.as_ref().map(|s| s.kind));

        for kind in declared {
            if sinks.contains_key(&kind) {
                continue;
            }
            let sink: Arc<dyn Sink> = match kind {
                SinkKind::Sqlite => {
                    let path = model
                        .database_path
                        .as_deref()
                        .ok_or(StorageError::MissingDatabasePath)?;
                    Arc::new(SqliteSink::open(Path::new(path))?)
                }
                SinkKind::Memory => Arc::new(MemorySink::new()),
            };
            sinks.insert(kind, sink);
        }

        Ok(Self { sinks })
    }

    /// Registry with no sinks, for models that store nothing.
    pub fn empty() -> Self {
        Self {
            sinks: HashMap::new(),
        }
    }

    /// Replaces (or installs) the sink for a backend kind. Lets an
    /// embedding application supply its own storage.
    pub fn insert(&mut self, kind: SinkKind, sink: Arc<dyn Sink>) {
        self.sinks.insert(kind, sink);
    }

    pub fn get(&self, kind: SinkKind) -> Option<Arc<dyn Sink>> {
        self.sinks.get(&kind).cloned()
    }

    pub fn for_target(&self, target: &SinkTarget) -> Option<Arc<dyn Sink>> {
        self.get(target.kind)
    }
}
