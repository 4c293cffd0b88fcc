//! In-memory sink backend for tests, previews and dry runs

use crate::model::Record;
use crate::storage::{Sink, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// HashMap-backed record sink
#[derive(Default)]
pub struct MemorySink {
    collections: RwLock<HashMap<String, HashMap<String, Record>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.collections
            .read()
            .unwrap()
            .values()
            .map(|c| c.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Sink for MemorySink {
    fn store(&self, collection: &str, record: &Record) -> StorageResult<()> {
        self.collections
            .write()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(record.url.clone(), record.clone());
        Ok(())
    }

    fn read(&self, collection: &str, url: &str) -> StorageResult<Option<Record>> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(collection)
            .and_then(|c| c.get(url))
            .cloned())
    }

    fn stored_urls(&self, collection: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn records(&self, collection: &str) -> StorageResult<Vec<Record>> {
        let mut records: Vec<Record> = self
            .collections
            .read()
            .unwrap()
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }
}
