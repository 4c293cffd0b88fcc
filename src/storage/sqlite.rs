//! SQLite sink backend
//!
//! Records live in a single table keyed by (collection, url); attribute
//! values are serialized as JSON. The connection is wrapped in a mutex
//! since rusqlite connections are not Sync.

use crate::model::{Record, RecordAttr};
use crate::storage::{Sink, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed record sink
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                url        TEXT NOT NULL,
                template   TEXT NOT NULL,
                attrs      TEXT NOT NULL,
                stored_at  TEXT NOT NULL,
                PRIMARY KEY (collection, url)
            );
            CREATE INDEX IF NOT EXISTS idx_records_collection
                ON records (collection);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_record(template: String, url: String, attrs: String) -> StorageResult<Record> {
        let attrs: Vec<RecordAttr> = serde_json::from_str(&attrs)?;
        Ok(Record {
            template,
            url,
            attrs,
        })
    }
}

impl Sink for SqliteSink {
    fn store(&self, collection: &str, record: &Record) -> StorageResult<()> {
        let attrs = serde_json::to_string(&record.attrs)?;
        let stored_at = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO records (collection, url, template, attrs, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (collection, url) DO UPDATE SET
                 template = excluded.template,
                 attrs = excluded.attrs,
                 stored_at = excluded.stored_at",
            params![collection, record.url, record.template, attrs, stored_at],
        )?;
        Ok(())
    }

    fn read(&self, collection: &str, url: &str) -> StorageResult<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT template, url, attrs FROM records
                 WHERE collection = ?1 AND url = ?2",
                params![collection, url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((template, url, attrs)) => Ok(Some(Self::row_to_record(template, url, attrs)?)),
            None => Ok(None),
        }
    }

    fn stored_urls(&self, collection: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT url FROM records WHERE collection = ?1")?;
        let urls = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    fn records(&self, collection: &str) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT template, url, attrs FROM records WHERE collection = ?1 ORDER BY url",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(template, url, attrs)| Self::row_to_record(template, url, attrs))
            .collect()
    }
}
