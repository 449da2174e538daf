use crate::sync::{BlockId, NewRecord, RecordId, RecordStore, RecordUpdate, RemoteBookRecord};
use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Record {0} not found")]
    RecordNotFound(RecordId),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    highlight_count INTEGER,
    last_highlighted_at TEXT,
    last_synced_at TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY,
    book_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS segments (
    id INTEGER PRIMARY KEY,
    block_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    content TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS blocks_book_id ON blocks(book_id);
CREATE INDEX IF NOT EXISTS segments_block_id ON segments(block_id);
";

/// Book records kept in SQLite: one row per book, with its rendered
/// highlights stored as text blocks split into segments.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Segments of every block under a record, in write order.
    pub fn read_segments(&self, record_id: RecordId) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT s.content FROM segments s
             JOIN blocks b ON b.id = s.block_id
             WHERE b.book_id = ?1
             ORDER BY b.id, s.position",
        )?;
        let segments = stmt
            .query_map([record_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(segments)
    }

    pub fn read_body(&self, record_id: RecordId) -> Result<String, StoreError> {
        Ok(self.read_segments(record_id)?.concat())
    }

    fn ensure_record(&self, record_id: RecordId) -> Result<(), StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM books WHERE id = ?1", [record_id], |row| {
                row.get(0)
            })
            .optional()?;
        found.map(|_| ()).ok_or(StoreError::RecordNotFound(record_id))
    }
}

fn record_from_row(row: &Row) -> rusqlite::Result<RemoteBookRecord> {
    let last_highlighted_at: Option<String> = row.get(4)?;
    let last_synced_at: Option<String> = row.get(5)?;

    Ok(RemoteBookRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        highlight_count: row.get(3)?,
        last_highlighted_at: last_highlighted_at.as_deref().and_then(parse_timestamp),
        last_synced_at: last_synced_at.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

impl RecordStore for SqliteStore {
    fn list_records(&self) -> Result<Vec<RemoteBookRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, author, highlight_count, last_highlighted_at, last_synced_at
             FROM books ORDER BY id",
        )?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn create_record(&mut self, record: &NewRecord) -> Result<RemoteBookRecord, StoreError> {
        self.conn.execute(
            "INSERT INTO books (title, author, highlight_count) VALUES (?1, ?2, 0)",
            params![record.title, record.author],
        )?;

        Ok(RemoteBookRecord {
            id: self.conn.last_insert_rowid(),
            title: record.title.clone(),
            author: record.author.clone(),
            highlight_count: Some(0),
            last_highlighted_at: None,
            last_synced_at: None,
        })
    }

    fn list_child_blocks(&self, record_id: RecordId) -> Result<Vec<BlockId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM blocks WHERE book_id = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([record_id], |row| row.get(0))?
            .collect::<Result<Vec<BlockId>, _>>()?;
        Ok(ids)
    }

    fn delete_child_blocks(
        &mut self,
        record_id: RecordId,
        block_ids: &[BlockId],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for block_id in block_ids {
            let removed = tx.execute(
                "DELETE FROM blocks WHERE id = ?1 AND book_id = ?2",
                params![block_id, record_id],
            )?;
            if removed > 0 {
                tx.execute("DELETE FROM segments WHERE block_id = ?1", [block_id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn append_text_block(
        &mut self,
        record_id: RecordId,
        chunks: &[String],
    ) -> Result<(), StoreError> {
        self.ensure_record(record_id)?;

        let tx = self.conn.transaction()?;
        tx.execute("INSERT INTO blocks (book_id) VALUES (?1)", [record_id])?;
        let block_id = tx.last_insert_rowid();
        for (position, chunk) in chunks.iter().enumerate() {
            tx.execute(
                "INSERT INTO segments (block_id, position, content) VALUES (?1, ?2, ?3)",
                params![block_id, position as i64, chunk],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_record(
        &mut self,
        record_id: RecordId,
        update: &RecordUpdate,
    ) -> Result<(), StoreError> {
        let rows = self.conn.execute(
            "UPDATE books
             SET highlight_count = ?1, last_highlighted_at = ?2, last_synced_at = ?3
             WHERE id = ?4",
            params![
                update.highlight_count,
                update.last_highlighted_at.map(|dt| dt.to_rfc3339()),
                update.last_synced_at.to_rfc3339(),
                record_id,
            ],
        )?;

        if rows == 0 {
            return Err(StoreError::RecordNotFound(record_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(title: &str) -> NewRecord {
        NewRecord {
            title: title.to_string(),
            author: "Test Author".to_string(),
        }
    }

    fn timestamp(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_init_creates_tables() {
        let store = SqliteStore::open_in_memory().unwrap();

        let count: i32 = store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('books', 'blocks', 'segments')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 3);
    }

    #[test]
    fn test_open_on_disk_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("highlights.db");

        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.create_record(&new_record("Test Book")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();

        assert_eq!(store.list_records().unwrap().len(), 1);
    }

    #[test]
    fn test_create_seeds_zero_count() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let created = store.create_record(&new_record("Test Book")).unwrap();
        let listed = store.list_records().unwrap();

        assert_eq!(created.highlight_count, Some(0));
        assert_eq!(listed, vec![created]);
    }

    #[test]
    fn test_update_record() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("Test Book")).unwrap().id;
        let update = RecordUpdate {
            highlight_count: 7,
            last_highlighted_at: Some(timestamp("2021-05-03T22:03:12+02:00")),
            last_synced_at: timestamp("2026-01-25T10:30:00+00:00"),
        };

        store.update_record(id, &update).unwrap();

        let record = &store.list_records().unwrap()[0];
        assert_eq!(record.highlight_count, Some(7));
        assert_eq!(record.last_highlighted_at, update.last_highlighted_at);
        assert_eq!(record.last_synced_at, Some(update.last_synced_at));
    }

    #[test]
    fn test_update_missing_record() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let update = RecordUpdate {
            highlight_count: 1,
            last_highlighted_at: None,
            last_synced_at: timestamp("2026-01-25T10:30:00+00:00"),
        };

        let result = store.update_record(42, &update);

        assert!(matches!(result, Err(StoreError::RecordNotFound(42))));
    }

    #[test]
    fn test_append_and_read_body() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("Test Book")).unwrap().id;

        store
            .append_text_block(id, &["first ".to_string(), "second".to_string()])
            .unwrap();

        assert_eq!(store.list_child_blocks(id).unwrap().len(), 1);
        assert_eq!(store.read_segments(id).unwrap(), vec!["first ", "second"]);
        assert_eq!(store.read_body(id).unwrap(), "first second");
    }

    #[test]
    fn test_append_to_missing_record() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let result = store.append_text_block(9, &["text".to_string()]);

        assert!(matches!(result, Err(StoreError::RecordNotFound(9))));
    }

    #[test]
    fn test_delete_child_blocks() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let id = store.create_record(&new_record("Test Book")).unwrap().id;
        store.append_text_block(id, &["one".to_string()]).unwrap();
        store.append_text_block(id, &["two".to_string()]).unwrap();

        let blocks = store.list_child_blocks(id).unwrap();
        store.delete_child_blocks(id, &blocks).unwrap();

        assert!(store.list_child_blocks(id).unwrap().is_empty());
        assert_eq!(store.read_body(id).unwrap(), "");
        let orphans: i32 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM segments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_delete_ignores_other_records_blocks() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = store.create_record(&new_record("A")).unwrap().id;
        let b = store.create_record(&new_record("B")).unwrap().id;
        store.append_text_block(b, &["keep".to_string()]).unwrap();

        let b_blocks = store.list_child_blocks(b).unwrap();
        store.delete_child_blocks(a, &b_blocks).unwrap();

        assert_eq!(store.read_body(b).unwrap(), "keep");
    }
}
