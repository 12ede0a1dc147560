//! SQLite document cache: auto-increment id to `{link, text}`.
//!
//! Rows are only inserted and read, never updated, so concurrent fetches
//! never touch the same row.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use delve_core::error::{DelveError, Result};
use delve_core::types::CachedDocument;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS search_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    link TEXT NOT NULL,
    text TEXT NOT NULL
)";

pub struct DocumentCache {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DocumentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCache").finish_non_exhaustive()
    }
}

fn cache_error(e: rusqlite::Error) -> DelveError {
    DelveError::Cache(e.to_string())
}

impl DocumentCache {
    /// Open or create the cache file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(cache_error)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(cache_error)?;
        let cache = Self::init(conn)?;
        info!("Document cache opened at {:?}", path);
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(cache_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(SCHEMA, []).map_err(cache_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DelveError::Cache("cache connection lock poisoned".into()))
    }

    /// Store a document and return its new id.
    pub fn insert(&self, link: &str, text: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO search_results (link, text) VALUES (?1, ?2)",
            params![link, text],
        )
        .map_err(cache_error)?;
        let id = conn.last_insert_rowid();
        debug!(doc_id = id, link, bytes = text.len(), "Cached document");
        Ok(id)
    }

    pub fn get(&self, id: i64) -> Result<Option<CachedDocument>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, link, text FROM search_results WHERE id = ?1",
            params![id],
            |row| {
                Ok(CachedDocument {
                    id: row.get(0)?,
                    link: row.get(1)?,
                    text: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(cache_error)
    }

    /// Like [`get`](Self::get), but a missing or blank row is an error.
    pub fn require(&self, id: i64) -> Result<CachedDocument> {
        match self.get(id)? {
            Some(doc) if !doc.text.trim().is_empty() => Ok(doc),
            Some(_) => Err(DelveError::Cache(format!("document {id} is empty"))),
            None => Err(DelveError::Cache(format!("no document with id {id}"))),
        }
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM search_results", [], |row| row.get(0))
            .map_err(cache_error)
    }

    /// Most recent rows, newest first, as `(id, link, text length)`.
    pub fn recent(&self, limit: usize) -> Result<Vec<(i64, String, usize)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, link, length(text) FROM search_results ORDER BY id DESC LIMIT ?1")
            .map_err(cache_error)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as usize))
            })
            .map_err(cache_error)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(cache_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = DocumentCache::open_in_memory().unwrap();
        let first = cache.insert("https://a.example", "# A").unwrap();
        let second = cache.insert("https://b.example", "# B").unwrap();
        assert!(second > first);

        let doc = cache.get(first).unwrap().unwrap();
        assert_eq!(doc.link, "https://a.example");
        assert_eq!(doc.text, "# A");
        assert!(cache.get(999).unwrap().is_none());
        assert_eq!(cache.count().unwrap(), 2);
    }

    #[test]
    fn test_require_rejects_missing_and_blank() {
        let cache = DocumentCache::open_in_memory().unwrap();
        let blank = cache.insert("https://blank.example", "   ").unwrap();
        assert!(matches!(cache.require(blank), Err(DelveError::Cache(_))));
        assert!(matches!(cache.require(42), Err(DelveError::Cache(_))));
    }

    #[test]
    fn test_file_cache_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let id = {
            let cache = DocumentCache::open(&path).unwrap();
            cache.insert("https://a.example", "kept").unwrap()
        };
        let reopened = DocumentCache::open(&path).unwrap();
        assert_eq!(reopened.get(id).unwrap().unwrap().text, "kept");
        assert_eq!(reopened.recent(5).unwrap(), vec![(id, "https://a.example".to_string(), 4)]);
    }
}
