//! SQLite document store with migrations
//!
//! Backs both the document contract and lexical search. Lexical relevance is a
//! CASE tag over LIKE matches: 3 for the title, 1 for the body.

use super::{
    Document, DocumentStore, DocumentWriter, LexicalHit, LexicalSearch, NewDocument,
    GENERAL_DOMAIN,
};
use crate::error::{KbError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// SQLite-backed storage
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database and apply pending migrations
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(8).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, now_timestamp()],
                )?;
            }
        }

        Ok(())
    }

    /// Document counts by status and domain
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let active_documents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        let deleted_documents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = 'deleted'",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT domain, COUNT(*) FROM documents WHERE status = 'active'
             GROUP BY domain ORDER BY domain",
        )?;
        let domains = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                Ok((row.get::<_, String>(0)?, count as usize))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DbStats {
            active_documents: active_documents as usize,
            deleted_documents: deleted_documents as usize,
            domains,
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub active_documents: usize,
    pub deleted_documents: usize,
    /// Active document count per domain
    pub domains: Vec<(String, usize)>,
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, err.into())
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        domain: row.get(3)?,
        status: status.parse().map_err(|e: String| conversion_error(4, e))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(5, e))?,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `%pattern%` with LIKE wildcards in the pattern escaped
fn like_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('%');
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Lowercase domain tag for a category name
pub fn normalize_domain(domain: Option<&str>) -> String {
    match domain.map(str::trim) {
        Some(d) if !d.is_empty() => d.to_lowercase(),
        _ => GENERAL_DOMAIN.to_string(),
    }
}

impl DocumentStore for SqliteStore {
    fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.get_conn()?;
        let document = conn
            .query_row(
                "SELECT id, title, content, domain, status, created_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .optional()?;
        Ok(document)
    }

    fn list_active_documents(&self) -> Result<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT id FROM documents WHERE status = 'active' ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }
}

impl DocumentWriter for SqliteStore {
    fn insert_document(&self, document: NewDocument) -> Result<i64> {
        let conn = self.get_conn()?;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO documents (title, content, domain, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
            params![
                document.title,
                document.content,
                normalize_domain(document.domain.as_deref()),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_deleted(&self, id: i64) -> Result<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE documents SET status = 'deleted', updated_at = ?2
             WHERE id = ?1 AND status = 'active'",
            params![id, now_timestamp()],
        )?;
        Ok(changed > 0)
    }

    fn set_domain(&self, id: i64, domain: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE documents SET domain = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, normalize_domain(Some(domain)), now_timestamp()],
        )?;
        if changed == 0 {
            return Err(KbError::DocumentNotFound { id });
        }
        Ok(())
    }
}

impl LexicalSearch for SqliteStore {
    fn search(&self, pattern: &str, domain: Option<&str>, limit: usize) -> Result<Vec<LexicalHit>> {
        let pattern = pattern.trim();
        if pattern.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r"SELECT id, title, content, domain,
                CASE
                    WHEN title LIKE ?1 ESCAPE '\' THEN 3
                    WHEN content LIKE ?1 ESCAPE '\' THEN 1
                    ELSE 0
                END AS relevance
              FROM documents
              WHERE status = 'active'
                AND (title LIKE ?1 ESCAPE '\' OR content LIKE ?1 ESCAPE '\')
                AND (?2 IS NULL OR domain = ?2)
              ORDER BY relevance DESC, created_at DESC, id DESC
              LIMIT ?3",
        )?;

        let domain = domain.map(|d| normalize_domain(Some(d)));
        let hits = stmt
            .query_map(params![like_pattern(pattern), domain, limit as i64], |row| {
                let relevance: i64 = row.get(4)?;
                Ok(LexicalHit {
                    document_id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    domain: row.get(3)?,
                    relevance: relevance.clamp(0, 3) as u8,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        tracing::debug!("Lexical search '{}' returned {} rows", pattern, hits.len());
        Ok(hits)
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: documents
    r#"
    CREATE TABLE documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        domain TEXT NOT NULL DEFAULT 'general',
        status TEXT NOT NULL DEFAULT 'active',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX idx_documents_status ON documents(status);
    CREATE INDEX idx_documents_domain ON documents(domain);
    CREATE INDEX idx_documents_created_at ON documents(created_at);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DocumentStatus, BODY_MATCH, TITLE_MATCH};
    use tempfile::TempDir;

    fn open_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("kb.db")).unwrap();
        (store, temp_dir)
    }

    fn add(store: &SqliteStore, title: &str, content: &str, domain: Option<&str>) -> i64 {
        store
            .insert_document(NewDocument {
                title: title.to_string(),
                content: content.to_string(),
                domain: domain.map(str::to_string),
            })
            .unwrap()
    }

    #[test]
    fn test_migrations() {
        let (store, _temp) = open_store();
        let conn = store.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kb.db");
        let id = {
            let store = SqliteStore::open(&path).unwrap();
            add(&store, "Persisted", "body", None)
        };

        let store = SqliteStore::open(&path).unwrap();
        let document = store.get_document(id).unwrap().unwrap();
        assert_eq!(document.title, "Persisted");
        assert_eq!(document.domain, GENERAL_DOMAIN);
    }

    #[test]
    fn test_insert_and_get() {
        let (store, _temp) = open_store();
        let id = add(&store, "Title", "Body", Some("Technology"));

        let document = store.get_document(id).unwrap().unwrap();
        assert_eq!(document.domain, "technology");
        assert_eq!(document.status, DocumentStatus::Active);
        assert!(store.get_document(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_mark_deleted() {
        let (store, _temp) = open_store();
        let keep = add(&store, "Keep", "x", None);
        let drop = add(&store, "Drop", "x", None);

        assert!(store.mark_deleted(drop).unwrap());
        assert!(!store.mark_deleted(drop).unwrap());

        assert_eq!(store.list_active_documents().unwrap(), vec![keep]);
        let deleted = store.get_document(drop).unwrap().unwrap();
        assert!(!deleted.is_active());
    }

    #[test]
    fn test_lexical_relevance_tags() {
        let (store, _temp) = open_store();
        let body_only = add(&store, "Overview", "All about neural networks.", None);
        let title = add(&store, "Neural Networks", "An introduction.", None);
        add(&store, "Cooking", "Pasta recipes.", None);

        let hits = store.search("neural networks", None, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, title);
        assert_eq!(hits[0].relevance, TITLE_MATCH);
        assert_eq!(hits[1].document_id, body_only);
        assert_eq!(hits[1].relevance, BODY_MATCH);
    }

    #[test]
    fn test_lexical_excludes_deleted_and_filters_domain() {
        let (store, _temp) = open_store();
        let science = add(&store, "Data analysis", "x", Some("science"));
        let business = add(&store, "Data strategy", "x", Some("business"));
        let gone = add(&store, "Data lake", "x", Some("science"));
        store.mark_deleted(gone).unwrap();

        let all = store.search("data", None, 10).unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store.search("data", Some("Science"), 10).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].document_id, science);
        assert_ne!(filtered[0].document_id, business);
    }

    #[test]
    fn test_lexical_newest_first_and_limit() {
        let (store, _temp) = open_store();
        let first = add(&store, "Rust guide", "x", None);
        let second = add(&store, "Rust book", "x", None);

        let hits = store.search("rust", None, 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, second);
        assert_ne!(hits[0].document_id, first);
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let (store, _temp) = open_store();
        add(&store, "100% coverage", "x", None);
        add(&store, "100 percent", "x", None);

        let hits = store.search("100%", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.search("   ", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_set_domain_and_stats() {
        let (store, _temp) = open_store();
        let id = add(&store, "Doc", "x", None);
        store.set_domain(id, "Science").unwrap();
        assert_eq!(store.get_document(id).unwrap().unwrap().domain, "science");
        assert!(store.set_domain(id + 1, "science").is_err());

        let stats = store.stats().unwrap();
        assert_eq!(stats.active_documents, 1);
        assert_eq!(stats.domains, vec![("science".to_string(), 1)]);
    }
}
