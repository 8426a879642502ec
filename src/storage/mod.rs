//! Document storage and lexical search
//!
//! The retrieval core reads documents through [`DocumentStore`] and runs substring
//! search through [`LexicalSearch`]. [`DocumentWriter`] adds the few writes that
//! ingestion and the CLI need. [`SqliteStore`] implements all three.

pub mod database;

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use database::{DbPool, DbStats, SqliteStore};

/// Domain assigned to documents nobody has classified yet
pub const GENERAL_DOMAIN: &str = "general";

/// Relevance tag of a title match
pub const TITLE_MATCH: u8 = 3;
/// Relevance tag of a body match
pub const BODY_MATCH: u8 = 1;

/// Document lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    Deleted,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Active => "active",
            DocumentStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(DocumentStatus::Active),
            "deleted" => Ok(DocumentStatus::Deleted),
            other => Err(format!("Unknown document status: {}", other)),
        }
    }
}

/// A knowledge-base document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub domain: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn is_active(&self) -> bool {
        self.status == DocumentStatus::Active
    }
}

/// Input for [`DocumentWriter::insert_document`]
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
    /// Category or domain name; stored lowercase, `general` when absent
    pub domain: Option<String>,
}

/// One lexical search row
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub document_id: i64,
    pub title: String,
    pub content: String,
    pub domain: String,
    /// 3 for a title match, 1 for a body match, 0 otherwise
    pub relevance: u8,
}

impl LexicalHit {
    /// Relevance normalized to [0, 1]
    pub fn score(&self) -> f32 {
        f32::from(self.relevance.min(TITLE_MATCH)) / f32::from(TITLE_MATCH)
    }
}

/// Read access to documents
pub trait DocumentStore: Send + Sync {
    /// Fetch a document regardless of status; `None` if the id is unknown
    fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// Ids of every active document, oldest first
    fn list_active_documents(&self) -> Result<Vec<i64>>;
}

/// Writes used by ingestion and the command line
pub trait DocumentWriter: DocumentStore {
    fn insert_document(&self, document: NewDocument) -> Result<i64>;

    /// Flag a document deleted; returns false if it was unknown or already deleted
    fn mark_deleted(&self, id: i64) -> Result<bool>;

    fn set_domain(&self, id: i64, domain: &str) -> Result<()>;
}

/// Substring search over active documents
pub trait LexicalSearch: Send + Sync {
    /// Rows ordered by relevance, newest first within a relevance tag
    fn search(&self, pattern: &str, domain: Option<&str>, limit: usize) -> Result<Vec<LexicalHit>>;
}
