//! Vector index adapter
//!
//! Chunk vectors live in per-domain collections. Queries return raw L2 distances;
//! callers convert with [`similarity_from_distance`].

mod hnsw;

pub use hnsw::HnswVectorStore;

use crate::chunking::ChunkKind;
use crate::embedding::ProviderKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),

    #[error("Dimension mismatch in domain '{domain}': expected {expected}, got {actual}")]
    DimensionMismatch {
        domain: String,
        expected: usize,
        actual: usize,
    },

    #[error("Insert failed: {0}")]
    Insert(String),
}

/// Which collections a query or delete touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainScope<'a> {
    One(&'a str),
    All,
}

impl<'a> DomainScope<'a> {
    pub fn from_filter(domain: Option<&'a str>) -> Self {
        match domain {
            Some(domain) => DomainScope::One(domain),
            None => DomainScope::All,
        }
    }
}

/// Metadata stored beside every chunk vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: i64,
    pub position: usize,
    pub kind: ChunkKind,
    pub text: String,
    pub domain: String,
    pub provider: ProviderKind,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    /// L2 distance to the query vector
    pub distance: f32,
    pub metadata: ChunkMetadata,
}

impl VectorHit {
    pub fn similarity(&self) -> f32 {
        similarity_from_distance(self.distance)
    }
}

/// Per-domain index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub vectors: usize,
    pub dimension: usize,
    /// Deleted or replaced vectors still held by the index
    pub tombstones: usize,
}

/// `1 / (1 + distance)`: 1.0 for an exact match, approaching 0 with distance
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Stable identifier of a chunk vector
pub fn chunk_id(document_id: i64, position: usize) -> String {
    format!("doc_{}_chunk_{}", document_id, position)
}

/// Similarity search over chunk vectors
///
/// Implementations provide their own read/write isolation so ingestion can run
/// alongside queries.
pub trait VectorStore: Send + Sync {
    /// Insert or replace one chunk vector
    fn upsert(
        &self,
        domain: &str,
        chunk_id: &str,
        vector: &[f32],
        metadata: ChunkMetadata,
    ) -> Result<(), VectorIndexError>;

    /// Nearest neighbours ordered by ascending distance
    fn query(
        &self,
        scope: DomainScope<'_>,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, VectorIndexError>;

    /// Remove every vector of a document; returns how many were removed
    fn delete_by_document(
        &self,
        scope: DomainScope<'_>,
        document_id: i64,
    ) -> Result<usize, VectorIndexError>;

    /// Drop every collection
    fn clear(&self) -> Result<(), VectorIndexError>;

    fn stats(&self) -> Vec<DomainStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_conversion() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(1.0), 0.5);
        assert!(similarity_from_distance(100.0) < 0.01);
        assert_eq!(similarity_from_distance(-0.5), 1.0);
    }

    #[test]
    fn test_scope_from_filter() {
        assert_eq!(DomainScope::from_filter(None), DomainScope::All);
        assert_eq!(
            DomainScope::from_filter(Some("science")),
            DomainScope::One("science")
        );
    }
}
