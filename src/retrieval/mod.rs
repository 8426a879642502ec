//! Hybrid retrieval
//!
//! Query analysis, the lexical and semantic legs, score fusion, scope and
//! confidence annotation, plus the ingestion pipeline that feeds the vector index.

mod fusion;
mod hybrid;
mod ingest;

pub use fusion::{
    FusionRanker, LexicalCandidate, RankedDocument, Relevance, SearchKind, SearchStrategy,
    SemanticCandidate,
};
pub use hybrid::{Citation, QueryOutcome, Retriever, SearchRequest};
pub use ingest::{IngestSummary, Ingestor};

use thiserror::Error;

/// Failures of a single query or retrieval leg
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector index unavailable: {0}")]
    VectorIndexUnavailable(String),

    #[error("Lexical search failed: {0}")]
    LexicalSearch(String),

    #[error("Document lookup failed: {0}")]
    Storage(String),
}
