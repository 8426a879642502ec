//! kbscope - scope-aware hybrid retrieval over a document knowledge base
//!
//! Documents are chunked and embedded through a fallback chain of embedding
//! providers, indexed per domain, and retrieved with a fusion of substring and
//! vector search. Every query result carries a scope decision, a confidence score
//! and the knowledge gaps found in the evidence.

pub mod analysis;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod scope;
pub mod storage;

pub use error::{KbError, Result};
