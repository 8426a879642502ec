//! Document ingestion: classify, chunk, embed and index

use crate::analysis::DomainClassifier;
use crate::chunking::Chunker;
use crate::config::Config;
use crate::embedding::{BatchEmbedder, ProviderChain};
use crate::error::{KbError, Result};
use crate::index::{chunk_id, ChunkMetadata, DomainScope, DomainStats, VectorStore};
use crate::storage::{DocumentWriter, GENERAL_DOMAIN};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Totals of an `ingest_all` or `reindex_all` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub failed: usize,
}

/// Feeds documents from storage into the vector index
pub struct Ingestor {
    store: Arc<dyn DocumentWriter>,
    vectors: Arc<dyn VectorStore>,
    embedder: BatchEmbedder,
    chunker: Chunker,
    classifier: DomainClassifier,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentWriter>,
        vectors: Arc<dyn VectorStore>,
        chain: Arc<ProviderChain>,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder: BatchEmbedder::new(chain, config.embedding.max_concurrent),
            chunker: Chunker::new(config.chunking.target_size),
            classifier: DomainClassifier::new(&config.domains),
        }
    }

    /// Embed and index one document, replacing its previous vectors
    ///
    /// Returns the number of chunks indexed; deleted documents index nothing.
    pub async fn ingest_document(&self, id: i64) -> Result<usize> {
        let document = self
            .store
            .get_document(id)?
            .ok_or(KbError::DocumentNotFound { id })?;

        if !document.is_active() {
            debug!("Skipping deleted document {}", id);
            return Ok(0);
        }

        let mut domain = document.domain.clone();
        if domain == GENERAL_DOMAIN {
            let detected = self
                .classifier
                .classify_document(&document.title, &document.content);
            if detected != GENERAL_DOMAIN {
                debug!("Document {} classified as '{}'", id, detected);
                self.store.set_domain(id, &detected)?;
                domain = detected;
            }
        }

        let chunks = self.chunker.chunk(&document.title, &document.content);
        let texts = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_all(texts).await?;

        let count = chunks.len();
        self.vectors.delete_by_document(DomainScope::All, id)?;
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let key = chunk_id(id, chunk.position);
            let metadata = ChunkMetadata {
                document_id: id,
                position: chunk.position,
                kind: chunk.kind,
                text: chunk.text,
                domain: domain.clone(),
                provider: embedding.provider,
            };
            self.vectors.upsert(&domain, &key, &embedding.vector, metadata)?;
        }

        debug!("Indexed document {} into '{}' ({} chunks)", id, domain, count);
        Ok(count)
    }

    /// Index every active document; failures are logged and counted
    pub async fn ingest_all(&self) -> Result<IngestSummary> {
        let ids = self.store.list_active_documents()?;
        let mut summary = IngestSummary::default();

        for id in ids {
            match self.ingest_document(id).await {
                Ok(chunks) => {
                    summary.documents += 1;
                    summary.chunks += chunks;
                }
                Err(e) => {
                    warn!("Failed to ingest document {}: {}", id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Ingested {} documents ({} chunks, {} failed)",
            summary.documents, summary.chunks, summary.failed
        );
        Ok(summary)
    }

    /// Drop the whole index and rebuild it, e.g. after switching providers
    pub async fn reindex_all(&self) -> Result<IngestSummary> {
        info!("Clearing vector index for full re-embedding");
        self.vectors.clear()?;
        self.ingest_all().await
    }

    /// Mark a document deleted and remove its vectors in the background
    ///
    /// Returns false when the document was unknown or already deleted. Queries
    /// filter stale vectors until the removal task finishes.
    pub async fn remove_document(&self, id: i64) -> Result<bool> {
        if !self.store.mark_deleted(id)? {
            return Ok(false);
        }

        let vectors = Arc::clone(&self.vectors);
        tokio::spawn(async move {
            match vectors.delete_by_document(DomainScope::All, id) {
                Ok(removed) => debug!("Removed {} vectors of deleted document {}", removed, id),
                Err(e) => warn!("Vector removal for document {} failed: {}", id, e),
            }
        });

        Ok(true)
    }

    pub fn index_stats(&self) -> Vec<DomainStats> {
        self.vectors.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingBackend, HashingProvider};
    use crate::index::HnswVectorStore;
    use crate::storage::{DocumentStore, NewDocument, SqliteStore};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<SqliteStore>,
        vectors: Arc<HnswVectorStore>,
        ingestor: Ingestor,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        let store = Arc::new(SqliteStore::open(&dir.path().join("kb.db")).unwrap());
        let vectors = Arc::new(HnswVectorStore::new(config.index.clone()));
        let chain = Arc::new(
            ProviderChain::with_backends(
                vec![EmbeddingBackend::Hashing(HashingProvider::new(64))],
                Duration::from_secs(5),
                false,
            )
            .await,
        );
        let ingestor = Ingestor::new(&config, store.clone(), vectors.clone(), chain);
        Fixture {
            _dir: dir,
            store,
            vectors,
            ingestor,
        }
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

    #[tokio::test]
    async fn test_ingest_document_indexes_every_chunk() {
        let f = fixture().await;
        let id = add(&f.store, "Rust", "First paragraph.\n\nSecond paragraph.", Some("technology"));

        let chunks = f.ingestor.ingest_document(id).await.unwrap();
        assert_eq!(chunks, 2);

        let stats = f.ingestor.index_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].domain, "technology");
        assert_eq!(stats[0].vectors, 2);
        assert_eq!(stats[0].dimension, 64);
    }

    #[tokio::test]
    async fn test_reingest_replaces_vectors() {
        let f = fixture().await;
        let id = add(&f.store, "Notes", "Only body.", Some("business"));

        f.ingestor.ingest_document(id).await.unwrap();
        f.ingestor.ingest_document(id).await.unwrap();

        assert_eq!(f.ingestor.index_stats()[0].vectors, 2);
    }

    #[tokio::test]
    async fn test_general_documents_are_classified() {
        let f = fixture().await;
        let id = add(
            &f.store,
            "Clinic handbook",
            "Patient intake, diagnosis and treatment steps.",
            None,
        );

        f.ingestor.ingest_document(id).await.unwrap();

        let document = f.store.get_document(id).unwrap().unwrap();
        assert_eq!(document.domain, "healthcare");
        assert_eq!(f.ingestor.index_stats()[0].domain, "healthcare");
    }

    #[tokio::test]
    async fn test_deleted_and_unknown_documents() {
        let f = fixture().await;
        let id = add(&f.store, "Gone", "Deleted body.", None);
        f.store.mark_deleted(id).unwrap();

        assert_eq!(f.ingestor.ingest_document(id).await.unwrap(), 0);
        assert!(f.ingestor.index_stats().is_empty());

        let missing = f.ingestor.ingest_document(9999).await;
        assert!(matches!(missing, Err(KbError::DocumentNotFound { id: 9999 })));
    }

    #[tokio::test]
    async fn test_ingest_all_and_reindex() {
        let f = fixture().await;
        add(&f.store, "One", "Body one.", Some("science"));
        add(&f.store, "Two", "Body two.", Some("science"));

        let summary = f.ingestor.ingest_all().await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                documents: 2,
                chunks: 4,
                failed: 0
            }
        );

        let summary = f.ingestor.reindex_all().await.unwrap();
        assert_eq!(summary.chunks, 4);
        assert_eq!(f.vectors.len(), 4);
    }

    #[tokio::test]
    async fn test_remove_document() {
        let f = fixture().await;
        let id = add(&f.store, "Temp", "Short lived.", Some("science"));
        f.ingestor.ingest_document(id).await.unwrap();

        assert!(f.ingestor.remove_document(id).await.unwrap());
        assert!(!f.ingestor.remove_document(id).await.unwrap());
        assert!(!f.store.get_document(id).unwrap().unwrap().is_active());

        for _ in 0..50 {
            if f.vectors.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(f.vectors.is_empty());
    }
}
