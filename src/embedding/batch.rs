/// Bounded-concurrency embedding of many texts
use super::chain::{Embedding, ProviderChain};
use super::provider::EmbeddingError;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Embeds many texts through the chain with at most `max_concurrent` calls in flight
pub struct BatchEmbedder {
    chain: Arc<ProviderChain>,
    semaphore: Arc<Semaphore>,
}

impl BatchEmbedder {
    pub fn new(chain: Arc<ProviderChain>, max_concurrent: usize) -> Self {
        Self {
            chain,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn chain(&self) -> &Arc<ProviderChain> {
        &self.chain
    }

    /// Embed every text, returning vectors in input order
    ///
    /// Fails as a whole if any single text cannot be embedded.
    pub async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Embedding>, EmbeddingError> {
        let total = texts.len();
        let mut tasks = JoinSet::new();

        for (idx, text) in texts.into_iter().enumerate() {
            let chain = Arc::clone(&self.chain);
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EmbeddingError::Task(e.to_string()))?;
                chain.embed(&text).await.map(|embedding| (idx, embedding))
            });
        }

        let mut results: Vec<Option<Embedding>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (idx, embedding) = joined.map_err(|e| EmbeddingError::Task(e.to_string()))??;
            results[idx] = Some(embedding);
        }

        debug!("Embedded {} texts", total);

        results
            .into_iter()
            .map(|slot| slot.ok_or_else(|| EmbeddingError::Task("missing embedding".to_string())))
            .collect()
    }
}
