/// In-process embedding via FastEmbed
use super::provider::{ProviderError, ProviderErrorKind, ProviderKind};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// Local sentence-embedding model
///
/// Models are downloaded on first use to the FastEmbed cache:
/// - all-MiniLM-L6-v2: ~90MB (384 dims), default
/// - bge-small-en-v1.5: ~130MB (384 dims)
/// - bge-base-en-v1.5: ~440MB (768 dims)
pub struct LocalProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl LocalProvider {
    /// Load the model. Blocking; call from the blocking pool inside async code.
    pub fn new(model_name: &str) -> Result<Self, ProviderError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(ProviderError::new(
                    ProviderKind::Local,
                    ProviderErrorKind::Backend,
                    format!(
                        "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                        model_name
                    ),
                ));
            }
        };

        tracing::info!("Initializing local embedding model: {} ({}D)", model_name, dimension);

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(false);
        let model = TextEmbedding::try_new(init_options).map_err(|e| {
            ProviderError::new(ProviderKind::Local, ProviderErrorKind::Backend, e.to_string())
        })?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let model = Arc::clone(&self.model);
        let input = vec![text.to_string()];

        let embeddings = tokio::task::spawn_blocking(move || model.embed(input, None))
            .await
            .map_err(|e| {
                ProviderError::new(ProviderKind::Local, ProviderErrorKind::Backend, e.to_string())
            })?
            .map_err(|e| {
                ProviderError::new(ProviderKind::Local, ProviderErrorKind::Backend, e.to_string())
            })?;

        let vector = embeddings.into_iter().next().ok_or_else(|| {
            ProviderError::new(
                ProviderKind::Local,
                ProviderErrorKind::InvalidResponse,
                "No embeddings generated",
            )
        })?;

        if vector.len() != self.dimension {
            return Err(ProviderError::new(
                ProviderKind::Local,
                ProviderErrorKind::InvalidResponse,
                format!("expected {} dimensions, got {}", self.dimension, vector.len()),
            ));
        }

        Ok(vector)
    }
}
