//! Priority-ordered embedding provider chain
//!
//! The chain probes its providers once at construction and commits to the first
//! one that answers. Each `embed` call starts at that provider; a fallback-class
//! failure retries the same text on the remaining dimension-compatible providers
//! in priority order. The selection itself never changes after construction.

use super::hashing::HashingProvider;
use super::local::LocalProvider;
use super::provider::{EmbeddingError, ProviderError, ProviderErrorKind, ProviderKind};
use super::remote::{GeminiProvider, OpenAiProvider};
use crate::config::EmbeddingConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_TEXT: &str = "connection test";

/// One embedding backend
pub enum EmbeddingBackend {
    OpenAi(OpenAiProvider),
    Gemini(GeminiProvider),
    Local(LocalProvider),
    Hashing(HashingProvider),
}

impl EmbeddingBackend {
    /// Construct a backend, checking its prerequisites (credentials, model load)
    pub async fn from_config(
        kind: ProviderKind,
        config: &EmbeddingConfig,
    ) -> Result<Self, ProviderError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        match kind {
            ProviderKind::OpenAi => {
                OpenAiProvider::from_config(&config.openai, timeout).map(Self::OpenAi)
            }
            ProviderKind::Gemini => {
                GeminiProvider::from_config(&config.gemini, timeout).map(Self::Gemini)
            }
            ProviderKind::Local => {
                let model = config.local.model.clone();
                tokio::task::spawn_blocking(move || LocalProvider::new(&model))
                    .await
                    .map_err(|e| {
                        ProviderError::new(kind, ProviderErrorKind::Backend, e.to_string())
                    })?
                    .map(Self::Local)
            }
            ProviderKind::Hashing => Ok(Self::Hashing(HashingProvider::new(
                config.hashing.dimensions,
            ))),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAi(_) => ProviderKind::OpenAi,
            Self::Gemini(_) => ProviderKind::Gemini,
            Self::Local(_) => ProviderKind::Local,
            Self::Hashing(_) => ProviderKind::Hashing,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::OpenAi(p) => p.dimension(),
            Self::Gemini(p) => p.dimension(),
            Self::Local(p) => p.dimension(),
            Self::Hashing(p) => p.dimension(),
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Self::OpenAi(p) => p.model_name(),
            Self::Gemini(p) => p.model_name(),
            Self::Local(p) => p.model_name(),
            Self::Hashing(p) => p.model_name(),
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            Self::OpenAi(p) => p.embed(text).await,
            Self::Gemini(p) => p.embed(text).await,
            Self::Local(p) => p.embed(text).await,
            Self::Hashing(p) => p.embed(text),
        }
    }
}

/// A vector and the provider that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub provider: ProviderKind,
}

/// Resilient multi-provider embedder
pub struct ProviderChain {
    backends: Vec<EmbeddingBackend>,
    selected: Option<usize>,
    call_timeout: Duration,
}

impl ProviderChain {
    /// Build every configured provider whose prerequisites hold, then select the primary
    pub async fn connect(config: &EmbeddingConfig) -> Self {
        let mut backends = Vec::new();
        for kind in &config.providers {
            match EmbeddingBackend::from_config(*kind, config).await {
                Ok(backend) => backends.push(backend),
                Err(e) => warn!("Skipping embedding provider {}: {}", kind, e),
            }
        }

        Self::with_backends(
            backends,
            Duration::from_millis(config.timeout_ms),
            config.probe_on_startup,
        )
        .await
    }

    /// Build a chain from ready backends in priority order
    ///
    /// With `probe` set, each backend gets one test call and the first to succeed is
    /// selected; otherwise the first backend is selected as-is.
    pub async fn with_backends(
        backends: Vec<EmbeddingBackend>,
        call_timeout: Duration,
        probe: bool,
    ) -> Self {
        let mut chain = Self {
            backends,
            selected: None,
            call_timeout,
        };
        chain.selected = chain.select_primary(probe).await;

        match chain.primary() {
            Some(backend) => info!(
                "Selected embedding provider: {} ({}, {}D)",
                backend.kind(),
                backend.model_name(),
                backend.dimension()
            ),
            None => warn!("No embedding provider available; semantic search is disabled"),
        }

        chain
    }

    async fn select_primary(&self, probe: bool) -> Option<usize> {
        if !probe {
            return (!self.backends.is_empty()).then_some(0);
        }

        for (idx, backend) in self.backends.iter().enumerate() {
            match self.call(backend, PROBE_TEXT).await {
                Ok(_) => return Some(idx),
                Err(e) => warn!("Embedding provider {} failed startup probe: {}", backend.kind(), e),
            }
        }
        None
    }

    /// The globally selected provider
    pub fn primary(&self) -> Option<&EmbeddingBackend> {
        self.selected.and_then(|idx| self.backends.get(idx))
    }

    /// Dimensionality of vectors this chain produces
    pub fn dimension(&self) -> Option<usize> {
        self.primary().map(EmbeddingBackend::dimension)
    }

    pub fn is_available(&self) -> bool {
        self.selected.is_some()
    }

    /// Provider identities in priority order
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.backends.iter().map(EmbeddingBackend::kind).collect()
    }

    /// Embed one text, falling back across providers for this call only
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let primary_idx = self.selected.ok_or_else(|| {
            EmbeddingError::Unavailable("no embedding provider is selected".to_string())
        })?;

        let mut failures = Vec::new();
        for idx in self.call_order(primary_idx) {
            let backend = &self.backends[idx];
            match self.call(backend, text).await {
                Ok(vector) => {
                    if idx != primary_idx {
                        info!(
                            "Embedding fallback: {} -> {} (success)",
                            self.backends[primary_idx].kind(),
                            backend.kind()
                        );
                    }
                    return Ok(Embedding {
                        vector,
                        provider: backend.kind(),
                    });
                }
                Err(e) if e.triggers_fallback() => {
                    warn!("Embedding provider {} failed, trying next: {}", backend.kind(), e);
                    failures.push(e.to_string());
                }
                Err(e) => return Err(EmbeddingError::InvalidInput(e.to_string())),
            }
        }

        Err(EmbeddingError::Unavailable(failures.join("; ")))
    }

    /// Primary first, then every other provider producing the same dimensionality
    fn call_order(&self, primary_idx: usize) -> Vec<usize> {
        let dimension = self.backends[primary_idx].dimension();
        let mut order = vec![primary_idx];
        for (idx, backend) in self.backends.iter().enumerate() {
            if idx == primary_idx {
                continue;
            }
            if backend.dimension() == dimension {
                order.push(idx);
            } else {
                debug!(
                    "Provider {} excluded from fallback: {}D vs {}D",
                    backend.kind(),
                    backend.dimension(),
                    dimension
                );
            }
        }
        order
    }

    async fn call(&self, backend: &EmbeddingBackend, text: &str) -> Result<Vec<f32>, ProviderError> {
        match tokio::time::timeout(self.call_timeout, backend.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::new(
                backend.kind(),
                ProviderErrorKind::Timeout,
                format!("no response within {:?}", self.call_timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashing(dimension: usize) -> EmbeddingBackend {
        EmbeddingBackend::Hashing(HashingProvider::new(dimension))
    }

    #[tokio::test]
    async fn test_probe_skips_failing_provider() {
        // A zero-dimension hashing backend always fails
        let chain = ProviderChain::with_backends(
            vec![hashing(0), hashing(16)],
            Duration::from_secs(1),
            true,
        )
        .await;

        assert_eq!(chain.dimension(), Some(16));
        let embedding = chain.embed("hello world").await.unwrap();
        assert_eq!(embedding.vector.len(), 16);
        assert_eq!(embedding.provider, ProviderKind::Hashing);
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let chain = ProviderChain::with_backends(Vec::new(), Duration::from_secs(1), true).await;
        assert!(!chain.is_available());
        assert!(matches!(
            chain.embed("hello").await,
            Err(EmbeddingError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_incompatible_dimension_is_not_a_fallback() {
        // Primary selected without probing, so it fails at call time
        let chain = ProviderChain::with_backends(
            vec![hashing(0), hashing(16)],
            Duration::from_secs(1),
            false,
        )
        .await;

        assert!(matches!(
            chain.embed("hello").await,
            Err(EmbeddingError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let chain =
            ProviderChain::with_backends(vec![hashing(8)], Duration::from_secs(1), true).await;
        assert!(matches!(
            chain.embed("  \n").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_skips_unconfigured_remote() {
        let mut config = EmbeddingConfig::default();
        config.providers = vec![ProviderKind::OpenAi, ProviderKind::Hashing];
        config.openai.api_key_env = "KBSCOPE_TEST_MISSING_OPENAI_KEY".to_string();
        config.hashing.dimensions = 32;

        let chain = ProviderChain::connect(&config).await;
        assert_eq!(chain.providers(), vec![ProviderKind::Hashing]);
        assert_eq!(chain.dimension(), Some(32));
    }
}
