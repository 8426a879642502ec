//! Embedding generation
//!
//! Backends are a closed set ([`EmbeddingBackend`]) driven by a [`ProviderChain`]
//! that selects a primary provider at startup and falls back per call on quota,
//! rate-limit, auth, timeout and availability failures.
//!
//! - `openai` / `gemini`: HTTP APIs, keys from the environment
//! - `local`: FastEmbed model in-process
//! - `hashing`: deterministic feature hashing, always available
mod batch;
mod chain;
mod hashing;
mod local;
mod provider;
mod remote;

pub use batch::BatchEmbedder;
pub use chain::{Embedding, EmbeddingBackend, ProviderChain};
pub use hashing::HashingProvider;
pub use local::LocalProvider;
pub use provider::{
    classify_http, EmbeddingError, ProviderError, ProviderErrorKind, ProviderKind,
};
pub use remote::{GeminiProvider, OpenAiProvider};
