//! Provider fallback against mock embedding APIs

mod common;

use common::{openai_backend, openai_success_body, MockServer};
use kbscope::embedding::{
    BatchEmbedder, EmbeddingBackend, EmbeddingError, HashingProvider, ProviderChain, ProviderKind,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const QUOTA_BODY: &str = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;

#[tokio::test]
async fn test_quota_error_falls_back_to_next_provider() {
    let exhausted = MockServer::start(429, QUOTA_BODY).await;
    let healthy = MockServer::start(200, openai_success_body(&[0.1, 0.2, 0.3])).await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&exhausted.base_url, 3),
            openai_backend(&healthy.base_url, 3),
        ],
        Duration::from_secs(5),
        false,
    )
    .await;

    let embedding = chain.embed("what is artificial intelligence").await.unwrap();

    assert_eq!(embedding.vector, vec![0.1, 0.2, 0.3]);
    assert_eq!(exhausted.hits(), 1);
    assert_eq!(healthy.hits(), 1);
    // Selection is not demoted by a per-call fallback
    assert_eq!(chain.primary().map(EmbeddingBackend::kind), Some(ProviderKind::OpenAi));
}

#[tokio::test]
async fn test_auth_and_server_errors_fall_back() {
    let unauthorized = MockServer::start(401, r#"{"error":"invalid api key"}"#).await;
    let broken = MockServer::start(503, "upstream unavailable").await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&unauthorized.base_url, 8),
            openai_backend(&broken.base_url, 8),
            EmbeddingBackend::Hashing(HashingProvider::new(8)),
        ],
        Duration::from_secs(5),
        false,
    )
    .await;

    let embedding = chain.embed("quarterly revenue").await.unwrap();
    assert_eq!(embedding.provider, ProviderKind::Hashing);
    assert_eq!(embedding.vector.len(), 8);
    assert_eq!(unauthorized.hits(), 1);
    assert_eq!(broken.hits(), 1);
}

#[tokio::test]
async fn test_every_provider_failing_is_unavailable() {
    let limited = MockServer::start(429, r#"{"error":"rate limit reached"}"#).await;
    let exhausted = MockServer::start(402, QUOTA_BODY).await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&limited.base_url, 4),
            openai_backend(&exhausted.base_url, 4),
        ],
        Duration::from_secs(5),
        false,
    )
    .await;

    let result = chain.embed("anything").await;
    assert!(matches!(result, Err(EmbeddingError::Unavailable(_))));
}

#[tokio::test]
async fn test_probe_selects_first_working_provider() {
    let exhausted = MockServer::start(429, QUOTA_BODY).await;
    let healthy = MockServer::start(200, openai_success_body(&[1.0, 0.0])).await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&exhausted.base_url, 2),
            openai_backend(&healthy.base_url, 2),
        ],
        Duration::from_secs(5),
        true,
    )
    .await;

    assert!(chain.is_available());
    assert_eq!(exhausted.hits(), 1);
    assert_eq!(healthy.hits(), 1);

    // The selected provider is tried first from now on
    chain.embed("hello").await.unwrap();
    assert_eq!(exhausted.hits(), 1);
    assert_eq!(healthy.hits(), 2);
}

#[tokio::test]
async fn test_malformed_response_falls_back() {
    let wrong_size = MockServer::start(200, openai_success_body(&[1.0, 2.0])).await;
    let healthy = MockServer::start(200, openai_success_body(&[0.5, 0.5, 0.5])).await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&wrong_size.base_url, 3),
            openai_backend(&healthy.base_url, 3),
        ],
        Duration::from_secs(5),
        false,
    )
    .await;

    let embedding = chain.embed("text").await.unwrap();
    assert_eq!(embedding.vector, vec![0.5, 0.5, 0.5]);
}

#[tokio::test]
async fn test_timeout_falls_back_to_same_dimension_provider() {
    let stalled = MockServer::hanging().await;

    let chain = ProviderChain::with_backends(
        vec![
            openai_backend(&stalled.base_url, 8),
            EmbeddingBackend::Hashing(HashingProvider::new(8)),
        ],
        Duration::from_millis(200),
        false,
    )
    .await;

    let started = Instant::now();
    let embedding = chain.embed("slow upstream").await.unwrap();

    assert_eq!(embedding.provider, ProviderKind::Hashing);
    assert_eq!(embedding.vector.len(), 8);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(chain.primary().map(EmbeddingBackend::kind), Some(ProviderKind::OpenAi));
}

/// Answers `{"input": "text N"}` with the vector `[N, 1]`
fn numbered_vector(request: &str) -> (u16, String) {
    let body: serde_json::Value = serde_json::from_str(request).unwrap();
    let input = body["input"].as_str().unwrap();
    let n: f32 = input.trim_start_matches("text ").parse().unwrap();
    (200, openai_success_body(&[n, 1.0]))
}

#[tokio::test]
async fn test_batch_bounds_concurrency_and_keeps_order() {
    let server = MockServer::with_handler(Duration::from_millis(50), numbered_vector).await;
    let chain = Arc::new(
        ProviderChain::with_backends(
            vec![openai_backend(&server.base_url, 2)],
            Duration::from_secs(5),
            false,
        )
        .await,
    );
    let embedder = BatchEmbedder::new(chain, 3);

    let texts: Vec<String> = (0..12).map(|i| format!("text {}", i)).collect();
    let embeddings = embedder.embed_all(texts).await.unwrap();

    assert_eq!(server.hits(), 12);
    assert!(server.peak_in_flight() <= 3, "peak {}", server.peak_in_flight());
    assert!(server.peak_in_flight() > 1);
    let firsts: Vec<f32> = embeddings.iter().map(|e| e.vector[0]).collect();
    let expected: Vec<f32> = (0..12).map(|i| i as f32).collect();
    assert_eq!(firsts, expected);
}
