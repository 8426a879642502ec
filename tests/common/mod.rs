//! Shared fixtures for integration tests

#![allow(dead_code)]

use kbscope::config::{Config, RemoteProviderConfig};
use kbscope::embedding::{EmbeddingBackend, HashingProvider, OpenAiProvider, ProviderChain};
use kbscope::index::HnswVectorStore;
use kbscope::retrieval::{Ingestor, Retriever};
use kbscope::storage::{DocumentWriter, NewDocument, SqliteStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Handler = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// Minimal HTTP server answering each request through a handler
pub struct MockServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockServer {
    /// Answer every request with one canned response
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self::with_handler(Duration::ZERO, move |_| (status, body.clone())).await
    }

    /// Answer each request from its body after `delay`, tracking concurrent requests
    pub async fn with_handler<F>(delay: Duration, handler: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak_in_flight = Arc::new(AtomicUsize::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        let counter = hits.clone();
        let peak = peak_in_flight.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                let counter = counter.clone();
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);

                    tokio::time::sleep(delay).await;
                    let (status, body) = handler(&request);
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    let response = format!(
                        "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
            peak_in_flight,
        }
    }

    /// Accept connections and read requests but never answer
    pub async fn hanging() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        tokio::spawn(async move {
            let mut open = Vec::new();
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                if read_request(&mut socket).await.is_some() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                open.push(socket);
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            hits,
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Most requests that were being handled at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Read headers and a Content-Length body, returning the body
async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    Some(String::from_utf8_lossy(&buf[header_end..]).into_owned())
}

pub fn openai_backend(base_url: &str, dimensions: usize) -> EmbeddingBackend {
    let config = RemoteProviderConfig {
        api_key_env: "UNUSED".to_string(),
        model: "text-embedding-3-small".to_string(),
        base_url: base_url.to_string(),
        dimensions,
    };
    EmbeddingBackend::OpenAi(
        OpenAiProvider::new("test-key", &config, Duration::from_secs(5)).unwrap(),
    )
}

pub fn openai_success_body(vector: &[f32]) -> String {
    serde_json::json!({
        "object": "list",
        "data": [{ "object": "embedding", "index": 0, "embedding": vector }],
        "model": "text-embedding-3-small"
    })
    .to_string()
}

pub async fn hashing_chain(dimensions: usize) -> Arc<ProviderChain> {
    Arc::new(
        ProviderChain::with_backends(
            vec![EmbeddingBackend::Hashing(HashingProvider::new(dimensions))],
            Duration::from_secs(5),
            true,
        )
        .await,
    )
}

/// SQLite store, in-memory vector index and a hashing embedder wired together
pub struct KnowledgeBase {
    _dir: TempDir,
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub vectors: Arc<HnswVectorStore>,
    pub chain: Arc<ProviderChain>,
    pub ingestor: Ingestor,
}

impl KnowledgeBase {
    pub async fn new(config: Config) -> Self {
        let chain = hashing_chain(256).await;
        Self::with_chain(config, chain)
    }

    pub fn with_chain(config: Config, chain: Arc<ProviderChain>) -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("kb.db")).unwrap());
        let vectors = Arc::new(HnswVectorStore::new(config.index.clone()));
        let ingestor = Ingestor::new(&config, store.clone(), vectors.clone(), chain.clone());
        Self {
            _dir: dir,
            config,
            store,
            vectors,
            chain,
            ingestor,
        }
    }

    pub fn add(&self, title: &str, content: &str, domain: Option<&str>) -> i64 {
        self.store
            .insert_document(NewDocument {
                title: title.to_string(),
                content: content.to_string(),
                domain: domain.map(str::to_string),
            })
            .unwrap()
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            &self.config,
            self.store.clone(),
            self.store.clone(),
            self.chain.clone(),
            self.vectors.clone(),
        )
        .unwrap()
    }
}
