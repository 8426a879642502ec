//! HTTP embedding providers
//!
//! Both speak JSON over `reqwest`. Non-success responses are classified into
//! [`ProviderErrorKind`]s so the chain can decide whether to fall back.

use super::provider::{ProviderError, ProviderErrorKind, ProviderKind};
use crate::config::RemoteProviderConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

fn read_api_key(provider: ProviderKind, env_var: &str) -> Result<String, ProviderError> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        Ok(_) => Err(ProviderError::new(
            provider,
            ProviderErrorKind::Auth,
            format!("Environment variable {} is empty", env_var),
        )),
        Err(_) => Err(ProviderError::new(
            provider,
            ProviderErrorKind::Auth,
            format!("Environment variable {} is not set", env_var),
        )),
    }
}

fn build_client(provider: ProviderKind, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::new(provider, ProviderErrorKind::Backend, e.to_string()))
}

/// Send a request and decode a successful JSON body
async fn send_json<R: DeserializeOwned>(
    provider: ProviderKind,
    request: reqwest::RequestBuilder,
) -> Result<R, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_transport(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_http(provider, status.as_u16(), &body));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| ProviderError::new(provider, ProviderErrorKind::InvalidResponse, e.to_string()))
}

fn check_vector(
    provider: ProviderKind,
    vector: Vec<f32>,
    expected: usize,
) -> Result<Vec<f32>, ProviderError> {
    if vector.len() != expected {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::InvalidResponse,
            format!("expected {} dimensions, got {}", expected, vector.len()),
        ));
    }
    Ok(vector)
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiData>,
}

#[derive(Deserialize)]
struct OpenAiData {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/v1/embeddings` provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimensions: usize,
}

impl OpenAiProvider {
    /// Build from configuration, reading the API key from the configured variable
    pub fn from_config(config: &RemoteProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = read_api_key(ProviderKind::OpenAi, &config.api_key_env)?;
        Self::new(api_key, config, timeout)
    }

    pub fn new(
        api_key: impl Into<String>,
        config: &RemoteProviderConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(ProviderKind::OpenAi, timeout)?,
            api_key: api_key.into(),
            model: config.model.clone(),
            endpoint: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            dimensions: config.dimensions,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!("OpenAI embedding request to {}", self.endpoint);

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                input: text,
                dimensions: self.dimensions,
            });

        let response: OpenAiResponse = send_json(ProviderKind::OpenAi, request).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderKind::OpenAi,
                    ProviderErrorKind::InvalidResponse,
                    "response contained no embeddings",
                )
            })?;

        check_vector(ProviderKind::OpenAi, vector, self.dimensions)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    model: String,
    content: GeminiContent<'a>,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    embedding: GeminiEmbedding,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

/// Google Generative Language `:embedContent` provider
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    dimensions: usize,
}

impl GeminiProvider {
    pub fn from_config(config: &RemoteProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let api_key = read_api_key(ProviderKind::Gemini, &config.api_key_env)?;
        Self::new(api_key, config, timeout)
    }

    pub fn new(
        api_key: impl Into<String>,
        config: &RemoteProviderConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let model = config.model.trim_start_matches("models/").to_string();
        Ok(Self {
            client: build_client(ProviderKind::Gemini, timeout)?,
            api_key: api_key.into(),
            endpoint: format!(
                "{}/v1beta/models/{}:embedContent",
                config.base_url.trim_end_matches('/'),
                model
            ),
            model,
            dimensions: config.dimensions,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        debug!("Gemini embedding request to {}", self.endpoint);

        let request = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&GeminiRequest {
                model: format!("models/{}", self.model),
                content: GeminiContent {
                    parts: [GeminiPart { text }],
                },
                output_dimensionality: self.dimensions,
            });

        let response: GeminiResponse = send_json(ProviderKind::Gemini, request).await?;
        check_vector(ProviderKind::Gemini, response.embedding.values, self.dimensions)
    }
}
