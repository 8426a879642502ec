/// Provider identities, provider failures and their classification
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Embedding backend identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Local,
    Hashing,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Local => "local",
            ProviderKind::Hashing => "hashing",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "gemini" => Ok(ProviderKind::Gemini),
            "local" | "sentence_transformers" | "fastembed" => Ok(ProviderKind::Local),
            "hashing" => Ok(ProviderKind::Hashing),
            other => Err(format!(
                "Unknown provider '{}'. Supported: openai, gemini, local, hashing",
                other
            )),
        }
    }
}

/// Classification of a single provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Quota exhausted or insufficient balance
    Quota,
    RateLimit,
    /// Missing, invalid or revoked credentials
    Auth,
    Timeout,
    /// Connection could not be established
    Unreachable,
    /// 5xx from the remote service
    Server,
    /// Request refused for a reason other than the ones above
    Rejected,
    /// Response arrived but could not be used
    InvalidResponse,
    /// Local backend failed to initialise or run
    Backend,
    /// Input text cannot be embedded by any provider
    InvalidInput,
}

impl ProviderErrorKind {
    /// Whether the call should be retried on the next provider
    pub fn triggers_fallback(&self) -> bool {
        !matches!(self, ProviderErrorKind::InvalidInput)
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Quota => "quota exceeded",
            ProviderErrorKind::RateLimit => "rate limited",
            ProviderErrorKind::Auth => "authentication failed",
            ProviderErrorKind::Timeout => "timed out",
            ProviderErrorKind::Unreachable => "unreachable",
            ProviderErrorKind::Server => "server error",
            ProviderErrorKind::Rejected => "request rejected",
            ProviderErrorKind::InvalidResponse => "invalid response",
            ProviderErrorKind::Backend => "backend failure",
            ProviderErrorKind::InvalidInput => "invalid input",
        };
        f.write_str(label)
    }
}

/// A failure of one provider on one call
#[derive(Error, Debug, Clone)]
#[error("{provider} {kind}: {message}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(provider: ProviderKind, kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    pub fn triggers_fallback(&self) -> bool {
        self.kind.triggers_fallback()
    }

    /// Classify a non-success HTTP response from an embedding API
    pub fn from_http(provider: ProviderKind, status: u16, body: &str) -> Self {
        let kind = classify_http(status, body);
        let snippet: String = body.chars().take(200).collect();
        Self::new(provider, kind, format!("HTTP {}: {}", status, snippet))
    }

    /// Classify a transport-level failure
    pub fn from_transport(provider: ProviderKind, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() {
            ProviderErrorKind::InvalidResponse
        } else {
            ProviderErrorKind::Unreachable
        };
        Self::new(provider, kind, err.to_string())
    }
}

const QUOTA_MARKERS: &[&str] = &["insufficient_quota", "quota", "exceeded", "billing"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate_limit", "rate limit", "too many requests"];
const AUTH_MARKERS: &[&str] = &[
    "api_key",
    "api key",
    "authentication",
    "unauthorized",
    "permission_denied",
];

fn mentions_any(body: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| body.contains(m))
}

/// Map an HTTP status and error body to a failure kind
pub fn classify_http(status: u16, body: &str) -> ProviderErrorKind {
    let body = body.to_lowercase();

    match status {
        401 | 403 => ProviderErrorKind::Auth,
        402 => ProviderErrorKind::Quota,
        408 | 504 => ProviderErrorKind::Timeout,
        429 if mentions_any(&body, QUOTA_MARKERS) => ProviderErrorKind::Quota,
        429 => ProviderErrorKind::RateLimit,
        500..=599 => ProviderErrorKind::Server,
        _ if mentions_any(&body, QUOTA_MARKERS) => ProviderErrorKind::Quota,
        _ if mentions_any(&body, RATE_LIMIT_MARKERS) => ProviderErrorKind::RateLimit,
        _ if mentions_any(&body, AUTH_MARKERS) => ProviderErrorKind::Auth,
        _ => ProviderErrorKind::Rejected,
    }
}

/// Embedding errors surfaced to callers of the chain
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Every configured provider failed for this call
    #[error("Embedding unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_vs_rate_limit() {
        let quota = r#"{"error":{"code":"insufficient_quota","message":"You exceeded your current quota"}}"#;
        assert_eq!(classify_http(429, quota), ProviderErrorKind::Quota);
        assert_eq!(
            classify_http(429, r#"{"error":"Too Many Requests"}"#),
            ProviderErrorKind::RateLimit
        );
    }

    #[test]
    fn test_auth_statuses_and_bodies() {
        assert_eq!(classify_http(401, ""), ProviderErrorKind::Auth);
        assert_eq!(
            classify_http(400, r#"{"error":{"message":"API key not valid"}}"#),
            ProviderErrorKind::Auth
        );
    }

    #[test]
    fn test_server_and_timeout() {
        assert_eq!(classify_http(503, "unavailable"), ProviderErrorKind::Server);
        assert_eq!(classify_http(504, ""), ProviderErrorKind::Timeout);
        assert_eq!(classify_http(404, "model not found"), ProviderErrorKind::Rejected);
    }

    #[test]
    fn test_only_invalid_input_stops_fallback() {
        assert!(ProviderErrorKind::Quota.triggers_fallback());
        assert!(ProviderErrorKind::Timeout.triggers_fallback());
        assert!(!ProviderErrorKind::InvalidInput.triggers_fallback());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAi));
        assert_eq!(
            "sentence_transformers".parse::<ProviderKind>(),
            Ok(ProviderKind::Local)
        );
        assert!("cohere".parse::<ProviderKind>().is_err());
    }
}
