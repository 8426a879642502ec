//! Configuration management for kbscope
//!
//! Every tunable of the retrieval core lives here: provider priority, chunk size,
//! fusion weights, scope thresholds, confidence weights and the domain keyword table.
//! Values load from TOML, then `KBSCOPE_SECTION__KEY` environment overrides, then
//! validation.

use crate::embedding::ProviderKind;
use crate::error::{KbError, Result};
use crate::scope::ScopePolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    /// Domain name -> keywords used for query and document domain detection
    #[serde(default = "default_domains")]
    pub domains: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("~/.kbscope/knowledge.db"),
        }
    }
}

/// Embedding provider chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Providers in strict priority order
    pub providers: Vec<ProviderKind>,
    /// Per-call timeout at the provider boundary
    pub timeout_ms: u64,
    /// Maximum in-flight embedding calls during ingestion
    pub max_concurrent: usize,
    /// Issue one test call while selecting the primary provider
    pub probe_on_startup: bool,
    pub openai: RemoteProviderConfig,
    pub gemini: RemoteProviderConfig,
    pub local: LocalProviderConfig,
    pub hashing: HashingProviderConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderKind::OpenAi,
                ProviderKind::Gemini,
                ProviderKind::Local,
                ProviderKind::Hashing,
            ],
            timeout_ms: 30_000,
            max_concurrent: 4,
            probe_on_startup: true,
            openai: RemoteProviderConfig {
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "text-embedding-3-small".to_string(),
                base_url: "https://api.openai.com".to_string(),
                dimensions: 768,
            },
            gemini: RemoteProviderConfig {
                api_key_env: "GEMINI_API_KEY".to_string(),
                model: "text-embedding-004".to_string(),
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                dimensions: 768,
            },
            local: LocalProviderConfig::default(),
            hashing: HashingProviderConfig::default(),
        }
    }
}

/// Settings for an HTTP embedding API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProviderConfig {
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub model: String,
    pub base_url: String,
    /// Requested output dimensionality
    pub dimensions: usize,
}

/// Settings for the in-process model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProviderConfig {
    pub model: String,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

/// Settings for the feature-hashing embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingProviderConfig {
    pub dimensions: usize,
}

impl Default for HashingProviderConfig {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub target_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { target_size: 500 }
    }
}

/// HNSW vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
    /// Capacity hint per domain collection
    pub max_elements: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 64,
            max_elements: 100_000,
        }
    }
}

/// Hybrid fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    /// Multiplier for documents found by both legs
    pub multi_type_bonus: f32,
    /// Lexical rows fetched per requested result
    pub lexical_fetch_multiplier: usize,
    /// Semantic chunks fetched per requested result
    pub semantic_fetch_multiplier: usize,
    pub default_limit: usize,
    /// Pick the retrieval legs from the query intent
    pub intent_strategy: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            multi_type_bonus: 1.2,
            lexical_fetch_multiplier: 2,
            semantic_fetch_multiplier: 3,
            default_limit: 8,
            intent_strategy: false,
        }
    }
}

/// Scope classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub policy: ScopePolicy,
    pub in_scope_threshold: f32,
    pub legacy_in_scope_threshold: f32,
    pub legacy_partial_scope_threshold: f32,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            policy: ScopePolicy::Semantic,
            in_scope_threshold: 0.7,
            legacy_in_scope_threshold: 0.7,
            legacy_partial_scope_threshold: 0.3,
        }
    }
}

/// Confidence and knowledge-gap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub score_weight: f32,
    pub intent_weight: f32,
    pub quality_weight: f32,
    /// A result scoring above this counts as a quality result
    pub quality_score_threshold: f32,
    /// Number of quality results that saturates the quality factor
    pub quality_target: usize,
    pub low_relevance_threshold: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            score_weight: 0.4,
            intent_weight: 0.3,
            quality_weight: 0.3,
            quality_score_threshold: 0.5,
            quality_target: 3,
            low_relevance_threshold: 0.15,
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_policy: Option<ScopePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<ProviderKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_strategy: Option<bool>,
}

fn default_domains() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 5] = [
        (
            "technology",
            &["AI", "machine learning", "software", "programming", "computer"],
        ),
        (
            "business",
            &["strategy", "management", "finance", "marketing", "sales"],
        ),
        (
            "science",
            &["research", "experiment", "hypothesis", "data", "analysis"],
        ),
        (
            "healthcare",
            &["medical", "health", "treatment", "diagnosis", "patient"],
        ),
        (
            "education",
            &["learning", "teaching", "student", "curriculum", "academic"],
        ),
    ];

    table
        .iter()
        .map(|(domain, keywords)| {
            (
                domain.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| KbError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(policy) = overrides.scope_policy {
            self.scope.policy = policy;
        }
        if let Some(providers) = overrides.providers {
            self.embedding.providers = providers;
        }
        if let Some(enabled) = overrides.intent_strategy {
            self.fusion.intent_strategy = enabled;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: KBSCOPE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `KBSCOPE_*` overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("KBSCOPE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATABASE_PATH" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "EMBEDDING__PROVIDERS" => {
                self.embedding.providers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<ProviderKind>()
                            .map_err(|message| KbError::InvalidConfigValue {
                                path: path.to_string(),
                                message,
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
            }
            "EMBEDDING__TIMEOUT_MS" => {
                self.embedding.timeout_ms = parse_value(path, value)?;
            }
            "EMBEDDING__MAX_CONCURRENT" => {
                self.embedding.max_concurrent = parse_value(path, value)?;
            }
            "CHUNKING__TARGET_SIZE" => {
                self.chunking.target_size = parse_value(path, value)?;
            }
            "FUSION__LEXICAL_WEIGHT" => {
                self.fusion.lexical_weight = parse_value(path, value)?;
            }
            "FUSION__SEMANTIC_WEIGHT" => {
                self.fusion.semantic_weight = parse_value(path, value)?;
            }
            "FUSION__MULTI_TYPE_BONUS" => {
                self.fusion.multi_type_bonus = parse_value(path, value)?;
            }
            "FUSION__INTENT_STRATEGY" => {
                self.fusion.intent_strategy = parse_value(path, value)?;
            }
            "SCOPE__POLICY" => {
                self.scope.policy =
                    value
                        .parse()
                        .map_err(|message| KbError::InvalidConfigValue {
                            path: path.to_string(),
                            message,
                        })?;
            }
            "SCOPE__IN_SCOPE_THRESHOLD" => {
                self.scope.in_scope_threshold = parse_value(path, value)?;
            }
            "CONFIDENCE__LOW_RELEVANCE_THRESHOLD" => {
                self.confidence.low_relevance_threshold = parse_value(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| KbError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("kbscope").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| KbError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".kbscope"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| KbError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            index: IndexConfig::default(),
            fusion: FusionConfig::default(),
            scope: ScopeConfig::default(),
            confidence: ConfidenceConfig::default(),
            domains: default_domains(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_round_trips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.embedding.providers, config.embedding.providers);
        assert_eq!(loaded.chunking.target_size, 500);
        assert_eq!(loaded.domains.len(), 5);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[scope]\npolicy = \"legacy\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.scope.policy, ScopePolicy::Legacy);
        assert_eq!(config.scope.in_scope_threshold, 0.7);
        assert_eq!(config.fusion.semantic_weight, 0.6);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/kbscope.toml"));
        assert!(matches!(result, Err(KbError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("KBSCOPE_EMBEDDING__PROVIDERS".to_string(), "gemini, hashing".to_string()),
            ("KBSCOPE_CHUNKING__TARGET_SIZE".to_string(), "800".to_string()),
            ("KBSCOPE_SCOPE__POLICY".to_string(), "legacy".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ]);

        assert_eq!(
            config.embedding.providers,
            vec![ProviderKind::Gemini, ProviderKind::Hashing]
        );
        assert_eq!(config.chunking.target_size, 800);
        assert_eq!(config.scope.policy, ScopePolicy::Legacy);
    }

    #[test]
    fn test_bad_env_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(vec![(
            "KBSCOPE_CHUNKING__TARGET_SIZE".to_string(),
            "large".to_string(),
        )]);
        assert_eq!(config.chunking.target_size, 500);
    }

    #[test]
    fn test_profile_overrides() {
        let mut config = Config::default();
        config.profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                scope_policy: Some(ScopePolicy::Legacy),
                providers: Some(vec![ProviderKind::Local]),
                intent_strategy: Some(true),
            },
        );

        config.apply_profile("offline").unwrap();
        assert_eq!(config.scope.policy, ScopePolicy::Legacy);
        assert_eq!(config.embedding.providers, vec![ProviderKind::Local]);
        assert!(config.fusion.intent_strategy);

        assert!(config.apply_profile("missing").is_err());
    }
}
