use crate::config::Config;
use crate::error::{KbError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_scope(config, &mut errors);
        Self::validate_confidence(config, &mut errors);
        Self::validate_domains(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if embedding.providers.is_empty() {
            errors.push(ValidationError::new(
                "embedding.providers",
                "At least one embedding provider must be configured",
            ));
        }

        let mut seen = Vec::new();
        for provider in &embedding.providers {
            if seen.contains(provider) {
                errors.push(ValidationError::new(
                    "embedding.providers",
                    format!("Provider '{}' is listed more than once", provider),
                ));
            }
            seen.push(*provider);
        }

        if embedding.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "embedding.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "Concurrency limit must be greater than 0",
            ));
        }

        for (name, remote) in [("openai", &embedding.openai), ("gemini", &embedding.gemini)] {
            if remote.model.is_empty() {
                errors.push(ValidationError::new(
                    format!("embedding.{}.model", name),
                    "Model name cannot be empty",
                ));
            }
            if remote.dimensions == 0 {
                errors.push(ValidationError::new(
                    format!("embedding.{}.dimensions", name),
                    "Dimensions must be greater than 0",
                ));
            }
            if !remote.base_url.starts_with("http://") && !remote.base_url.starts_with("https://")
            {
                errors.push(ValidationError::new(
                    format!("embedding.{}.base_url", name),
                    format!("Base URL must be http(s), got '{}'", remote.base_url),
                ));
            }
        }

        if embedding.local.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.local.model",
                "Model name cannot be empty",
            ));
        }

        if embedding.hashing.dimensions == 0 {
            errors.push(ValidationError::new(
                "embedding.hashing.dimensions",
                "Dimensions must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.target_size == 0 {
            errors.push(ValidationError::new(
                "chunking.target_size",
                "Chunk target size must be greater than 0",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if config.index.max_elements == 0 {
            errors.push(ValidationError::new(
                "index.max_elements",
                "Index capacity must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        let fusion = &config.fusion;

        for (path, weight) in [
            ("fusion.lexical_weight", fusion.lexical_weight),
            ("fusion.semantic_weight", fusion.semantic_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        if fusion.multi_type_bonus < 1.0 {
            errors.push(ValidationError::new(
                "fusion.multi_type_bonus",
                format!("Bonus must be at least 1.0, got {}", fusion.multi_type_bonus),
            ));
        }

        if fusion.lexical_fetch_multiplier == 0 || fusion.semantic_fetch_multiplier == 0 {
            errors.push(ValidationError::new(
                "fusion",
                "Fetch multipliers must be greater than 0",
            ));
        }

        if fusion.default_limit == 0 {
            errors.push(ValidationError::new(
                "fusion.default_limit",
                "Default limit must be greater than 0",
            ));
        }
    }

    fn validate_scope(config: &Config, errors: &mut Vec<ValidationError>) {
        let scope = &config.scope;

        if !(0.0..=1.0).contains(&scope.in_scope_threshold) {
            errors.push(ValidationError::new(
                "scope.in_scope_threshold",
                format!(
                    "In-scope threshold must be between 0 and 1, got {}",
                    scope.in_scope_threshold
                ),
            ));
        }

        if !(0.0..=1.0).contains(&scope.legacy_partial_scope_threshold)
            || !(0.0..=1.0).contains(&scope.legacy_in_scope_threshold)
            || scope.legacy_partial_scope_threshold > scope.legacy_in_scope_threshold
        {
            errors.push(ValidationError::new(
                "scope",
                format!(
                    "Legacy thresholds must satisfy 0 <= partial ({}) <= in_scope ({}) <= 1",
                    scope.legacy_partial_scope_threshold, scope.legacy_in_scope_threshold
                ),
            ));
        }
    }

    fn validate_confidence(config: &Config, errors: &mut Vec<ValidationError>) {
        let confidence = &config.confidence;

        for (path, weight) in [
            ("confidence.score_weight", confidence.score_weight),
            ("confidence.intent_weight", confidence.intent_weight),
            ("confidence.quality_weight", confidence.quality_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        if confidence.quality_target == 0 {
            errors.push(ValidationError::new(
                "confidence.quality_target",
                "Quality target must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&confidence.low_relevance_threshold) {
            errors.push(ValidationError::new(
                "confidence.low_relevance_threshold",
                format!(
                    "Threshold must be between 0.0 and 1.0, got {}",
                    confidence.low_relevance_threshold
                ),
            ));
        }
    }

    fn validate_domains(config: &Config, errors: &mut Vec<ValidationError>) {
        for (domain, keywords) in &config.domains {
            if domain.is_empty() || domain != &domain.to_lowercase() {
                errors.push(ValidationError::new(
                    "domains",
                    format!("Domain names must be non-empty lowercase, got '{}'", domain),
                ));
            }
            if keywords.is_empty() {
                errors.push(ValidationError::new(
                    format!("domains.{}", domain),
                    "Domain must list at least one keyword",
                ));
            }
        }
    }
}
