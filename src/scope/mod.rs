//! Scope classification
//!
//! Decides whether the knowledge base covers a query. The semantic policy looks at
//! the best per-document semantic score and the result count; the legacy policy
//! looks at keyword-derived domain confidence and can ask for clarification.

mod confidence;

pub use confidence::ConfidenceEngine;

use crate::config::ScopeConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scope verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    InScope,
    PartialScope,
    OutOfScope,
    ClarificationNeeded,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Scope::InScope => "IN_SCOPE",
            Scope::PartialScope => "PARTIAL_SCOPE",
            Scope::OutOfScope => "OUT_OF_SCOPE",
            Scope::ClarificationNeeded => "CLARIFICATION_NEEDED",
        };
        f.write_str(label)
    }
}

/// Which classifier decides scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopePolicy {
    #[default]
    Semantic,
    Legacy,
}

impl FromStr for ScopePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" => Ok(ScopePolicy::Semantic),
            "legacy" => Ok(ScopePolicy::Legacy),
            other => Err(format!(
                "Unknown scope policy '{}'. Supported: semantic, legacy",
                other
            )),
        }
    }
}

/// Best score and result count of one retrieval leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegSignal {
    pub max_score: f32,
    pub count: usize,
}

impl LegSignal {
    pub fn from_scores(scores: impl IntoIterator<Item = f32>) -> Self {
        let mut max_score = 0.0f32;
        let mut count = 0;
        for score in scores {
            max_score = max_score.max(score);
            count += 1;
        }
        Self { max_score, count }
    }
}

/// What the retrieval legs produced; `None` means the leg failed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScopeEvidence {
    pub semantic: Option<LegSignal>,
    pub lexical: Option<LegSignal>,
}

/// Per-query scope decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeDecision {
    pub scope: Scope,
    pub domain: String,
    /// Domain detection confidence
    pub confidence: f32,
    pub max_semantic_score: f32,
}

/// Applies the configured scope policy
pub struct ScopeClassifier {
    config: ScopeConfig,
}

impl ScopeClassifier {
    pub fn new(config: ScopeConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self) -> ScopePolicy {
        self.config.policy
    }

    /// Above `in_scope_threshold` is IN; any other result is PARTIAL; no results is OUT
    pub fn classify_semantic(&self, max_score: f32, count: usize) -> Scope {
        if count == 0 {
            Scope::OutOfScope
        } else if max_score > self.config.in_scope_threshold {
            Scope::InScope
        } else {
            Scope::PartialScope
        }
    }

    /// Keyword-confidence policy
    pub fn classify_legacy(&self, domain_confidence: f32, count: usize) -> Scope {
        let has_docs = count > 0;
        if domain_confidence > self.config.legacy_in_scope_threshold && has_docs {
            Scope::InScope
        } else if domain_confidence > self.config.legacy_partial_scope_threshold && has_docs {
            Scope::PartialScope
        } else if domain_confidence < self.config.legacy_partial_scope_threshold {
            Scope::OutOfScope
        } else {
            Scope::ClarificationNeeded
        }
    }

    pub fn decide(
        &self,
        domain: &str,
        domain_confidence: f32,
        evidence: ScopeEvidence,
    ) -> ScopeDecision {
        let max_semantic_score = evidence.semantic.map(|s| s.max_score).unwrap_or(0.0);

        let scope = match self.config.policy {
            ScopePolicy::Semantic => match (evidence.semantic, evidence.lexical) {
                (Some(semantic), _) => self.classify_semantic(semantic.max_score, semantic.count),
                // Vector index unavailable: same thresholds over lexical scores
                (None, Some(lexical)) => self.classify_semantic(lexical.max_score, lexical.count),
                (None, None) => Scope::OutOfScope,
            },
            ScopePolicy::Legacy => {
                let count = evidence
                    .lexical
                    .or(evidence.semantic)
                    .map(|leg| leg.count)
                    .unwrap_or(0);
                self.classify_legacy(domain_confidence, count)
            }
        };

        tracing::debug!(
            "Scope {} (policy {:?}, max semantic {:.3})",
            scope,
            self.config.policy,
            max_semantic_score
        );

        ScopeDecision {
            scope,
            domain: domain.to_string(),
            confidence: domain_confidence,
            max_semantic_score,
        }
    }
}
