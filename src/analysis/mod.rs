//! Query analysis: domain, intent, entities and search-string optimization

mod domain;
mod entities;

pub use domain::DomainClassifier;
pub use entities::{Entity, EntityExtractor, EntityKind};

use crate::config::Config;
use crate::error::Result;
use domain::{contains_phrase, word_form};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Question words and fillers removed from search strings
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "what", "is", "are", "how", "when", "where", "why", "which", "who", "whom", "whose", "can",
    "could", "would", "should", "might", "may", "will", "shall", "do", "does", "did", "tell",
    "me", "about", "explain", "describe", "define",
];

const DEFAULT_INTENT_CONFIDENCE: f32 = 0.5;

/// What the user is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    Comparison,
    HowTo,
    List,
    Analysis,
    Recommendation,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::Factual,
        Intent::Comparison,
        Intent::HowTo,
        Intent::List,
        Intent::Analysis,
        Intent::Recommendation,
    ];

    /// Trigger phrases for this intent
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            Intent::Factual => &["what is", "define", "explain", "describe", "tell me about"],
            Intent::Comparison => &["compare", "difference", "versus", "vs", "better than", "similar"],
            Intent::HowTo => &["how to", "how can", "steps to", "guide", "tutorial"],
            Intent::List => &["list", "examples", "types of", "kinds of", "show me"],
            Intent::Analysis => &["analyze", "evaluate", "assess", "review", "opinion"],
            Intent::Recommendation => &["recommend", "suggest", "best", "should i", "which"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "factual",
            Intent::Comparison => "comparison",
            Intent::HowTo => "how_to",
            Intent::List => "list",
            Intent::Analysis => "analysis",
            Intent::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of analysing one query
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub original_query: String,
    pub domain: String,
    pub domain_confidence: f32,
    pub intent: Intent,
    pub intent_confidence: f32,
    pub entities: Vec<Entity>,
    /// Search string handed to both retrieval legs
    pub optimized_query: String,
}

/// Keyword and pattern based query analyzer
pub struct QueryAnalyzer {
    domains: DomainClassifier,
    extractor: EntityExtractor,
    stop_words: HashSet<&'static str>,
}

impl QueryAnalyzer {
    pub fn new(domains: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        Ok(Self {
            domains: DomainClassifier::new(domains),
            extractor: EntityExtractor::new()?,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.domains)
    }

    pub fn domains(&self) -> &DomainClassifier {
        &self.domains
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let (domain, domain_confidence) = self.domains.detect(query);
        let (intent, intent_confidence) = self.classify_intent(query);
        let entities = self.extract_entities(query);
        let optimized_query = self.optimize(query, &entities);

        tracing::debug!(
            "Analyzed query: domain={} ({:.2}), intent={} ({:.2}), {} entities, optimized='{}'",
            domain,
            domain_confidence,
            intent,
            intent_confidence,
            entities.len(),
            optimized_query
        );

        QueryAnalysis {
            original_query: query.to_string(),
            domain,
            domain_confidence,
            intent,
            intent_confidence,
            entities,
            optimized_query,
        }
    }

    /// Matched patterns over pattern count, argmax; `factual` at 0.5 when nothing matches
    pub fn classify_intent(&self, query: &str) -> (Intent, f32) {
        let form = word_form(query);
        let mut best = (Intent::Factual, 0.0f32);

        for intent in Intent::ALL {
            let patterns = intent.patterns();
            let matched = patterns
                .iter()
                .filter(|pattern| contains_phrase(&form, pattern))
                .count();
            let score = matched as f32 / patterns.len() as f32;
            if score > best.1 {
                best = (intent, score);
            }
        }

        if best.1 == 0.0 {
            (Intent::Factual, DEFAULT_INTENT_CONFIDENCE)
        } else {
            best
        }
    }

    pub fn extract_entities(&self, query: &str) -> Vec<Entity> {
        self.extractor.extract(query, &self.stop_words)
    }

    /// Build the search string
    ///
    /// With entities, the two longest entity texts win. Otherwise stop words and
    /// words of two characters or fewer are dropped. Falls back to the lowercased
    /// query when nothing survives.
    pub fn optimize(&self, query: &str, entities: &[Entity]) -> String {
        let optimized = if entities.is_empty() {
            query
                .to_lowercase()
                .split_whitespace()
                .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
                .filter(|word| !self.stop_words.contains(word) && word.chars().count() > 2)
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            let mut texts: Vec<&str> = entities.iter().map(|e| e.text.as_str()).collect();
            texts.sort_by_key(|text| std::cmp::Reverse(text.chars().count()));
            texts.into_iter().take(2).collect::<Vec<_>>().join(" ")
        };

        if optimized.trim().is_empty() {
            query.trim().to_lowercase()
        } else {
            optimized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::from_config(&Config::default()).unwrap()
    }

    #[test]
    fn test_factual_ai_query() {
        let analysis = analyzer().analyze("What is artificial intelligence?");
        assert_eq!(analysis.intent, Intent::Factual);
        assert!((analysis.intent_confidence - 0.2).abs() < 1e-6);
        assert_eq!(analysis.entities.len(), 1);
        assert_eq!(analysis.optimized_query, "artificial intelligence");
    }

    #[test]
    fn test_comparison_intent() {
        let analysis = analyzer().analyze("compare AI and ML strategies");
        assert_eq!(analysis.intent, Intent::Comparison);
        assert!(analysis.intent_confidence > 0.0);
        assert_eq!(analysis.domain, "technology");
    }

    #[test]
    fn test_default_intent() {
        let (intent, confidence) = analyzer().classify_intent("pasta");
        assert_eq!(intent, Intent::Factual);
        assert_eq!(confidence, 0.5);
    }

    #[test]
    fn test_inflected_intent_patterns() {
        let analyzer = analyzer();

        let (intent, confidence) = analyzer.classify_intent("suggestions and recommendations");
        assert_eq!(intent, Intent::Recommendation);
        assert!((confidence - 2.0 / 5.0).abs() < 1e-6);

        let (intent, _) = analyzer.classify_intent("we compared both");
        assert_eq!(intent, Intent::Comparison);

        let (intent, _) = analyzer.classify_intent("any tutorials for sourdough");
        assert_eq!(intent, Intent::HowTo);
    }

    #[test]
    fn test_how_to_intent() {
        let (intent, _) = analyzer().classify_intent("how to bake bread, a step by step guide");
        assert_eq!(intent, Intent::HowTo);
    }

    #[test]
    fn test_optimize_without_entities() {
        let analyzer = analyzer();
        let optimized = analyzer.optimize("how do plants grow in the winter?", &[]);
        assert_eq!(optimized, "plants grow winter");
    }

    #[test]
    fn test_optimize_prefers_two_longest_entities() {
        let analyzer = analyzer();
        let query = "Is deep learning like machine learning or AI?";
        let entities = analyzer.extract_entities(query);
        assert_eq!(analyzer.optimize(query, &entities), "machine learning deep learning");
    }

    #[test]
    fn test_optimize_falls_back_to_lowercased_query() {
        assert_eq!(analyzer().optimize("What is it?", &[]), "what is it?");
    }
}
