//! Rule-based entity extraction for queries

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Technical terms recognised regardless of case
const TECHNOLOGY_PATTERNS: &[&str] = &[
    r"\b(?:API|SQL|HTML|CSS|JavaScript|Python|React|Django|Flask|AI|ML)\b",
    r"\b(?:machine learning|artificial intelligence|deep learning|neural network)\b",
];

const PROPER_NOUN_CONFIDENCE: f32 = 0.6;
const TECHNOLOGY_CONFIDENCE: f32 = 0.8;

/// Entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    ProperNoun,
    Technology,
}

/// An entity found in a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Text as it appears in the query
    pub text: String,
    pub kind: EntityKind,
    pub confidence: f32,
}

/// Extracts capitalized words and known technical terms
pub struct EntityExtractor {
    proper_noun: Regex,
    technology: Vec<Regex>,
}

impl EntityExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let technology = TECHNOLOGY_PATTERNS
            .iter()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            proper_noun: Regex::new(r"\b[A-Z][a-z]+\b")?,
            technology,
        })
    }

    /// Extract entities, deduplicated case-insensitively, first occurrence wins
    ///
    /// Capitalized words in `ignore` (lowercase) are not treated as proper nouns,
    /// so a sentence-initial "What" does not become an entity.
    pub fn extract(&self, query: &str, ignore: &HashSet<&str>) -> Vec<Entity> {
        let proper_nouns = self
            .proper_noun
            .find_iter(query)
            .map(|m| m.as_str())
            .filter(|word| word.chars().count() > 2)
            .filter(|word| !ignore.contains(word.to_lowercase().as_str()))
            .map(|word| Entity {
                text: word.to_string(),
                kind: EntityKind::ProperNoun,
                confidence: PROPER_NOUN_CONFIDENCE,
            });

        let technologies = self.technology.iter().flat_map(|regex| {
            regex.find_iter(query).map(|m| Entity {
                text: m.as_str().to_string(),
                kind: EntityKind::Technology,
                confidence: TECHNOLOGY_CONFIDENCE,
            })
        });

        let mut seen = HashSet::new();
        proper_nouns
            .chain(technologies)
            .filter(|entity| seen.insert(entity.text.to_lowercase()))
            .collect()
    }
}
