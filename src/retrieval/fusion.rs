//! Weighted score fusion of lexical and semantic results

use crate::analysis::Intent;
use crate::config::FusionConfig;
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Chunks above this similarity become the document excerpt in truncated form
const EXCERPT_SIMILARITY: f32 = 0.8;
const EXCERPT_CHARS: usize = 300;

/// Single-leg relevance weights: leg score, title match, content match, quality
const BASE_WEIGHT: f32 = 0.3;
const TITLE_WEIGHT: f32 = 0.4;
const CONTENT_WEIGHT: f32 = 0.2;
const QUALITY_WEIGHT: f32 = 0.1;
const PHRASE_BONUS: f32 = 1.5;

/// Which retrieval leg produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Lexical,
    Semantic,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKind::Lexical => f.write_str("lexical"),
            SearchKind::Semantic => f.write_str("semantic"),
        }
    }
}

/// Which legs feed the ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    #[default]
    Hybrid,
    Semantic,
    Lexical,
}

impl SearchStrategy {
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Factual | Intent::Recommendation => SearchStrategy::Hybrid,
            Intent::Comparison | Intent::Analysis => SearchStrategy::Semantic,
            Intent::HowTo | Intent::List => SearchStrategy::Lexical,
        }
    }

    pub fn uses(&self, kind: SearchKind) -> bool {
        match self {
            SearchStrategy::Hybrid => true,
            SearchStrategy::Semantic => kind == SearchKind::Semantic,
            SearchStrategy::Lexical => kind == SearchKind::Lexical,
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hybrid" => Ok(SearchStrategy::Hybrid),
            "semantic" => Ok(SearchStrategy::Semantic),
            "lexical" | "fulltext" => Ok(SearchStrategy::Lexical),
            other => Err(format!("Unknown search strategy '{}'", other)),
        }
    }
}

/// A document matched by the lexical leg
#[derive(Debug, Clone)]
pub struct LexicalCandidate {
    pub document_id: i64,
    /// Normalized relevance in `[0, 1]`
    pub score: f32,
    pub title: String,
    pub content: String,
    pub domain: String,
}

/// A chunk matched by the semantic leg, hydrated with its document
#[derive(Debug, Clone)]
pub struct SemanticCandidate {
    pub document_id: i64,
    pub similarity: f32,
    pub position: usize,
    pub chunk_text: String,
    pub title: String,
    pub content: String,
    pub domain: String,
}

/// A fused, ranked document with its score breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    pub document_id: i64,
    pub title: String,
    #[serde(skip_serializing)]
    pub content: String,
    pub domain: String,
    pub excerpt: String,
    pub lexical_score: f32,
    pub semantic_score: f32,
    pub bonus: f32,
    pub final_score: f32,
    pub search_types: Vec<SearchKind>,
    /// Components of the single-leg relevance score; absent for hybrid rankings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<Relevance>,
}

/// Breakdown of a single-leg relevance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Relevance {
    pub base: f32,
    pub title: f32,
    pub content: f32,
    pub quality: f32,
}

impl Relevance {
    fn score(&self) -> f32 {
        self.base * BASE_WEIGHT
            + self.title * TITLE_WEIGHT
            + self.content * CONTENT_WEIGHT
            + self.quality * QUALITY_WEIGHT
    }
}

impl RankedDocument {
    pub fn found_by(&self, kind: SearchKind) -> bool {
        self.search_types.contains(&kind)
    }
}

#[derive(Default)]
struct Accumulator<'a> {
    lexical: Option<f32>,
    weighted_sum: f32,
    chunks: usize,
    best_chunk: Option<&'a SemanticCandidate>,
    lexical_doc: Option<&'a LexicalCandidate>,
}

/// Combines both legs into one ranking
pub struct FusionRanker {
    config: FusionConfig,
}

impl FusionRanker {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Rank documents from both legs
    ///
    /// Lexical score is the best lexical signal of a document. Semantic score is
    /// `sum(similarity / (position + 1)) / matched_chunks`. With the hybrid strategy
    /// the final score is the weighted sum times the multi-type bonus. Single-leg
    /// strategies re-score each document from that leg's score, how well `query`
    /// matches its title and content, and a document quality estimate. The output
    /// does not depend on input order.
    pub fn fuse(
        &self,
        query: &str,
        lexical: &[LexicalCandidate],
        semantic: &[SemanticCandidate],
        strategy: SearchStrategy,
        limit: usize,
    ) -> Vec<RankedDocument> {
        let terms = QueryTerms::new(query);
        let mut docs: HashMap<i64, Accumulator> = HashMap::new();

        if strategy.uses(SearchKind::Lexical) {
            for hit in lexical {
                let acc = docs.entry(hit.document_id).or_default();
                let score = hit.score.clamp(0.0, 1.0);
                acc.lexical = Some(acc.lexical.map_or(score, |s| s.max(score)));
                acc.lexical_doc.get_or_insert(hit);
            }
        }

        if strategy.uses(SearchKind::Semantic) {
            for hit in semantic {
                let acc = docs.entry(hit.document_id).or_default();
                acc.weighted_sum += hit.similarity / (hit.position as f32 + 1.0);
                acc.chunks += 1;
                let replace = match acc.best_chunk {
                    None => true,
                    Some(best) => {
                        hit.similarity > best.similarity
                            || (hit.similarity == best.similarity && hit.position < best.position)
                    }
                };
                if replace {
                    acc.best_chunk = Some(hit);
                }
            }
        }

        let mut ranked: Vec<RankedDocument> = docs
            .into_iter()
            .filter_map(|(document_id, acc)| self.rank(document_id, acc, strategy, &terms))
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        let mut seen = HashSet::new();
        ranked.retain(|doc| seen.insert(doc.document_id));
        ranked.truncate(limit);
        ranked
    }

    fn rank(
        &self,
        document_id: i64,
        acc: Accumulator<'_>,
        strategy: SearchStrategy,
        terms: &QueryTerms,
    ) -> Option<RankedDocument> {
        let semantic_score = if acc.chunks > 0 {
            acc.weighted_sum / acc.chunks as f32
        } else {
            0.0
        };
        let lexical_score = acc.lexical.unwrap_or(0.0);

        let mut search_types = Vec::with_capacity(2);
        if acc.lexical.is_some() {
            search_types.push(SearchKind::Lexical);
        }
        if acc.chunks > 0 {
            search_types.push(SearchKind::Semantic);
        }

        let (title, content, domain, excerpt) = match (acc.best_chunk, acc.lexical_doc) {
            (Some(chunk), _) => (
                chunk.title.clone(),
                chunk.content.clone(),
                chunk.domain.clone(),
                chunk_excerpt(chunk),
            ),
            (None, Some(doc)) => (
                doc.title.clone(),
                doc.content.clone(),
                doc.domain.clone(),
                truncate_chars(&doc.content, EXCERPT_CHARS),
            ),
            (None, None) => return None,
        };

        let (bonus, final_score, relevance) = match strategy {
            SearchStrategy::Hybrid => {
                let bonus = if search_types.len() > 1 {
                    self.config.multi_type_bonus
                } else {
                    1.0
                };
                let weighted = lexical_score * self.config.lexical_weight
                    + semantic_score * self.config.semantic_weight;
                (bonus, weighted * bonus, None)
            }
            SearchStrategy::Semantic | SearchStrategy::Lexical => {
                let base = if strategy == SearchStrategy::Semantic {
                    semantic_score
                } else {
                    lexical_score
                };
                let relevance = Relevance {
                    base,
                    title: terms.match_score(&title),
                    content: terms.match_score(&content),
                    quality: quality_score(&title, &content),
                };
                (1.0, relevance.score(), Some(relevance))
            }
        };

        Some(RankedDocument {
            document_id,
            title,
            content,
            domain,
            excerpt,
            lexical_score,
            semantic_score,
            bonus,
            final_score,
            search_types,
            relevance,
        })
    }
}

/// Lowercased query words and the phrase they form
struct QueryTerms {
    words: HashSet<String>,
    phrase: String,
}

impl QueryTerms {
    fn new(query: &str) -> Self {
        let ordered = words(query);
        let phrase = ordered.join(" ");
        Self {
            words: ordered.into_iter().collect(),
            phrase,
        }
    }

    /// Share of query words present in `text`, times 1.5 when the whole phrase
    /// appears, capped at 1
    fn match_score(&self, text: &str) -> f32 {
        if self.words.is_empty() || text.is_empty() {
            return 0.0;
        }
        let text_words = words(text);
        let present: HashSet<&str> = text_words.iter().map(String::as_str).collect();
        let matched = self
            .words
            .iter()
            .filter(|w| present.contains(w.as_str()))
            .count();

        let mut score = matched as f32 / self.words.len() as f32;
        if text_words.join(" ").contains(&self.phrase) {
            score *= PHRASE_BONUS;
        }
        score.min(1.0)
    }
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Favors documents of moderate length with a descriptive title
fn quality_score(title: &str, content: &str) -> f32 {
    let mut score = 0.5;

    let word_count = content.split_whitespace().count();
    if (100..=2000).contains(&word_count) {
        score += 0.3;
    } else if word_count > 50 {
        score += 0.1;
    }

    let shouting = title.chars().any(char::is_alphabetic)
        && !title.chars().any(char::is_lowercase);
    if title.chars().count() > 10 && !shouting {
        score += 0.1;
    }

    f32::min(score, 1.0)
}

fn chunk_excerpt(chunk: &SemanticCandidate) -> String {
    if chunk.similarity > EXCERPT_SIMILARITY {
        truncate_chars(&chunk.chunk_text, EXCERPT_CHARS)
    } else {
        chunk.chunk_text.clone()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
