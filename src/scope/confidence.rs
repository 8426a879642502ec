//! Answer confidence and knowledge-gap reporting

use crate::analysis::{Intent, QueryAnalysis};
use crate::config::ConfidenceConfig;
use crate::retrieval::RankedDocument;
use std::collections::HashSet;

/// Scores a ranked result set and explains where evidence is thin
pub struct ConfidenceEngine {
    config: ConfidenceConfig,
}

impl ConfidenceEngine {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Weighted mix of average score, intent confidence and quality-result count
    ///
    /// Always within `[0, 1]`; an empty result set yields `0.0`.
    pub fn confidence(&self, scores: &[f32], intent_confidence: f32) -> f32 {
        if scores.is_empty() {
            return 0.0;
        }

        let average = scores.iter().sum::<f32>() / scores.len() as f32;
        let quality = scores
            .iter()
            .filter(|score| **score > self.config.quality_score_threshold)
            .count();
        let quality_factor = if self.config.quality_target == 0 {
            1.0
        } else {
            (quality as f32 / self.config.quality_target as f32).min(1.0)
        };

        let confidence = average * self.config.score_weight
            + intent_confidence * self.config.intent_weight
            + quality_factor * self.config.quality_weight;

        if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        }
    }

    pub fn knowledge_gaps(&self, analysis: &QueryAnalysis, results: &[RankedDocument]) -> Vec<String> {
        let mut gaps = Vec::new();

        let haystacks: Vec<String> = results
            .iter()
            .map(|r| format!("{}\n{}", r.title, r.content).to_lowercase())
            .collect();
        let uncovered: Vec<&str> = analysis
            .entities
            .iter()
            .map(|entity| entity.text.as_str())
            .filter(|text| {
                let needle = text.to_lowercase();
                !haystacks.iter().any(|h| h.contains(&needle))
            })
            .collect();
        if !uncovered.is_empty() {
            gaps.push(format!("Limited information about: {}", uncovered.join(", ")));
        }

        if !results.is_empty() {
            let average =
                results.iter().map(|r| r.final_score).sum::<f32>() / results.len() as f32;
            if average < self.config.low_relevance_threshold {
                gaps.push("Search results have low relevance scores".to_string());
            }
        }

        if analysis.intent == Intent::Comparison {
            let domains: HashSet<String> =
                results.iter().map(|r| r.domain.to_lowercase()).collect();
            if domains.len() == 1 {
                gaps.push("Limited perspective - results from single domain".to_string());
            }
        }

        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Entity, EntityKind};
    use crate::retrieval::SearchKind;

    fn engine() -> ConfidenceEngine {
        ConfidenceEngine::new(ConfidenceConfig::default())
    }

    fn analysis(intent: Intent, entities: &[&str]) -> QueryAnalysis {
        QueryAnalysis {
            original_query: String::new(),
            domain: "general".to_string(),
            domain_confidence: 0.0,
            intent,
            intent_confidence: 0.5,
            entities: entities
                .iter()
                .map(|text| Entity {
                    text: text.to_string(),
                    kind: EntityKind::Technology,
                    confidence: 0.8,
                })
                .collect(),
            optimized_query: String::new(),
        }
    }

    fn doc(id: i64, content: &str, domain: &str, score: f32) -> RankedDocument {
        RankedDocument {
            document_id: id,
            title: format!("Doc {}", id),
            content: content.to_string(),
            domain: domain.to_string(),
            excerpt: String::new(),
            lexical_score: 0.0,
            semantic_score: score,
            bonus: 1.0,
            final_score: score,
            search_types: vec![SearchKind::Semantic],
            relevance: None,
        }
    }

    #[test]
    fn test_confidence_formula() {
        // avg 0.6, intent 0.5, two quality results of three
        let c = engine().confidence(&[0.9, 0.6, 0.3], 0.5);
        let expected = 0.6 * 0.4 + 0.5 * 0.3 + (2.0 / 3.0) * 0.3;
        assert!((c - expected).abs() < 1e-5);
    }

    #[test]
    fn test_confidence_bounds() {
        let engine = engine();
        assert_eq!(engine.confidence(&[], 1.0), 0.0);
        assert_eq!(engine.confidence(&[5.0, 5.0, 5.0], 1.0), 1.0);
        assert_eq!(engine.confidence(&[-3.0], 0.0), 0.0);
        for scores in [vec![0.0], vec![1.0, 0.2], vec![0.51; 10]] {
            let c = engine.confidence(&scores, 0.2);
            assert!((0.0..=1.0).contains(&c));
        }
    }

    #[test]
    fn test_uncovered_entities() {
        let gaps = engine().knowledge_gaps(
            &analysis(Intent::Factual, &["Rust", "Kubernetes"]),
            &[doc(1, "Notes about rust ownership", "technology", 0.8)],
        );
        assert_eq!(gaps, vec!["Limited information about: Kubernetes".to_string()]);
    }

    #[test]
    fn test_low_relevance_gap() {
        let gaps = engine().knowledge_gaps(
            &analysis(Intent::Factual, &[]),
            &[doc(1, "a", "general", 0.1), doc(2, "b", "general", 0.12)],
        );
        assert_eq!(gaps, vec!["Search results have low relevance scores".to_string()]);
    }

    #[test]
    fn test_single_domain_comparison_gap() {
        let results = [doc(1, "a", "technology", 0.8), doc(2, "b", "Technology", 0.7)];
        let gaps = engine().knowledge_gaps(&analysis(Intent::Comparison, &[]), &results);
        assert_eq!(gaps, vec!["Limited perspective - results from single domain".to_string()]);

        let mixed = [doc(1, "a", "technology", 0.8), doc(2, "b", "business", 0.7)];
        assert!(engine()
            .knowledge_gaps(&analysis(Intent::Comparison, &[]), &mixed)
            .is_empty());
        assert!(engine()
            .knowledge_gaps(&analysis(Intent::Factual, &[]), &results)
            .is_empty());
    }

    #[test]
    fn test_no_results_reports_only_entities() {
        let gaps = engine().knowledge_gaps(&analysis(Intent::Comparison, &["AI"]), &[]);
        assert_eq!(gaps, vec!["Limited information about: AI".to_string()]);
    }
}
