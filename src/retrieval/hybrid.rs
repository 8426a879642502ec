//! Query pipeline: analysis, both retrieval legs, fusion and annotation

use crate::analysis::{QueryAnalysis, QueryAnalyzer};
use crate::config::{Config, FusionConfig};
use crate::embedding::{EmbeddingError, ProviderChain};
use crate::error::Result;
use crate::index::{DomainScope, VectorStore};
use crate::retrieval::{
    FusionRanker, LexicalCandidate, RankedDocument, SearchError, SearchStrategy,
    SemanticCandidate,
};
use crate::scope::{
    ConfidenceEngine, LegSignal, Scope, ScopeClassifier, ScopeDecision, ScopeEvidence,
};
use crate::storage::{database::normalize_domain, Document, DocumentStore, LexicalSearch};
use ahash::{HashMap, HashMapExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of top results exposed as citations
const CITATION_COUNT: usize = 5;

/// One query with optional overrides
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Falls back to `fusion.default_limit`
    pub limit: Option<usize>,
    /// Restrict both legs to one domain; category names are lowercased
    pub domain: Option<String>,
    /// Overrides the configured strategy selection
    pub strategy: Option<SearchStrategy>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Numbered source handed to the answer synthesizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// 1-based citation number
    pub id: usize,
    pub document_id: i64,
    pub title: String,
    pub score: f32,
    pub excerpt: String,
}

/// Ranked and annotated result set for one query
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    /// `None` when the query was rejected before analysis
    pub analysis: Option<QueryAnalysis>,
    pub scope: ScopeDecision,
    pub strategy: SearchStrategy,
    pub results: Vec<RankedDocument>,
    pub confidence: f32,
    pub knowledge_gaps: Vec<String>,
    pub citations: Vec<Citation>,
    /// Configured domains, listed when the query is out of scope
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_domains: Vec<String>,
}

impl QueryOutcome {
    fn out_of_scope(query: &str, domain: String, available_domains: Vec<String>) -> Self {
        Self {
            query: query.to_string(),
            analysis: None,
            scope: ScopeDecision {
                scope: Scope::OutOfScope,
                domain,
                confidence: 0.0,
                max_semantic_score: 0.0,
            },
            strategy: SearchStrategy::Hybrid,
            results: Vec::new(),
            confidence: 0.0,
            knowledge_gaps: Vec::new(),
            citations: Vec::new(),
            available_domains,
        }
    }

    pub fn is_in_scope(&self) -> bool {
        self.scope.scope == Scope::InScope
    }
}

/// Hybrid retriever over a document store, a lexical index and a vector index
pub struct Retriever {
    analyzer: QueryAnalyzer,
    documents: Arc<dyn DocumentStore>,
    lexical: Arc<dyn LexicalSearch>,
    chain: Arc<ProviderChain>,
    vectors: Arc<dyn VectorStore>,
    ranker: FusionRanker,
    scope: ScopeClassifier,
    confidence: ConfidenceEngine,
}

impl Retriever {
    pub fn new(
        config: &Config,
        documents: Arc<dyn DocumentStore>,
        lexical: Arc<dyn LexicalSearch>,
        chain: Arc<ProviderChain>,
        vectors: Arc<dyn VectorStore>,
    ) -> Result<Self> {
        Ok(Self {
            analyzer: QueryAnalyzer::from_config(config)?,
            documents,
            lexical,
            chain,
            vectors,
            ranker: FusionRanker::new(config.fusion.clone()),
            scope: ScopeClassifier::new(config.scope.clone()),
            confidence: ConfidenceEngine::new(config.confidence.clone()),
        })
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    fn fusion(&self) -> &FusionConfig {
        self.ranker.config()
    }

    /// Run one query end to end
    ///
    /// A blank query yields an empty out-of-scope outcome without analysis. A
    /// failing leg is logged and contributes nothing; when both legs fail the
    /// outcome is out of scope with zero confidence.
    pub async fn search(&self, request: &SearchRequest) -> Result<QueryOutcome> {
        let query = request.query.trim();
        if query.is_empty() {
            debug!("Blank query, skipping retrieval");
            return Ok(QueryOutcome::out_of_scope(
                &request.query,
                crate::storage::GENERAL_DOMAIN.to_string(),
                Vec::new(),
            ));
        }

        let limit = request.limit.unwrap_or(self.fusion().default_limit);
        if limit == 0 {
            return Err(SearchError::MalformedQuery("limit must be positive".to_string()).into());
        }

        let domain_filter = request.domain.as_deref().map(|d| normalize_domain(Some(d)));
        let analysis = self.analyzer.analyze(query);
        let strategy = request.strategy.unwrap_or_else(|| {
            if self.fusion().intent_strategy {
                SearchStrategy::for_intent(analysis.intent)
            } else {
                SearchStrategy::Hybrid
            }
        });

        let (lexical, semantic) = tokio::join!(
            self.lexical_leg(&analysis.optimized_query, domain_filter.as_deref(), limit),
            self.semantic_leg(&analysis.optimized_query, domain_filter.as_deref(), limit)
        );

        let lexical = match lexical {
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!("Lexical leg failed for '{}': {}", query, e);
                None
            }
        };
        let semantic = match semantic {
            Ok(hits) => Some(hits),
            Err(e) => {
                warn!("Semantic leg skipped for '{}': {}", query, e);
                None
            }
        };

        if lexical.is_none() && semantic.is_none() {
            info!("Both retrieval legs failed for '{}'", query);
            let mut outcome = QueryOutcome::out_of_scope(
                &request.query,
                analysis.domain.clone(),
                self.analyzer.domains().domain_names(),
            );
            outcome.strategy = strategy;
            outcome.analysis = Some(analysis);
            return Ok(outcome);
        }

        let evidence = ScopeEvidence {
            semantic: semantic.as_deref().map(|hits| {
                let per_document = self.ranker.fuse("", &[], hits, SearchStrategy::Semantic, usize::MAX);
                LegSignal::from_scores(per_document.iter().map(|d| d.semantic_score))
            }),
            lexical: lexical
                .as_deref()
                .map(|hits| LegSignal::from_scores(hits.iter().map(|h| h.score))),
        };
        let decision = self
            .scope
            .decide(&analysis.domain, analysis.domain_confidence, evidence);

        let results = self.ranker.fuse(
            &analysis.optimized_query,
            lexical.as_deref().unwrap_or_default(),
            semantic.as_deref().unwrap_or_default(),
            strategy,
            limit,
        );

        let scores: Vec<f32> = results.iter().map(|r| r.final_score).collect();
        let confidence = self.confidence.confidence(&scores, analysis.intent_confidence);
        let knowledge_gaps = self.confidence.knowledge_gaps(&analysis, &results);
        let citations = results
            .iter()
            .take(CITATION_COUNT)
            .enumerate()
            .map(|(idx, doc)| Citation {
                id: idx + 1,
                document_id: doc.document_id,
                title: doc.title.clone(),
                score: doc.final_score,
                excerpt: doc.excerpt.clone(),
            })
            .collect();
        let available_domains = if decision.scope == Scope::OutOfScope {
            self.analyzer.domains().domain_names()
        } else {
            Vec::new()
        };

        info!(
            "Query '{}': {} results, {}, confidence {:.2}",
            query,
            results.len(),
            decision.scope,
            confidence
        );

        Ok(QueryOutcome {
            query: request.query.clone(),
            analysis: Some(analysis),
            scope: decision,
            strategy,
            results,
            confidence,
            knowledge_gaps,
            citations,
            available_domains,
        })
    }

    async fn lexical_leg(
        &self,
        pattern: &str,
        domain: Option<&str>,
        limit: usize,
    ) -> std::result::Result<Vec<LexicalCandidate>, SearchError> {
        let fetch = limit.saturating_mul(self.fusion().lexical_fetch_multiplier);
        let hits = self
            .lexical
            .search(pattern, domain, fetch)
            .map_err(|e| SearchError::LexicalSearch(e.to_string()))?;

        debug!("Lexical leg: {} hits for '{}'", hits.len(), pattern);
        Ok(hits
            .into_iter()
            .map(|hit| LexicalCandidate {
                document_id: hit.document_id,
                score: hit.score(),
                title: hit.title,
                content: hit.content,
                domain: hit.domain,
            })
            .collect())
    }

    async fn semantic_leg(
        &self,
        text: &str,
        domain: Option<&str>,
        limit: usize,
    ) -> std::result::Result<Vec<SemanticCandidate>, SearchError> {
        let embedding = self.chain.embed(text).await.map_err(|e| match e {
            EmbeddingError::Unavailable(msg) => SearchError::EmbeddingUnavailable(msg),
            other => SearchError::EmbeddingUnavailable(other.to_string()),
        })?;

        let k = limit.saturating_mul(self.fusion().semantic_fetch_multiplier);
        let hits = self
            .vectors
            .query(DomainScope::from_filter(domain), &embedding.vector, k)
            .map_err(|e| SearchError::VectorIndexUnavailable(e.to_string()))?;

        // Vector removal lags behind deletion; re-check status here
        let mut documents: HashMap<i64, Option<Document>> = HashMap::new();
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let document_id = hit.metadata.document_id;
            if !documents.contains_key(&document_id) {
                let document = self
                    .documents
                    .get_document(document_id)
                    .map_err(|e| SearchError::Storage(e.to_string()))?
                    .filter(Document::is_active);
                documents.insert(document_id, document);
            }
            let Some(Some(document)) = documents.get(&document_id) else {
                debug!("Dropping stale vector hit {}", hit.chunk_id);
                continue;
            };

            candidates.push(SemanticCandidate {
                document_id,
                similarity: hit.similarity(),
                position: hit.metadata.position,
                chunk_text: hit.metadata.text,
                title: document.title.clone(),
                content: document.content.clone(),
                domain: document.domain.clone(),
            });
        }

        debug!(
            "Semantic leg: {} chunks from {} via {}",
            candidates.len(),
            documents.len(),
            embedding.provider
        );
        Ok(candidates)
    }
}
