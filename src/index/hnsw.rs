/// HNSW-backed vector store
use super::{ChunkMetadata, DomainScope, DomainStats, VectorHit, VectorIndexError, VectorStore};
use crate::config::IndexConfig;
use ahash::{HashMap, HashMapExt};
use hnsw_rs::prelude::*;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const MAX_LAYER: usize = 16;

struct StoredChunk {
    chunk_id: String,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

fn new_graph(config: &IndexConfig) -> Hnsw<'static, f32, DistL2> {
    Hnsw::new(
        config.hnsw_m,
        config.max_elements,
        MAX_LAYER,
        config.hnsw_ef_construction,
        DistL2 {},
    )
}

/// One domain's graph
///
/// HNSW nodes cannot be removed, so deletes and replacements drop the record and
/// leave a tombstoned node behind. Searches over-fetch by the tombstone count, and
/// the graph is rebuilt from live records once tombstones outnumber them.
struct DomainCollection {
    graph: Hnsw<'static, f32, DistL2>,
    dimension: usize,
    records: HashMap<usize, StoredChunk>,
    by_chunk: HashMap<String, usize>,
    inserted: usize,
}

impl DomainCollection {
    fn new(config: &IndexConfig, dimension: usize) -> Self {
        Self {
            graph: new_graph(config),
            dimension,
            records: HashMap::new(),
            by_chunk: HashMap::new(),
            inserted: 0,
        }
    }

    fn tombstones(&self) -> usize {
        self.inserted - self.records.len()
    }

    fn search(&self, vector: &[f32], k: usize, ef_search: usize) -> Vec<VectorHit> {
        if self.records.is_empty() || k == 0 {
            return Vec::new();
        }

        let fetch = (k + self.tombstones()).min(self.inserted);
        let ef = ef_search.max(fetch);

        self.graph
            .search(vector, fetch, ef)
            .into_iter()
            .filter_map(|neighbour| {
                self.records.get(&neighbour.d_id).map(|stored| VectorHit {
                    chunk_id: stored.chunk_id.clone(),
                    distance: neighbour.distance,
                    metadata: stored.metadata.clone(),
                })
            })
            .take(k)
            .collect()
    }

    fn insert(&mut self, chunk_id: &str, vector: &[f32], metadata: ChunkMetadata) {
        if let Some(previous) = self.by_chunk.remove(chunk_id) {
            self.records.remove(&previous);
        }

        let id = self.inserted;
        self.graph.insert((vector, id));
        self.inserted += 1;
        self.records.insert(
            id,
            StoredChunk {
                chunk_id: chunk_id.to_string(),
                vector: vector.to_vec(),
                metadata,
            },
        );
        self.by_chunk.insert(chunk_id.to_string(), id);
    }

    fn needs_compaction(&self) -> bool {
        self.tombstones() > self.records.len()
    }

    /// Rebuild the graph from live records, dropping every tombstone
    fn compact(&mut self, config: &IndexConfig) {
        let dropped = self.tombstones();
        let mut live: Vec<(usize, StoredChunk)> = self.records.drain().collect();
        live.sort_by_key(|(id, _)| *id);

        self.graph = new_graph(config);
        self.by_chunk.clear();
        self.inserted = 0;
        for (new_id, (_, stored)) in live.into_iter().enumerate() {
            self.graph.insert((stored.vector.as_slice(), new_id));
            self.by_chunk.insert(stored.chunk_id.clone(), new_id);
            self.records.insert(new_id, stored);
            self.inserted += 1;
        }

        debug!(
            "Compacted collection: {} live vectors, {} tombstones dropped",
            self.inserted, dropped
        );
    }

    fn remove_document(&mut self, document_id: i64) -> usize {
        let ids: Vec<usize> = self
            .records
            .iter()
            .filter(|(_, stored)| stored.metadata.document_id == document_id)
            .map(|(id, _)| *id)
            .collect();

        for id in &ids {
            if let Some(stored) = self.records.remove(id) {
                self.by_chunk.remove(&stored.chunk_id);
            }
        }
        ids.len()
    }
}

/// In-memory per-domain HNSW collections
///
/// The dimension of a collection is fixed by its first vector.
pub struct HnswVectorStore {
    config: IndexConfig,
    collections: RwLock<HashMap<String, DomainCollection>>,
}

impl HnswVectorStore {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DomainCollection>> {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DomainCollection>> {
        self.collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of live vectors across all domains
    pub fn len(&self) -> usize {
        self.read().values().map(|c| c.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorStore for HnswVectorStore {
    fn upsert(
        &self,
        domain: &str,
        chunk_id: &str,
        vector: &[f32],
        metadata: ChunkMetadata,
    ) -> Result<(), VectorIndexError> {
        if vector.is_empty() {
            return Err(VectorIndexError::Insert("empty vector".to_string()));
        }

        let mut collections = self.write();
        let collection = collections
            .entry(domain.to_string())
            .or_insert_with(|| DomainCollection::new(&self.config, vector.len()));

        if vector.len() != collection.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                domain: domain.to_string(),
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        collection.insert(chunk_id, vector, metadata);
        if collection.needs_compaction() {
            collection.compact(&self.config);
        }

        Ok(())
    }

    fn query(
        &self,
        scope: DomainScope<'_>,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        let collections = self.read();
        let ef_search = self.config.hnsw_ef_search;

        let mut hits = match scope {
            DomainScope::One(domain) => match collections.get(domain) {
                Some(collection) if collection.dimension != vector.len() => {
                    return Err(VectorIndexError::DimensionMismatch {
                        domain: domain.to_string(),
                        expected: collection.dimension,
                        actual: vector.len(),
                    });
                }
                Some(collection) => collection.search(vector, k, ef_search),
                None => Vec::new(),
            },
            DomainScope::All => {
                let mut merged = Vec::new();
                for (domain, collection) in collections.iter() {
                    if collection.dimension != vector.len() {
                        debug!(
                            "Skipping domain '{}': {}D collection, {}D query",
                            domain,
                            collection.dimension,
                            vector.len()
                        );
                        continue;
                    }
                    merged.extend(collection.search(vector, k, ef_search));
                }
                merged
            }
        };

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    fn delete_by_document(
        &self,
        scope: DomainScope<'_>,
        document_id: i64,
    ) -> Result<usize, VectorIndexError> {
        let mut collections = self.write();
        let mut removed = 0;
        for (domain, collection) in collections.iter_mut() {
            if let DomainScope::One(only) = scope {
                if domain.as_str() != only {
                    continue;
                }
            }
            removed += collection.remove_document(document_id);
            if collection.needs_compaction() {
                collection.compact(&self.config);
            }
        }

        debug!("Removed {} vectors of document {}", removed, document_id);
        Ok(removed)
    }

    fn clear(&self) -> Result<(), VectorIndexError> {
        self.write().clear();
        Ok(())
    }

    fn stats(&self) -> Vec<DomainStats> {
        let mut stats: Vec<DomainStats> = self
            .read()
            .iter()
            .map(|(domain, collection)| DomainStats {
                domain: domain.clone(),
                vectors: collection.records.len(),
                dimension: collection.dimension,
                tombstones: collection.tombstones(),
            })
            .collect();
        stats.sort_by(|a, b| a.domain.cmp(&b.domain));
        stats
    }
}
