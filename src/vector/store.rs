//! Partitioned vector store.
//!
//! Each [`IndexName`] owns a partition guarded by its own `RwLock`, so a
//! writer on `code` never blocks readers of `concepts`. A chunk id lives in
//! at most one partition at a time.

use super::flat::FlatIndex;
use super::hnsw::{GraphIndex, DEFAULT_SEED};
use super::index::VectorIndex;
use super::math::is_zero_norm;
use super::types::{IndexAlgorithm, IndexConfig, IndexName, IndexStats, SearchHit, SemanticChunk};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store initialization failed: {0}")]
    Initialization(String),

    #[error("index '{0}' is not configured")]
    UnknownIndex(IndexName),

    #[error("dimension mismatch on index '{index}': expected {expected}, got {actual}")]
    DimensionMismatch {
        index: IndexName,
        expected: usize,
        actual: usize,
    },

    #[error("index '{0}' lock poisoned")]
    LockPoisoned(IndexName),

    #[error("failed to persist index '{index}': {message}")]
    Persistence { index: IndexName, message: String },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub indices: Vec<IndexConfig>,
    /// Directory holding JSON snapshots; loaded on initialize, written by `persist`.
    pub persist_dir: Option<PathBuf>,
    pub seed: u64,
}

impl StoreConfig {
    /// All four indices at `dimension` with their default algorithms.
    pub fn new(dimension: usize) -> Self {
        Self {
            indices: IndexName::ALL
                .iter()
                .map(|name| IndexConfig::default_for(*name, dimension))
                .collect(),
            persist_dir: None,
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_index(mut self, config: IndexConfig) -> Self {
        self.indices.retain(|c| c.name != config.name);
        self.indices.push(config);
        self
    }

    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.indices.is_empty() {
            return Err(StoreError::Initialization(
                "at least one index must be configured".to_string(),
            ));
        }
        for config in &self.indices {
            if config.dimension == 0 {
                return Err(StoreError::Initialization(format!(
                    "index '{}' has zero dimension",
                    config.name
                )));
            }
            if let IndexAlgorithm::Graph {
                max_neighbors,
                ef_construction,
                ef_search,
            } = config.algorithm
            {
                if max_neighbors == 0 || ef_construction == 0 || ef_search == 0 {
                    return Err(StoreError::Initialization(format!(
                        "index '{}' has zero graph parameters",
                        config.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    config: IndexConfig,
    chunks: Vec<SemanticChunk>,
}

struct Partition {
    config: IndexConfig,
    chunks: HashMap<String, SemanticChunk>,
    index: Box<dyn VectorIndex>,
}

impl Partition {
    fn new(config: IndexConfig, seed: u64) -> Self {
        let index: Box<dyn VectorIndex> = match config.algorithm {
            IndexAlgorithm::Flat => Box::new(FlatIndex::new()),
            IndexAlgorithm::Graph {
                max_neighbors,
                ef_construction,
                ef_search,
            } => Box::new(GraphIndex::with_seed(
                max_neighbors,
                ef_construction,
                ef_search,
                seed,
            )),
        };
        Self {
            config,
            chunks: HashMap::new(),
            index,
        }
    }

    fn put(&mut self, chunk: SemanticChunk) {
        self.index.insert(&chunk.id, &chunk.embedding);
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    fn take(&mut self, id: &str) -> Option<SemanticChunk> {
        let chunk = self.chunks.remove(id)?;
        self.index.remove(id);
        Some(chunk)
    }
}

struct Slot {
    partition: RwLock<Partition>,
    searches: AtomicU64,
}

pub struct VectorStore {
    slots: BTreeMap<IndexName, Slot>,
    persist_dir: Option<PathBuf>,
}

impl VectorStore {
    /// Builds every configured index and loads snapshots when a persistence
    /// directory is set. Any failure here is fatal for the store.
    pub fn initialize(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let mut slots = BTreeMap::new();
        for index_config in &config.indices {
            let mut partition = Partition::new(index_config.clone(), config.seed);

            if let Some(dir) = &config.persist_dir {
                let loaded = load_snapshot(dir, index_config)?;
                for chunk in loaded {
                    partition.put(chunk);
                }
            }

            debug!(
                index = %index_config.name,
                dimension = index_config.dimension,
                chunks = partition.chunks.len(),
                "Initialized vector index"
            );
            slots.insert(
                index_config.name,
                Slot {
                    partition: RwLock::new(partition),
                    searches: AtomicU64::new(0),
                },
            );
        }

        info!(indices = slots.len(), "Vector store ready");
        Ok(Self {
            slots,
            persist_dir: config.persist_dir,
        })
    }

    /// In-memory store with all four default indices.
    pub fn in_memory(dimension: usize) -> Result<Self, StoreError> {
        Self::initialize(StoreConfig::new(dimension))
    }

    fn slot(&self, index: IndexName) -> Result<&Slot, StoreError> {
        self.slots.get(&index).ok_or(StoreError::UnknownIndex(index))
    }

    pub fn dimension(&self, index: IndexName) -> Result<usize, StoreError> {
        let slot = self.slot(index)?;
        let partition = slot
            .partition
            .read()
            .map_err(|_| StoreError::LockPoisoned(index))?;
        Ok(partition.config.dimension)
    }

    pub fn indices(&self) -> Vec<IndexName> {
        self.slots.keys().copied().collect()
    }

    /// Inserts or replaces a chunk. A chunk with the same id in another
    /// index is moved here.
    pub fn upsert(&self, index: IndexName, mut chunk: SemanticChunk) -> Result<(), StoreError> {
        let slot = self.slot(index)?;
        {
            let partition = slot
                .partition
                .read()
                .map_err(|_| StoreError::LockPoisoned(index))?;
            if chunk.embedding.len() != partition.config.dimension {
                return Err(StoreError::DimensionMismatch {
                    index,
                    expected: partition.config.dimension,
                    actual: chunk.embedding.len(),
                });
            }
        }

        for (other_name, other) in &self.slots {
            if *other_name == index {
                continue;
            }
            let mut partition = other
                .partition
                .write()
                .map_err(|_| StoreError::LockPoisoned(*other_name))?;
            if partition.take(&chunk.id).is_some() {
                debug!(chunk = %chunk.id, from = %other_name, to = %index, "Moved chunk between indices");
            }
        }

        if chunk.metadata.indexed_at.is_none() {
            chunk.metadata.indexed_at = Some(Utc::now());
        }

        let mut partition = slot
            .partition
            .write()
            .map_err(|_| StoreError::LockPoisoned(index))?;
        partition.put(chunk);
        Ok(())
    }

    pub fn get(&self, index: IndexName, id: &str) -> Result<Option<SemanticChunk>, StoreError> {
        let slot = self.slot(index)?;
        let partition = slot
            .partition
            .read()
            .map_err(|_| StoreError::LockPoisoned(index))?;
        Ok(partition.chunks.get(id).cloned())
    }

    /// Index currently holding `id`, if any.
    pub fn locate(&self, id: &str) -> Option<IndexName> {
        self.slots.iter().find_map(|(name, slot)| {
            let partition = slot.partition.read().ok()?;
            partition.chunks.contains_key(id).then_some(*name)
        })
    }

    /// Returns true if the chunk existed.
    pub fn delete(&self, index: IndexName, id: &str) -> Result<bool, StoreError> {
        let slot = self.slot(index)?;
        let mut partition = slot
            .partition
            .write()
            .map_err(|_| StoreError::LockPoisoned(index))?;
        Ok(partition.take(id).is_some())
    }

    /// Top `k` chunks with similarity at or above `threshold`, best first.
    pub fn search_similar(
        &self,
        index: IndexName,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let slot = self.slot(index)?;
        let partition = slot
            .partition
            .read()
            .map_err(|_| StoreError::LockPoisoned(index))?;

        if query.len() != partition.config.dimension {
            return Err(StoreError::DimensionMismatch {
                index,
                expected: partition.config.dimension,
                actual: query.len(),
            });
        }
        slot.searches.fetch_add(1, Ordering::Relaxed);

        if k == 0 || is_zero_norm(query) {
            return Ok(Vec::new());
        }

        let hits = partition
            .index
            .search(query, k)
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .filter_map(|(id, score)| {
                partition.chunks.get(&id).map(|chunk| SearchHit {
                    chunk: chunk.clone(),
                    score,
                    index,
                })
            })
            .collect();
        Ok(hits)
    }

    /// Searches several indices and merges the hits.
    ///
    /// An index that fails is logged and skipped; the call only fails when
    /// every index failed.
    pub fn search_many(
        &self,
        indices: &[IndexName],
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let mut merged = Vec::new();
        let mut first_error = None;
        let mut succeeded = 0;

        for index in indices {
            match self.search_similar(*index, query, k, threshold) {
                Ok(hits) => {
                    succeeded += 1;
                    merged.extend(hits);
                }
                Err(e) => {
                    warn!(index = %index, error = %e, "Index search failed, continuing with partial results");
                    first_error.get_or_insert(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        merged.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        merged.truncate(k);
        Ok(merged)
    }

    pub fn len(&self, index: IndexName) -> Result<usize, StoreError> {
        let slot = self.slot(index)?;
        let partition = slot
            .partition
            .read()
            .map_err(|_| StoreError::LockPoisoned(index))?;
        Ok(partition.chunks.len())
    }

    pub fn total_len(&self) -> usize {
        self.slots
            .values()
            .filter_map(|slot| slot.partition.read().ok().map(|p| p.chunks.len()))
            .sum()
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        self.slots
            .iter()
            .filter_map(|(name, slot)| {
                let partition = slot.partition.read().ok()?;
                Some(IndexStats {
                    name: *name,
                    chunks: partition.chunks.len(),
                    dimension: partition.config.dimension,
                    algorithm: partition.index.algorithm(),
                    tombstones: partition.index.tombstones(),
                    searches: slot.searches.load(Ordering::Relaxed),
                })
            })
            .collect()
    }

    /// Writes one JSON snapshot per index. Returns the number of chunks written.
    pub fn persist(&self) -> Result<usize, StoreError> {
        let Some(dir) = &self.persist_dir else {
            return Ok(0);
        };

        let mut written = 0;
        for (name, slot) in &self.slots {
            let partition = slot
                .partition
                .read()
                .map_err(|_| StoreError::LockPoisoned(*name))?;
            let mut chunks: Vec<SemanticChunk> = partition.chunks.values().cloned().collect();
            chunks.sort_by(|a, b| a.id.cmp(&b.id));
            written += chunks.len();

            let snapshot = Snapshot {
                config: partition.config.clone(),
                chunks,
            };
            write_snapshot(dir, *name, &snapshot)?;
        }

        info!(chunks = written, dir = %dir.display(), "Persisted vector store");
        Ok(written)
    }
}

fn snapshot_path(dir: &Path, name: IndexName) -> PathBuf {
    dir.join(format!("{}.json", name.as_str()))
}

fn load_snapshot(dir: &Path, config: &IndexConfig) -> Result<Vec<SemanticChunk>, StoreError> {
    let path = snapshot_path(dir, config.name);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        StoreError::Initialization(format!("cannot read {}: {}", path.display(), e))
    })?;
    let snapshot: Snapshot = serde_json::from_str(&raw).map_err(|e| {
        StoreError::Initialization(format!("corrupt snapshot {}: {}", path.display(), e))
    })?;

    if snapshot.config.dimension != config.dimension {
        return Err(StoreError::Initialization(format!(
            "snapshot for '{}' has dimension {}, configured {}",
            config.name, snapshot.config.dimension, config.dimension
        )));
    }
    if let Some(bad) = snapshot
        .chunks
        .iter()
        .find(|c| c.embedding.len() != config.dimension)
    {
        return Err(StoreError::Initialization(format!(
            "chunk '{}' in snapshot '{}' has dimension {}",
            bad.id,
            config.name,
            bad.embedding.len()
        )));
    }
    Ok(snapshot.chunks)
}

fn write_snapshot(dir: &Path, name: IndexName, snapshot: &Snapshot) -> Result<(), StoreError> {
    let persistence = |message: String| StoreError::Persistence {
        index: name,
        message,
    };
    std::fs::create_dir_all(dir).map_err(|e| persistence(e.to_string()))?;
    let json = serde_json::to_string(snapshot).map_err(|e| persistence(e.to_string()))?;
    std::fs::write(snapshot_path(dir, name), json).map_err(|e| persistence(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::types::ContentKind;
    use tempfile::TempDir;

    fn chunk(id: &str, embedding: Vec<f32>) -> SemanticChunk {
        SemanticChunk::new(id, format!("content of {id}"), ContentKind::Code, embedding)
    }

    #[test]
    fn test_initialize_rejects_zero_dimension() {
        let result = VectorStore::initialize(StoreConfig::new(0));
        assert!(matches!(result, Err(StoreError::Initialization(_))));
    }

    #[test]
    fn test_initialize_rejects_zero_graph_parameters() {
        let config = StoreConfig::new(4).with_index(IndexConfig {
            name: IndexName::Code,
            dimension: 4,
            metric: Default::default(),
            algorithm: IndexAlgorithm::Graph {
                max_neighbors: 0,
                ef_construction: 10,
                ef_search: 10,
            },
        });
        assert!(matches!(
            VectorStore::initialize(config),
            Err(StoreError::Initialization(_))
        ));
    }

    #[test]
    fn test_upsert_and_search_with_threshold() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Api, chunk("a", vec![1.0, 0.0])).unwrap();
        store.upsert(IndexName::Api, chunk("b", vec![0.8, 0.6])).unwrap();
        store.upsert(IndexName::Api, chunk("c", vec![0.0, 1.0])).unwrap();

        let hits = store
            .search_similar(IndexName::Api, &[1.0, 0.0], 5, 0.5)
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].chunk.metadata.indexed_at.is_some());
    }

    #[test]
    fn test_dimension_mismatch() {
        let store = VectorStore::in_memory(3).unwrap();
        let err = store
            .upsert(IndexName::Code, chunk("a", vec![1.0, 0.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));

        assert!(store
            .search_similar(IndexName::Code, &[1.0], 3, 0.0)
            .is_err());
    }

    #[test]
    fn test_zero_norm_query_returns_nothing() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Docs, chunk("a", vec![1.0, 0.0])).unwrap();
        let hits = store
            .search_similar(IndexName::Docs, &[0.0, 0.0], 3, -1.0)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_upsert_moves_chunk_between_indices() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();
        store.upsert(IndexName::Docs, chunk("a", vec![1.0, 0.0])).unwrap();

        assert_eq!(store.len(IndexName::Code).unwrap(), 0);
        assert_eq!(store.len(IndexName::Docs).unwrap(), 1);
        assert_eq!(store.locate("a"), Some(IndexName::Docs));
    }

    #[test]
    fn test_get_is_scoped_to_index() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();

        let found = store.get(IndexName::Code, "a").unwrap().unwrap();
        assert_eq!(found.id, "a");
        assert!(found.metadata.indexed_at.is_some());
        assert!(store.get(IndexName::Docs, "a").unwrap().is_none());
        assert!(store.get(IndexName::Code, "b").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();
        assert!(store.delete(IndexName::Code, "a").unwrap());
        assert!(!store.delete(IndexName::Code, "a").unwrap());
        assert!(store.get(IndexName::Code, "a").unwrap().is_none());
        assert_eq!(store.locate("a"), None);
    }

    #[test]
    fn test_search_many_partial_results() {
        let config = StoreConfig::new(2).with_index(IndexConfig::default_for(IndexName::Api, 3));
        let store = VectorStore::initialize(config).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();
        store.upsert(IndexName::Docs, chunk("b", vec![0.9, 0.1])).unwrap();

        // Api has a different dimension and fails; the others still answer.
        let hits = store
            .search_many(&IndexName::CONTENT, &[1.0, 0.0], 5, 0.0)
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(store
            .search_many(&[IndexName::Api], &[1.0, 0.0], 5, 0.0)
            .is_err());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(2).with_persist_dir(dir.path());

        let store = VectorStore::initialize(config.clone()).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();
        store.upsert(IndexName::Concepts, chunk("mvc", vec![0.0, 1.0])).unwrap();
        assert_eq!(store.persist().unwrap(), 2);

        let reloaded = VectorStore::initialize(config).unwrap();
        assert_eq!(reloaded.total_len(), 2);
        assert_eq!(reloaded.locate("mvc"), Some(IndexName::Concepts));
        assert!(reloaded.get(IndexName::Concepts, "mvc").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_snapshot_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("code.json"), "{not json").unwrap();
        let result = VectorStore::initialize(StoreConfig::new(2).with_persist_dir(dir.path()));
        assert!(matches!(result, Err(StoreError::Initialization(_))));
    }

    #[test]
    fn test_stats_count_searches() {
        let store = VectorStore::in_memory(2).unwrap();
        store.upsert(IndexName::Code, chunk("a", vec![1.0, 0.0])).unwrap();
        store.search_similar(IndexName::Code, &[1.0, 0.0], 1, 0.0).unwrap();

        let stats = store.stats();
        let code = stats.iter().find(|s| s.name == IndexName::Code).unwrap();
        assert_eq!(code.chunks, 1);
        assert_eq!(code.searches, 1);
    }
}
