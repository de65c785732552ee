//! Semantic Retriever: query vector in, ranked and diversified context out.

use super::cache::RetrievalCache;
use super::diversity::apply_diversity;
use super::ingest::{chunk_text, classify_content};
use super::query::{analyze_query, QueryAnalysis};
use super::strategy::{RetrievalStrategy, ScoreSignals};
use crate::collaborators::{CollaboratorError, Embedder};
use crate::vector::{
    ChunkMetadata, ContentKind, IndexName, SearchHit, SemanticChunk, StoreError, VectorStore,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] CollaboratorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Minimum raw cosine similarity for a candidate.
    pub score_threshold: f32,
    /// Search every index in `indices`; otherwise only the first one.
    pub multi_domain: bool,
    pub diversity_factor: f32,
    pub indices: Vec<IndexName>,
    /// Analysis of the text the query vector came from, if known.
    pub query: Option<QueryAnalysis>,
    pub use_cache: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            multi_domain: true,
            diversity_factor: 0.3,
            indices: IndexName::CONTENT.to_vec(),
            query: None,
            use_cache: true,
        }
    }
}

impl RetrievalOptions {
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn with_diversity(mut self, factor: f32) -> Self {
        self.diversity_factor = factor;
        self
    }

    pub fn single_index(mut self, index: IndexName) -> Self {
        self.multi_domain = false;
        self.indices = vec![index];
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Candidates fetched per requested chunk, in [1.5, 2.0].
    pub over_fetch: f32,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub chunk_max_chars: usize,
    pub chunk_overlap: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            over_fetch: 2.0,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 256,
            chunk_max_chars: 1000,
            chunk_overlap: 200,
        }
    }
}

impl RetrieverConfig {
    pub fn with_over_fetch(mut self, factor: f32) -> Self {
        self.over_fetch = factor.clamp(1.5, 2.0);
        self
    }

    pub fn with_cache(mut self, ttl: Duration, capacity: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk: SemanticChunk,
    /// Raw cosine similarity to the query.
    pub similarity: f32,
    /// Score after re-scoring and the diversity penalty.
    pub score: f32,
    pub index: IndexName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub chunks: Vec<RankedChunk>,
    pub aggregate_score: f32,
    pub elapsed: Duration,
    pub query_vector: Vec<f32>,
    pub strategy: RetrievalStrategy,
    #[serde(default)]
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub total_retrievals: u64,
    pub cache_hits: u64,
    /// Running mean over every retrieval, cache hits included.
    pub average_time: Duration,
}

pub struct SemanticRetriever {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    cache: RetrievalCache,
    config: RetrieverConfig,
    metrics: Mutex<RetrievalMetrics>,
}

impl SemanticRetriever {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>, config: RetrieverConfig) -> Self {
        Self {
            store,
            embedder,
            cache: RetrievalCache::new(config.cache_ttl, config.cache_capacity),
            config,
            metrics: Mutex::new(RetrievalMetrics::default()),
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query text is empty".to_string()));
        }
        self.embedder
            .embed(text)
            .await
            .map_err(RetrievalError::Embedding)
    }

    /// Top `max_chunks` chunks for `query_vector`, re-scored by the selected
    /// strategy and diversified. Results are cached by query fingerprint.
    ///
    /// With `multi_domain` a failing index only drops its own hits; a single
    /// index search escalates its error.
    pub fn retrieve(
        &self,
        query_vector: &[f32],
        max_chunks: usize,
        options: &RetrievalOptions,
    ) -> Result<RetrievedContext, RetrievalError> {
        let start = Instant::now();
        let strategy =
            RetrievalStrategy::select(max_chunks, options.diversity_factor, options.query.as_ref());

        if max_chunks == 0 {
            return Ok(RetrievedContext {
                chunks: Vec::new(),
                aggregate_score: 0.0,
                elapsed: start.elapsed(),
                query_vector: query_vector.to_vec(),
                strategy,
                cache_hit: false,
            });
        }

        let key = RetrievalCache::fingerprint(query_vector, max_chunks, options);
        if options.use_cache {
            if let Some(mut cached) = self.cache.get(&key) {
                cached.cache_hit = true;
                cached.elapsed = start.elapsed();
                self.record(cached.elapsed, true);
                debug!(chunks = cached.chunks.len(), "Retrieval cache hit");
                return Ok(cached);
            }
        }

        let fetch = ((max_chunks as f32) * self.config.over_fetch).ceil() as usize;
        let hits = if options.multi_domain {
            self.store
                .search_many(&options.indices, query_vector, fetch, options.score_threshold)?
        } else {
            let index = options.indices.first().copied().unwrap_or(IndexName::Docs);
            self.store
                .search_similar(index, query_vector, fetch, options.score_threshold)?
        };
        let candidate_count = hits.len();

        let candidates = self.rescore(hits, strategy, options);
        let mut chunks = apply_diversity(candidates, options.diversity_factor);
        chunks.truncate(max_chunks);

        let aggregate_score = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32
        };

        let context = RetrievedContext {
            chunks,
            aggregate_score,
            elapsed: start.elapsed(),
            query_vector: query_vector.to_vec(),
            strategy,
            cache_hit: false,
        };

        if options.use_cache {
            self.cache.insert(key, context.clone());
        }
        self.record(context.elapsed, false);

        info!(
            strategy = ?strategy,
            candidates = candidate_count,
            returned = context.chunks.len(),
            aggregate = context.aggregate_score,
            "Retrieved context"
        );
        Ok(context)
    }

    /// Analyzes and embeds `query`, then retrieves with the analysis attached.
    pub async fn retrieve_text(
        &self,
        query: &str,
        max_chunks: usize,
        options: &RetrievalOptions,
    ) -> Result<RetrievedContext, RetrievalError> {
        let mut options = options.clone();
        options.query = Some(analyze_query(query));
        let vector = self.embed(query).await?;
        self.retrieve(&vector, max_chunks, &options)
    }

    fn rescore(
        &self,
        mut hits: Vec<SearchHit>,
        strategy: RetrievalStrategy,
        options: &RetrievalOptions,
    ) -> Vec<RankedChunk> {
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        let now = Utc::now();
        let query_complexity = options.query.as_ref().map(|q| q.complexity);
        let mut seen_kinds = HashSet::new();
        let mut seen_languages = HashSet::new();

        hits.into_iter()
            .map(|hit| {
                let language = hit.chunk.metadata.language.clone();
                let novelty = if !seen_kinds.contains(&hit.chunk.kind) {
                    1.0
                } else if !seen_languages.contains(&language) {
                    0.5
                } else {
                    0.0
                };
                seen_kinds.insert(hit.chunk.kind);
                seen_languages.insert(language);

                let recency = hit
                    .chunk
                    .metadata
                    .indexed_at
                    .map(|at| {
                        let age_days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
                        0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS) as f32
                    })
                    .unwrap_or(0.5);

                let complexity_fit = query_complexity
                    .map(|q| 1.0 - (hit.chunk.metadata.complexity - q).abs().min(1.0))
                    .unwrap_or(0.5);

                let score = strategy.rescore(ScoreSignals {
                    similarity: hit.score,
                    novelty,
                    recency,
                    complexity_fit,
                });

                RankedChunk {
                    chunk: hit.chunk,
                    similarity: hit.score,
                    score,
                    index: hit.index,
                }
            })
            .collect()
    }

    fn record(&self, elapsed: Duration, hit: bool) {
        if let Ok(mut metrics) = self.metrics.lock() {
            let n = metrics.total_retrievals;
            let total = metrics.average_time.as_secs_f64() * n as f64 + elapsed.as_secs_f64();
            metrics.total_retrievals = n + 1;
            if hit {
                metrics.cache_hits += 1;
            }
            metrics.average_time = Duration::from_secs_f64(total / (n + 1) as f64);
        }
    }

    pub fn metrics(&self) -> RetrievalMetrics {
        self.metrics.lock().map(|m| *m).unwrap_or_default()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Upserts a pre-embedded chunk and drops every cached result.
    pub fn index_chunk(&self, index: IndexName, chunk: SemanticChunk) -> Result<(), RetrievalError> {
        self.store.upsert(index, chunk)?;
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn remove_chunk(&self, index: IndexName, id: &str) -> Result<bool, RetrievalError> {
        let removed = self.store.delete(index, id)?;
        if removed {
            self.cache.invalidate_all();
        }
        Ok(removed)
    }

    /// Splits, classifies, embeds and indexes a document. Chunk ids are
    /// `<id_prefix>-<n>`. Returns the ids written.
    pub async fn index_text(
        &self,
        id_prefix: &str,
        text: &str,
        kind: Option<ContentKind>,
        metadata: ChunkMetadata,
    ) -> Result<Vec<String>, RetrievalError> {
        let pieces = chunk_text(text, self.config.chunk_max_chars, self.config.chunk_overlap);
        let mut ids = Vec::with_capacity(pieces.len());

        for (i, piece) in pieces.into_iter().enumerate() {
            let kind = kind.unwrap_or_else(|| classify_content(&piece));
            let embedding = self
                .embedder
                .embed(&piece)
                .await
                .map_err(RetrievalError::Embedding)?;

            let mut chunk_metadata = metadata.clone();
            chunk_metadata.complexity = analyze_query(&piece).complexity;
            let id = format!("{}-{}", id_prefix, i);
            let chunk = SemanticChunk::new(id.clone(), piece, kind, embedding)
                .with_metadata(chunk_metadata);

            self.store.upsert(IndexName::for_kind(kind), chunk)?;
            ids.push(id);
        }

        self.cache.invalidate_all();
        debug!(prefix = id_prefix, chunks = ids.len(), "Indexed document");
        Ok(ids)
    }
}
