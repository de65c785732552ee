//! Data carried by the vector store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Named partitions of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexName {
    Code,
    Docs,
    Api,
    Concepts,
}

impl IndexName {
    pub const ALL: [IndexName; 4] = [
        IndexName::Code,
        IndexName::Docs,
        IndexName::Api,
        IndexName::Concepts,
    ];

    /// Indices that hold retrievable content (everything but the concept catalog).
    pub const CONTENT: [IndexName; 3] = [IndexName::Code, IndexName::Docs, IndexName::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Code => "code",
            IndexName::Docs => "docs",
            IndexName::Api => "api",
            IndexName::Concepts => "concepts",
        }
    }

    /// Default index for content of the given kind.
    pub fn for_kind(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Code | ContentKind::Config => IndexName::Code,
            ContentKind::Documentation | ContentKind::Command => IndexName::Docs,
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentKind {
    Code,
    Config,
    Documentation,
    Command,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Code => "code",
            ContentKind::Config => "config",
            ContentKind::Documentation => "documentation",
            ContentKind::Command => "command",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: Option<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Estimated complexity in [0, 1].
    #[serde(default)]
    pub complexity: f32,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A unit of indexed content together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticChunk {
    pub id: String,
    pub content: String,
    pub kind: ContentKind,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub relevance: f32,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl SemanticChunk {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        kind: ContentKind,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            embedding,
            relevance: 0.0,
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = Some(language.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexAlgorithm {
    /// Exact scan over every vector.
    Flat,
    /// Layered proximity graph (HNSW).
    Graph {
        max_neighbors: usize,
        ef_construction: usize,
        ef_search: usize,
    },
}

impl IndexAlgorithm {
    pub fn graph() -> Self {
        IndexAlgorithm::Graph {
            max_neighbors: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: IndexName,
    pub dimension: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    pub algorithm: IndexAlgorithm,
}

impl IndexConfig {
    /// Flat for the small catalog-like indices, graph for bulk content.
    pub fn default_for(name: IndexName, dimension: usize) -> Self {
        let algorithm = match name {
            IndexName::Concepts | IndexName::Api => IndexAlgorithm::Flat,
            IndexName::Code | IndexName::Docs => IndexAlgorithm::graph(),
        };
        Self {
            name,
            dimension,
            metric: DistanceMetric::Cosine,
            algorithm,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: SemanticChunk,
    pub score: f32,
    pub index: IndexName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: IndexName,
    pub chunks: usize,
    pub dimension: usize,
    pub algorithm: IndexAlgorithm,
    pub tombstones: usize,
    pub searches: u64,
}
