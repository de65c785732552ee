//! Vector Index Store: named cosine-similarity indices over embedded chunks.

mod flat;
mod hnsw;
mod index;
pub mod math;
mod store;
mod types;

pub use flat::FlatIndex;
pub use hnsw::GraphIndex;
pub use index::VectorIndex;
pub use store::{StoreConfig, StoreError, VectorStore};
pub use types::{
    ChunkMetadata, ContentKind, DistanceMetric, IndexAlgorithm, IndexConfig, IndexName,
    IndexStats, SearchHit, SemanticChunk,
};
