//! Semantic Retriever: turns a query into ranked, diversified context.

mod cache;
mod diversity;
mod ingest;
mod query;
mod retriever;
mod strategy;

pub use cache::RetrievalCache;
pub use diversity::{apply_diversity, DIVERSITY_FLOOR};
pub use ingest::{chunk_text, classify_content};
pub use query::{analyze_query, QueryAnalysis, QueryIntent};
pub use retriever::{
    RankedChunk, RetrievalError, RetrievalMetrics, RetrievalOptions, RetrievedContext,
    RetrieverConfig, SemanticRetriever,
};
pub use strategy::{RetrievalStrategy, ScoreSignals, StrategyWeights};
