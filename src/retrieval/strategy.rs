//! Re-scoring strategies applied to raw similarity hits.

use super::query::{QueryAnalysis, QueryIntent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    Precision,
    Exploration,
    Balanced,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyWeights {
    pub similarity: f32,
    pub diversity: f32,
    pub recency: f32,
    pub complexity: f32,
}

/// Per-candidate signals in [0, 1] fed into [`RetrievalStrategy::rescore`].
#[derive(Debug, Clone, Copy)]
pub struct ScoreSignals {
    pub similarity: f32,
    pub novelty: f32,
    pub recency: f32,
    pub complexity_fit: f32,
}

impl RetrievalStrategy {
    /// Small result sets want precision, high diversity wants exploration;
    /// otherwise the query's shape decides, falling back to balanced.
    pub fn select(max_chunks: usize, diversity_factor: f32, query: Option<&QueryAnalysis>) -> Self {
        if max_chunks <= 3 {
            return RetrievalStrategy::Precision;
        }
        if diversity_factor >= 0.6 {
            return RetrievalStrategy::Exploration;
        }
        match query {
            Some(q) if q.intent == QueryIntent::Debugging => RetrievalStrategy::Precision,
            Some(q) if q.intent == QueryIntent::Architecture || q.domains.len() >= 3 => {
                RetrievalStrategy::Exploration
            }
            _ => RetrievalStrategy::Balanced,
        }
    }

    pub fn weights(&self) -> StrategyWeights {
        match self {
            RetrievalStrategy::Precision => StrategyWeights {
                similarity: 0.7,
                diversity: 0.1,
                recency: 0.1,
                complexity: 0.1,
            },
            RetrievalStrategy::Exploration => StrategyWeights {
                similarity: 0.4,
                diversity: 0.4,
                recency: 0.1,
                complexity: 0.1,
            },
            RetrievalStrategy::Balanced => StrategyWeights {
                similarity: 0.55,
                diversity: 0.25,
                recency: 0.1,
                complexity: 0.1,
            },
        }
    }

    /// Weighted blend of the signals, never above the raw similarity.
    pub fn rescore(&self, signals: ScoreSignals) -> f32 {
        let w = self.weights();
        let blended = signals.similarity * w.similarity
            + signals.novelty * w.diversity
            + signals.recency * w.recency
            + signals.complexity_fit * w.complexity;
        blended.clamp(0.0, signals.similarity.max(0.0))
    }
}
