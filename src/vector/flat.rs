use super::index::VectorIndex;
use super::math::cosine_similarity;
use super::types::IndexAlgorithm;
use std::collections::HashMap;

/// Exact cosine scan.
#[derive(Debug, Default)]
pub struct FlatIndex {
    vectors: HashMap<String, Vec<f32>>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: &str, vector: &[f32]) {
        self.vectors.insert(id.to_string(), vector.to_vec());
    }

    fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .filter(|(_, v)| v.len() == query.len())
            .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn algorithm(&self) -> IndexAlgorithm {
        IndexAlgorithm::Flat
    }
}
