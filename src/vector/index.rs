use super::types::IndexAlgorithm;

/// Nearest-neighbour structure behind one store partition.
///
/// Implementations only see ids and vectors; chunk payloads live in the
/// owning partition. Callers validate dimensions before calling in.
pub trait VectorIndex: Send + Sync {
    fn insert(&mut self, id: &str, vector: &[f32]);

    /// Returns true if `id` was present.
    fn remove(&mut self, id: &str) -> bool;

    /// Up to `k` `(id, similarity)` pairs, best first.
    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removed entries still occupying space.
    fn tombstones(&self) -> usize {
        0
    }

    fn algorithm(&self) -> IndexAlgorithm;
}
