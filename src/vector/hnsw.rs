//! Layered proximity graph (HNSW) for approximate cosine search.
//!
//! Every node draws a top layer from an exponential distribution; upper
//! layers are sparse express lanes walked greedily, layer 0 holds every node
//! and is searched with a bounded beam. Removal only tombstones a node so the
//! graph keeps routing through it; once tombstones outnumber live nodes the
//! graph is rebuilt from the survivors.

use super::index::VectorIndex;
use super::math::cosine_similarity;
use super::types::IndexAlgorithm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

const MAX_LEVEL: usize = 16;
const REBUILD_MIN_TOMBSTONES: usize = 32;
pub const DEFAULT_SEED: u64 = 0x5eed_0f_9a9e;

#[derive(Debug, Clone, Copy)]
struct Scored {
    sim: f32,
    node: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sim
            .total_cmp(&other.sim)
            .then_with(|| other.node.cmp(&self.node))
    }
}

#[derive(Debug)]
struct Node {
    id: String,
    vector: Vec<f32>,
    /// Neighbour lists, one per layer this node lives on.
    layers: Vec<Vec<usize>>,
    deleted: bool,
}

pub struct GraphIndex {
    nodes: Vec<Node>,
    ids: HashMap<String, usize>,
    entry: Option<usize>,
    max_level: usize,
    max_neighbors: usize,
    max_neighbors_layer0: usize,
    ef_construction: usize,
    ef_search: usize,
    level_mult: f64,
    seed: u64,
    rng: StdRng,
}

impl GraphIndex {
    pub fn new(max_neighbors: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self::with_seed(max_neighbors, ef_construction, ef_search, DEFAULT_SEED)
    }

    /// Same seed and insertion order always produce the same graph.
    pub fn with_seed(
        max_neighbors: usize,
        ef_construction: usize,
        ef_search: usize,
        seed: u64,
    ) -> Self {
        let m = max_neighbors.max(2);
        Self {
            nodes: Vec::new(),
            ids: HashMap::new(),
            entry: None,
            max_level: 0,
            max_neighbors: m,
            max_neighbors_layer0: m * 2,
            ef_construction: ef_construction.max(m),
            ef_search: ef_search.max(1),
            level_mult: 1.0 / (m as f64).ln(),
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        ((-r.ln()) * self.level_mult).floor().min(MAX_LEVEL as f64) as usize
    }

    fn similarity(&self, query: &[f32], node: usize) -> f32 {
        cosine_similarity(query, &self.nodes[node].vector)
    }

    fn greedy_closest(&self, query: &[f32], mut current: usize, layer: usize) -> usize {
        let mut best = self.similarity(query, current);
        loop {
            let mut moved = false;
            for &neighbor in &self.nodes[current].layers[layer] {
                let sim = self.similarity(query, neighbor);
                if sim > best {
                    best = sim;
                    current = neighbor;
                    moved = true;
                }
            }
            if !moved {
                return current;
            }
        }
    }

    /// Beam search on one layer; results best first, tombstones included.
    fn search_layer(&self, query: &[f32], entry: usize, ef: usize, layer: usize) -> Vec<Scored> {
        let start = Scored {
            sim: self.similarity(query, entry),
            node: entry,
        };
        let mut visited = HashSet::from([entry]);
        let mut candidates = BinaryHeap::from([start]);
        let mut results = BinaryHeap::from([Reverse(start)]);

        while let Some(candidate) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.sim).unwrap_or(f32::MIN);
            if candidate.sim < worst && results.len() >= ef {
                break;
            }

            for &neighbor in &self.nodes[candidate.node].layers[layer] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = Scored {
                    sim: self.similarity(query, neighbor),
                    node: neighbor,
                };
                let worst = results.peek().map(|r| r.0.sim).unwrap_or(f32::MIN);
                if results.len() < ef || scored.sim > worst {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    fn prune(&mut self, node: usize, layer: usize, cap: usize) {
        let base = &self.nodes[node];
        let mut scored: Vec<Scored> = base.layers[layer]
            .iter()
            .map(|&other| Scored {
                sim: cosine_similarity(&base.vector, &self.nodes[other].vector),
                node: other,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(cap);
        self.nodes[node].layers[layer] = scored.into_iter().map(|s| s.node).collect();
    }

    fn live(&self) -> usize {
        self.ids.len()
    }

    fn rebuild(&mut self) {
        let survivors: Vec<(String, Vec<f32>)> = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter(|n| !n.deleted)
            .map(|n| (n.id, n.vector))
            .collect();

        self.ids.clear();
        self.entry = None;
        self.max_level = 0;
        self.rng = StdRng::seed_from_u64(self.seed);

        for (id, vector) in survivors {
            self.insert(&id, &vector);
        }
    }
}

impl VectorIndex for GraphIndex {
    fn insert(&mut self, id: &str, vector: &[f32]) {
        if self.ids.contains_key(id) {
            self.remove(id);
        }

        let level = self.random_level();
        let idx = self.nodes.len();
        self.nodes.push(Node {
            id: id.to_string(),
            vector: vector.to_vec(),
            layers: vec![Vec::new(); level + 1],
            deleted: false,
        });
        self.ids.insert(id.to_string(), idx);

        let Some(mut entry) = self.entry else {
            self.entry = Some(idx);
            self.max_level = level;
            return;
        };

        for layer in ((level + 1)..=self.max_level).rev() {
            entry = self.greedy_closest(vector, entry, layer);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(vector, entry, self.ef_construction, layer);
            let cap = if layer == 0 {
                self.max_neighbors_layer0
            } else {
                self.max_neighbors
            };

            let neighbors: Vec<usize> = candidates
                .iter()
                .filter(|s| s.node != idx)
                .take(self.max_neighbors)
                .map(|s| s.node)
                .collect();

            for &neighbor in &neighbors {
                self.nodes[neighbor].layers[layer].push(idx);
                if self.nodes[neighbor].layers[layer].len() > cap {
                    self.prune(neighbor, layer, cap);
                }
            }
            self.nodes[idx].layers[layer] = neighbors;

            if let Some(best) = candidates.first() {
                entry = best.node;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry = Some(idx);
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(idx) = self.ids.remove(id) else {
            return false;
        };
        self.nodes[idx].deleted = true;

        if self.ids.is_empty() {
            self.nodes.clear();
            self.entry = None;
            self.max_level = 0;
        } else if self.tombstones() > self.live() && self.tombstones() >= REBUILD_MIN_TOMBSTONES {
            self.rebuild();
        }
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(String, f32)> {
        let Some(mut entry) = self.entry else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        for layer in (1..=self.max_level).rev() {
            entry = self.greedy_closest(query, entry, layer);
        }

        let ef = self.ef_search.max(k) + self.tombstones().min(self.ef_search);
        self.search_layer(query, entry, ef, 0)
            .into_iter()
            .filter(|s| !self.nodes[s.node].deleted)
            .take(k)
            .map(|s| (self.nodes[s.node].id.clone(), s.sim))
            .collect()
    }

    fn len(&self) -> usize {
        self.live()
    }

    fn tombstones(&self) -> usize {
        self.nodes.len() - self.live()
    }

    fn algorithm(&self) -> IndexAlgorithm {
        IndexAlgorithm::Graph {
            max_neighbors: self.max_neighbors,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
        }
    }
}
