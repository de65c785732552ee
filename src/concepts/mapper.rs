//! Conceptual Mapper: assigns analyzed components to catalog concepts.

use super::catalog::{ConceptCatalog, ConceptCategory};
use super::hierarchy::ConceptHierarchy;
use super::patterns::{recognize_patterns, RecognizedPattern};
use crate::collaborators::{CollaboratorError, Embedder, HashingEmbedder, SystemComponent};
use crate::vector::{ChunkMetadata, ContentKind, IndexName, SemanticChunk, StoreError, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const CONCEPT_ID_PREFIX: &str = "concept:";
const CATALOG_SOURCE: &str = "concept-catalog";

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] CollaboratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingOptions {
    pub confidence_threshold: f32,
    /// Nearest concepts considered per component.
    pub top_k: usize,
    /// Minimum edge strength for related concepts.
    pub related_strength: f32,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            top_k: 3,
            related_strength: 0.7,
        }
    }
}

impl MappingOptions {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptMatch {
    pub concept: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedComponent {
    pub component_id: String,
    pub component_name: String,
    pub concept: String,
    pub category: ConceptCategory,
    /// In [0, 1].
    pub confidence: f32,
    pub related_concepts: Vec<String>,
    /// Runner-up matches above the threshold.
    pub alternatives: Vec<ConceptMatch>,
    /// Lowercased tokens from the component and its concept name.
    pub labels: BTreeSet<String>,
}

impl MappedComponent {
    /// Whether some label is the whole token `label` or its plural
    /// (`controllers`, `addresses`). `review` does not carry `view`.
    pub fn carries(&self, label: &str) -> bool {
        self.labels.iter().any(|token| {
            token
                .strip_prefix(label)
                .is_some_and(|rest| matches!(rest, "" | "s" | "es"))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptualMapping {
    pub mapped_components: Vec<MappedComponent>,
    /// Ids of components with no concept above the threshold.
    pub unmapped_components: Vec<String>,
    pub patterns: Vec<RecognizedPattern>,
    pub hierarchy: ConceptHierarchy,
    /// Mean confidence over mapped components.
    pub confidence: f32,
    pub elapsed: Duration,
}

pub struct ConceptualMapper {
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    catalog: ConceptCatalog,
    loaded: OnceCell<usize>,
}

impl ConceptualMapper {
    pub fn new(store: Arc<VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self::with_catalog(store, embedder, ConceptCatalog::builtin())
    }

    pub fn with_catalog(
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        catalog: ConceptCatalog,
    ) -> Self {
        Self {
            store,
            embedder,
            catalog,
            loaded: OnceCell::new(),
        }
    }

    pub fn catalog(&self) -> &ConceptCatalog {
        &self.catalog
    }

    pub fn is_initialized(&self) -> bool {
        self.loaded.initialized()
    }

    /// Embeds the catalog into the concepts index. Runs once; concurrent and
    /// later calls wait for and return the first load's count.
    pub async fn initialize_catalog(&self) -> Result<usize, MappingError> {
        self.loaded
            .get_or_try_init(|| self.load_catalog())
            .await
            .copied()
    }

    /// Re-embeds and re-upserts every concept regardless of earlier loads.
    pub async fn reload_catalog(&self) -> Result<usize, MappingError> {
        let count = self.load_catalog().await?;
        let _ = self.loaded.set(count);
        info!(concepts = count, "Concept catalog reloaded");
        Ok(count)
    }

    async fn load_catalog(&self) -> Result<usize, MappingError> {
        for concept in self.catalog.iter() {
            let embedding = self
                .embedder
                .embed(&concept.embedding_text())
                .await
                .map_err(MappingError::Embedding)?;

            let metadata = ChunkMetadata {
                source: Some(CATALOG_SOURCE.to_string()),
                tags: concept.keywords.iter().cloned().collect(),
                ..ChunkMetadata::default()
            };
            let chunk = SemanticChunk::new(
                format!("{}{}", CONCEPT_ID_PREFIX, concept.name),
                concept.description.clone(),
                ContentKind::Documentation,
                embedding,
            )
            .with_metadata(metadata);
            self.store.upsert(IndexName::Concepts, chunk)?;
        }

        info!(concepts = self.catalog.len(), "Concept catalog loaded");
        Ok(self.catalog.len())
    }

    pub async fn map_components(
        &self,
        components: &[SystemComponent],
        options: &MappingOptions,
    ) -> Result<ConceptualMapping, MappingError> {
        let start = Instant::now();
        self.initialize_catalog().await?;

        let mut mapped = Vec::new();
        let mut unmapped = Vec::new();

        for component in components {
            match self.map_one(component, options).await? {
                Some(m) => mapped.push(m),
                None => unmapped.push(component.id.clone()),
            }
        }

        let patterns = recognize_patterns(&mapped);
        let hierarchy = ConceptHierarchy::build(&mapped, &self.catalog);
        let confidence = if mapped.is_empty() {
            0.0
        } else {
            mapped.iter().map(|m| m.confidence).sum::<f32>() / mapped.len() as f32
        };

        info!(
            components = components.len(),
            mapped = mapped.len(),
            patterns = patterns.len(),
            confidence,
            "Mapped components to concepts"
        );

        Ok(ConceptualMapping {
            mapped_components: mapped,
            unmapped_components: unmapped,
            patterns,
            hierarchy,
            confidence,
            elapsed: start.elapsed(),
        })
    }

    async fn map_one(
        &self,
        component: &SystemComponent,
        options: &MappingOptions,
    ) -> Result<Option<MappedComponent>, MappingError> {
        let vector = self
            .embedder
            .embed(&component.signature())
            .await
            .map_err(MappingError::Embedding)?;

        let hits = self.store.search_similar(
            IndexName::Concepts,
            &vector,
            options.top_k.max(1),
            options.confidence_threshold,
        )?;

        let mut matches = hits.into_iter().filter_map(|hit| {
            let name = hit.chunk.id.strip_prefix(CONCEPT_ID_PREFIX)?.to_string();
            let confidence = hit.score.clamp(0.0, 1.0);
            (confidence >= options.confidence_threshold).then_some(ConceptMatch {
                concept: name,
                confidence,
            })
        });

        let Some(best) = matches.next() else {
            debug!(component = %component.id, "No concept above threshold");
            return Ok(None);
        };
        let alternatives: Vec<ConceptMatch> = matches.collect();

        let Some(concept) = self.catalog.get(&best.concept) else {
            return Ok(None);
        };
        let related_concepts = concept
            .strong_relationships(options.related_strength)
            .map(|r| r.target.clone())
            .collect();

        let mut labels: BTreeSet<String> = [
            component.name.as_str(),
            component.component_type.as_str(),
            component.description.as_str(),
        ]
        .iter()
        .flat_map(|text| HashingEmbedder::tokenize(text))
        .collect();
        labels.extend(concept.name.split('_').map(str::to_string));

        Ok(Some(MappedComponent {
            component_id: component.id.clone(),
            component_name: component.name.clone(),
            concept: best.concept,
            category: concept.category,
            confidence: best.confidence,
            related_concepts,
            alternatives,
            labels,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One dimension per keyword; a text lights up the keywords it contains.
    struct KeywordEmbedder {
        keywords: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                keywords: vec!["model", "view", "controller", "service", "database", "queue"],
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lower = text.to_lowercase();
            Ok(self
                .keywords
                .iter()
                .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.keywords.len()
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    fn mapper() -> (ConceptualMapper, Arc<KeywordEmbedder>) {
        let embedder = Arc::new(KeywordEmbedder::new());
        let store = Arc::new(VectorStore::in_memory(embedder.dimension()).unwrap());
        (ConceptualMapper::new(store, embedder.clone()), embedder)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (mapper, embedder) = mapper();
        let first = mapper.initialize_catalog().await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);
        let second = mapper.initialize_catalog().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls, embedder.calls.load(Ordering::SeqCst));
        assert_eq!(mapper.store.len(IndexName::Concepts).unwrap(), first);
        assert!(mapper.is_initialized());
    }

    #[tokio::test]
    async fn test_reload_re_embeds() {
        let (mapper, embedder) = mapper();
        mapper.initialize_catalog().await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);
        mapper.reload_catalog().await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls * 2);
        assert_eq!(mapper.store.len(IndexName::Concepts).unwrap(), mapper.catalog().len());
    }

    #[tokio::test]
    async fn test_maps_components_and_respects_threshold() {
        let (mapper, _) = mapper();
        let components = vec![
            SystemComponent::new("c1", "UserController", "controller"),
            SystemComponent::new("c2", "AuditTrail", "library"),
        ];
        let mapping = mapper
            .map_components(&components, &MappingOptions::default())
            .await
            .unwrap();

        assert_eq!(mapping.mapped_components.len(), 1);
        let controller = &mapping.mapped_components[0];
        assert_eq!(controller.concept, "controller");
        assert!((0.0..=1.0).contains(&controller.confidence));
        assert!(controller.confidence >= 0.5);
        assert!(controller.related_concepts.contains(&"model".to_string()));
        assert!(controller.carries("controller"));
        assert_eq!(mapping.unmapped_components, vec!["c2"]);
    }

    #[tokio::test]
    async fn test_high_threshold_drops_everything() {
        let (mapper, _) = mapper();
        let components = vec![SystemComponent::new("c1", "OrderService", "service")
            .with_description("talks to the database")];
        let mapping = mapper
            .map_components(&components, &MappingOptions::default().with_confidence_threshold(1.01))
            .await
            .unwrap();
        assert!(mapping.mapped_components.is_empty());
        assert_eq!(mapping.confidence, 0.0);
    }

    #[test]
    fn test_carries_label_forms() {
        let component = MappedComponent {
            component_id: "x".into(),
            component_name: "x".into(),
            concept: "service".into(),
            category: ConceptCategory::ComponentType,
            confidence: 0.9,
            related_concepts: Vec::new(),
            alternatives: Vec::new(),
            labels: ["controllers", "order", "microservice", "review", "statuses"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        assert!(component.carries("controller"));
        assert!(component.carries("microservice"));
        assert!(component.carries("status"));
        assert!(!component.carries("service"));
        assert!(!component.carries("view"));
        assert!(!component.carries("control"));
        assert!(!component.carries("model"));
    }
}
