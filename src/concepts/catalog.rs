//! Static catalog of architectural concepts.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptCategory {
    ArchitecturalPattern,
    DesignPattern,
    ComponentType,
    DataPattern,
    IntegrationPattern,
    PerformancePattern,
}

impl ConceptCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConceptCategory::ArchitecturalPattern => "architectural_pattern",
            ConceptCategory::DesignPattern => "design_pattern",
            ConceptCategory::ComponentType => "component_type",
            ConceptCategory::DataPattern => "data_pattern",
            ConceptCategory::IntegrationPattern => "integration_pattern",
            ConceptCategory::PerformancePattern => "performance_pattern",
        }
    }
}

impl fmt::Display for ConceptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Uses,
    DependsOn,
    Contains,
    Communicates,
}

/// Directed, weighted edge to another concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRelationship {
    pub target: String,
    pub kind: RelationshipKind,
    /// In [0, 1].
    pub strength: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturalConcept {
    pub name: String,
    pub description: String,
    pub category: ConceptCategory,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<ConceptRelationship>,
    /// Filled in when the catalog is loaded into the concepts index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl ArchitecturalConcept {
    /// Text embedded for the concept: name, description and keywords.
    pub fn embedding_text(&self) -> String {
        format!(
            "{} {} {}",
            self.name.replace('_', " "),
            self.description,
            self.keywords.join(" ")
        )
    }

    /// Relationships at or above `min_strength`.
    pub fn strong_relationships(&self, min_strength: f32) -> impl Iterator<Item = &ConceptRelationship> {
        self.relationships
            .iter()
            .filter(move |r| r.strength >= min_strength)
    }
}

fn concept(
    name: &str,
    category: ConceptCategory,
    description: &str,
    keywords: &[&str],
    relationships: &[(&str, RelationshipKind, f32)],
) -> ArchitecturalConcept {
    ArchitecturalConcept {
        name: name.to_string(),
        description: description.to_string(),
        category,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        relationships: relationships
            .iter()
            .map(|(target, kind, strength)| ConceptRelationship {
                target: target.to_string(),
                kind: *kind,
                strength: *strength,
            })
            .collect(),
        embedding: Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptCatalog {
    concepts: Vec<ArchitecturalConcept>,
}

impl ConceptCatalog {
    pub fn new(concepts: Vec<ArchitecturalConcept>) -> Self {
        Self { concepts }
    }

    pub fn builtin() -> Self {
        use ConceptCategory::*;
        use RelationshipKind::*;

        Self::new(vec![
            concept(
                "model",
                DesignPattern,
                "Domain model or entity holding application state",
                &["model", "entity", "schema", "domain", "orm"],
                &[],
            ),
            concept(
                "view",
                ComponentType,
                "User facing view rendering templates or pages",
                &["view", "template", "page", "ui", "frontend", "component"],
                &[("model", DependsOn, 0.7)],
            ),
            concept(
                "controller",
                ComponentType,
                "Controller handling requests and coordinating models and views",
                &["controller", "handler", "route", "endpoint", "action"],
                &[("model", Uses, 0.8), ("view", Uses, 0.8), ("service", Uses, 0.7)],
            ),
            concept(
                "service",
                ComponentType,
                "Service implementing business logic behind an interface",
                &["service", "business", "logic", "backend", "server"],
                &[("repository", Uses, 0.8), ("cache", Uses, 0.5)],
            ),
            concept(
                "microservice",
                ArchitecturalPattern,
                "Independently deployable service owning its data",
                &["microservice", "service", "independent", "deployable", "container"],
                &[("api_gateway", Communicates, 0.6), ("message_queue", Communicates, 0.6)],
            ),
            concept(
                "api_gateway",
                IntegrationPattern,
                "Gateway routing external API traffic to internal services",
                &["gateway", "api", "proxy", "ingress", "router"],
                &[("service", Communicates, 0.9), ("authentication", Uses, 0.7)],
            ),
            concept(
                "repository",
                DataPattern,
                "Repository or data access object mediating persistence",
                &["repository", "dao", "persistence", "query", "store"],
                &[("database", DependsOn, 0.9), ("model", Uses, 0.7)],
            ),
            concept(
                "database",
                DataPattern,
                "Relational or document database",
                &["database", "db", "postgres", "mysql", "mongodb", "sql", "sqlite"],
                &[],
            ),
            concept(
                "cache",
                PerformancePattern,
                "In-memory cache for hot data",
                &["cache", "redis", "memcached", "caching"],
                &[],
            ),
            concept(
                "message_queue",
                IntegrationPattern,
                "Message broker or queue decoupling producers and consumers",
                &["queue", "broker", "rabbitmq", "kafka", "sqs", "message"],
                &[],
            ),
            concept(
                "event_bus",
                IntegrationPattern,
                "Event bus publishing domain events to subscribers",
                &["event", "bus", "pubsub", "publish", "subscribe", "stream"],
                &[("message_queue", DependsOn, 0.7)],
            ),
            concept(
                "worker",
                ComponentType,
                "Background worker consuming jobs",
                &["worker", "job", "consumer", "background", "task"],
                &[("message_queue", Uses, 0.8)],
            ),
            concept(
                "scheduler",
                ComponentType,
                "Scheduler triggering periodic work",
                &["scheduler", "cron", "timer", "periodic"],
                &[("worker", Uses, 0.7)],
            ),
            concept(
                "authentication",
                ComponentType,
                "Authentication and identity management",
                &["auth", "authentication", "login", "identity", "oauth", "jwt"],
                &[("database", Uses, 0.6)],
            ),
            concept(
                "load_balancer",
                PerformancePattern,
                "Load balancer spreading traffic across instances",
                &["load", "balancer", "nginx", "haproxy", "traffic"],
                &[("service", Communicates, 0.8)],
            ),
            concept(
                "storage",
                DataPattern,
                "Object or file storage",
                &["storage", "blob", "s3", "file", "bucket", "volume"],
                &[],
            ),
            concept(
                "monitoring",
                PerformancePattern,
                "Metrics, logging and alerting",
                &["monitoring", "metrics", "prometheus", "grafana", "alerting"],
                &[],
            ),
            concept(
                "presentation_layer",
                ArchitecturalPattern,
                "Presentation layer of a layered architecture",
                &["presentation", "layer", "frontend", "ui"],
                &[("business_layer", DependsOn, 0.9), ("view", Contains, 0.8)],
            ),
            concept(
                "business_layer",
                ArchitecturalPattern,
                "Business layer holding domain rules",
                &["business", "layer", "domain", "rules"],
                &[("data_layer", DependsOn, 0.9), ("service", Contains, 0.8)],
            ),
            concept(
                "data_layer",
                ArchitecturalPattern,
                "Data access layer of a layered architecture",
                &["data", "layer", "persistence", "access"],
                &[("database", DependsOn, 0.8), ("repository", Contains, 0.8)],
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ArchitecturalConcept> {
        self.concepts.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArchitecturalConcept> {
        self.concepts.iter()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn by_category(&self, category: ConceptCategory) -> Vec<&ArchitecturalConcept> {
        self.concepts
            .iter()
            .filter(|c| c.category == category)
            .collect()
    }
}

impl Default for ConceptCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let catalog = ConceptCatalog::builtin();
        assert_eq!(catalog.len(), 20);

        let names: HashSet<&str> = catalog.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len(), "concept names must be unique");

        for concept in catalog.iter() {
            for rel in &concept.relationships {
                assert!(names.contains(rel.target.as_str()), "{} -> {}", concept.name, rel.target);
                assert!((0.0..=1.0).contains(&rel.strength));
                assert_ne!(rel.target, concept.name);
            }
        }
    }

    #[test]
    fn test_every_category_is_used() {
        let catalog = ConceptCatalog::builtin();
        for category in [
            ConceptCategory::ArchitecturalPattern,
            ConceptCategory::DesignPattern,
            ConceptCategory::ComponentType,
            ConceptCategory::DataPattern,
            ConceptCategory::IntegrationPattern,
            ConceptCategory::PerformancePattern,
        ] {
            assert!(!catalog.by_category(category).is_empty(), "{category}");
        }
    }

    #[test]
    fn test_strong_relationships() {
        let catalog = ConceptCatalog::builtin();
        let controller = catalog.get("controller").unwrap();
        let strong: Vec<&str> = controller
            .strong_relationships(0.75)
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(strong, vec!["model", "view"]);
    }

    #[test]
    fn test_embedding_text() {
        let catalog = ConceptCatalog::builtin();
        let text = catalog.get("api_gateway").unwrap().embedding_text();
        assert!(text.starts_with("api gateway "));
        assert!(text.contains("ingress"));
    }
}
