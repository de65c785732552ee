//! Architectural pattern recognition over a set of mapped components.

use super::mapper::MappedComponent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternRecognizer {
    Mvc,
    Microservices,
    Layered,
    EventDriven,
    Repository,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedPattern {
    pub pattern: PatternRecognizer,
    pub name: String,
    pub confidence: f32,
    /// Ids of the supporting components.
    pub components: Vec<String>,
}

const LAYER_LABELS: &[&str] = &["presentation", "business", "service", "data", "persistence"];
const BROKER_LABELS: &[&str] = &["broker", "queue", "event", "bus", "kafka", "rabbitmq"];
const PARTICIPANT_LABELS: &[&str] = &[
    "producer",
    "consumer",
    "publisher",
    "subscriber",
    "worker",
    "listener",
    "handler",
];
const REPOSITORY_LABELS: &[&str] = &["repository", "dao"];
const DATA_STORE_LABELS: &[&str] = &[
    "database",
    "db",
    "postgres",
    "postgresql",
    "mysql",
    "mongo",
    "mongodb",
    "sqlite",
];
const SERVICE_LABELS: &[&str] = &["service", "microservice", "api"];

impl PatternRecognizer {
    pub const ALL: [PatternRecognizer; 5] = [
        PatternRecognizer::Mvc,
        PatternRecognizer::Microservices,
        PatternRecognizer::Layered,
        PatternRecognizer::EventDriven,
        PatternRecognizer::Repository,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PatternRecognizer::Mvc => "MVC",
            PatternRecognizer::Microservices => "Microservices",
            PatternRecognizer::Layered => "Layered",
            PatternRecognizer::EventDriven => "Event-Driven",
            PatternRecognizer::Repository => "Repository",
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            PatternRecognizer::Mvc => 0.9,
            PatternRecognizer::Microservices => 0.85,
            PatternRecognizer::Layered => 0.8,
            PatternRecognizer::EventDriven => 0.75,
            PatternRecognizer::Repository => 0.7,
        }
    }

    pub fn recognize(&self, components: &[MappedComponent]) -> Option<RecognizedPattern> {
        let supporting = match self {
            PatternRecognizer::Mvc => {
                let roles = ["model", "view", "controller"];
                if !roles.iter().all(|r| components.iter().any(|c| c.carries(r))) {
                    return None;
                }
                with_any(components, &roles)
            }
            PatternRecognizer::Microservices => {
                let services = with_any(components, SERVICE_LABELS);
                if services.len() < 3 {
                    return None;
                }
                services
            }
            PatternRecognizer::Layered => {
                let present = LAYER_LABELS
                    .iter()
                    .filter(|layer| components.iter().any(|c| c.carries(layer)))
                    .count();
                if present < 3 {
                    return None;
                }
                with_any(components, LAYER_LABELS)
            }
            PatternRecognizer::EventDriven => {
                let brokers = with_any(components, BROKER_LABELS);
                let participants: Vec<String> = with_any(components, PARTICIPANT_LABELS)
                    .into_iter()
                    .filter(|id| !brokers.contains(id))
                    .collect();
                if brokers.is_empty() || participants.len() < 2 {
                    return None;
                }
                merge(brokers, participants)
            }
            PatternRecognizer::Repository => {
                let repositories = with_any(components, REPOSITORY_LABELS);
                let stores: Vec<String> = with_any(components, DATA_STORE_LABELS)
                    .into_iter()
                    .filter(|id| !repositories.contains(id))
                    .collect();
                if repositories.is_empty() || stores.is_empty() {
                    return None;
                }
                merge(repositories, stores)
            }
        };

        Some(RecognizedPattern {
            pattern: *self,
            name: self.name().to_string(),
            confidence: self.confidence(),
            components: supporting,
        })
    }
}

/// Runs every recognizer; hits sorted by confidence, highest first.
pub fn recognize_patterns(components: &[MappedComponent]) -> Vec<RecognizedPattern> {
    let mut hits: Vec<RecognizedPattern> = PatternRecognizer::ALL
        .iter()
        .filter_map(|r| r.recognize(components))
        .collect();
    hits.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    hits
}

/// Ids of components carrying any of `labels`, in input order.
fn with_any(components: &[MappedComponent], labels: &[&str]) -> Vec<String> {
    components
        .iter()
        .filter(|c| labels.iter().any(|l| c.carries(l)))
        .map(|c| c.component_id.clone())
        .collect()
}

fn merge(mut first: Vec<String>, second: Vec<String>) -> Vec<String> {
    for id in second {
        if !first.contains(&id) {
            first.push(id);
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concepts::ConceptCategory;
    use std::collections::BTreeSet;

    fn mapped(id: &str, labels: &[&str]) -> MappedComponent {
        MappedComponent {
            component_id: id.to_string(),
            component_name: id.to_string(),
            concept: "service".to_string(),
            category: ConceptCategory::ComponentType,
            confidence: 0.8,
            related_concepts: Vec::new(),
            alternatives: Vec::new(),
            labels: labels.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_mvc_requires_all_three_roles() {
        let components = vec![mapped("m", &["model"]), mapped("v", &["view"])];
        assert!(PatternRecognizer::Mvc.recognize(&components).is_none());

        let components = vec![
            mapped("m", &["user", "model"]),
            mapped("v", &["view"]),
            mapped("c", &["controllers"]),
            mapped("x", &["logger"]),
        ];
        let hit = PatternRecognizer::Mvc.recognize(&components).unwrap();
        assert_eq!(hit.components, vec!["m", "v", "c"]);
        assert_eq!(hit.confidence, 0.9);
    }

    #[test]
    fn test_mvc_ignores_embedded_role_names() {
        let components = vec![
            mapped("m", &["order", "model"]),
            mapped("v", &["order", "view"]),
            mapped("c", &["order", "controller"]),
            mapped("r", &["review", "service"]),
        ];
        let hit = PatternRecognizer::Mvc.recognize(&components).unwrap();
        assert_eq!(hit.components, vec!["m", "v", "c"]);

        let no_view = vec![
            mapped("m", &["model"]),
            mapped("r", &["review"]),
            mapped("c", &["controller"]),
        ];
        assert!(PatternRecognizer::Mvc.recognize(&no_view).is_none());
    }

    #[test]
    fn test_microservices_needs_three() {
        let two = vec![mapped("a", &["service"]), mapped("b", &["api"])];
        assert!(PatternRecognizer::Microservices.recognize(&two).is_none());

        let three = vec![
            mapped("a", &["service"]),
            mapped("b", &["api"]),
            mapped("c", &["microservice"]),
        ];
        let hit = PatternRecognizer::Microservices.recognize(&three).unwrap();
        assert_eq!(hit.components.len(), 3);
    }

    #[test]
    fn test_layered_counts_distinct_layers() {
        let same_layer = vec![
            mapped("a", &["presentation"]),
            mapped("b", &["presentation"]),
            mapped("c", &["presentation"]),
        ];
        assert!(PatternRecognizer::Layered.recognize(&same_layer).is_none());

        let layers = vec![
            mapped("ui", &["presentation"]),
            mapped("core", &["business"]),
            mapped("dal", &["persistence"]),
        ];
        assert!(PatternRecognizer::Layered.recognize(&layers).is_some());
    }

    #[test]
    fn test_event_driven_and_repository() {
        let components = vec![
            mapped("bus", &["event", "bus"]),
            mapped("orders", &["publisher"]),
            mapped("mailer", &["consumer"]),
            mapped("repo", &["repository"]),
            mapped("pg", &["database"]),
        ];
        let hits = recognize_patterns(&components);
        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Event-Driven", "Repository"]);
        assert_eq!(hits[0].components, vec!["bus", "orders", "mailer"]);
        assert_eq!(hits[1].components, vec!["repo", "pg"]);
    }

    #[test]
    fn test_sorted_by_confidence() {
        let components = vec![
            mapped("m", &["model"]),
            mapped("v", &["view"]),
            mapped("c", &["controller"]),
            mapped("s1", &["service"]),
            mapped("s2", &["service"]),
            mapped("s3", &["api"]),
        ];
        let hits = recognize_patterns(&components);
        assert_eq!(hits[0].pattern, PatternRecognizer::Mvc);
        assert!(hits.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }
}
