//! Concept hierarchy derived from a mapping.

use super::catalog::{ConceptCatalog, ConceptCategory, RelationshipKind};
use super::mapper::MappedComponent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    pub concept: String,
    pub category: ConceptCategory,
    /// Mean confidence of the member components.
    pub confidence: f32,
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: String,
    pub to: String,
    pub kind: RelationshipKind,
    pub strength: f32,
    /// Components assigned to either endpoint.
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptHierarchy {
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
    /// Present concepts that no other present concept points at.
    pub roots: Vec<String>,
}

impl ConceptHierarchy {
    pub fn build(mapped: &[MappedComponent], catalog: &ConceptCatalog) -> Self {
        let mut groups: BTreeMap<&str, Vec<&MappedComponent>> = BTreeMap::new();
        for component in mapped {
            groups.entry(component.concept.as_str()).or_default().push(component);
        }

        let nodes: Vec<ConceptNode> = groups
            .iter()
            .map(|(concept, members)| ConceptNode {
                concept: concept.to_string(),
                category: members[0].category,
                confidence: members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32,
                components: members.iter().map(|m| m.component_id.clone()).collect(),
            })
            .collect();

        let mut edges = Vec::new();
        let mut targets = BTreeSet::new();
        for (concept, members) in &groups {
            let Some(entry) = catalog.get(concept) else {
                continue;
            };
            for rel in &entry.relationships {
                let Some(target_members) = groups.get(rel.target.as_str()) else {
                    continue;
                };
                targets.insert(rel.target.as_str());

                let evidence: BTreeSet<String> = members
                    .iter()
                    .chain(target_members.iter())
                    .map(|m| m.component_id.clone())
                    .collect();
                edges.push(ConceptEdge {
                    from: concept.to_string(),
                    to: rel.target.clone(),
                    kind: rel.kind,
                    strength: rel.strength,
                    evidence: evidence.into_iter().collect(),
                });
            }
        }

        let roots = groups
            .keys()
            .filter(|c| !targets.contains(*c))
            .map(|c| c.to_string())
            .collect();

        Self { nodes, edges, roots }
    }

    pub fn node(&self, concept: &str) -> Option<&ConceptNode> {
        self.nodes.iter().find(|n| n.concept == concept)
    }
}
