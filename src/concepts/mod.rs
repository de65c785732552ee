//! Conceptual Mapper: maps analyzed system components onto a catalog of
//! architectural concepts and recognizes patterns across them.

mod catalog;
mod hierarchy;
mod mapper;
mod patterns;

pub use catalog::{
    ArchitecturalConcept, ConceptCatalog, ConceptCategory, ConceptRelationship, RelationshipKind,
};
pub use hierarchy::{ConceptEdge, ConceptHierarchy, ConceptNode};
pub use mapper::{
    ConceptMatch, ConceptualMapper, ConceptualMapping, MappedComponent, MappingError,
    MappingOptions,
};
pub use patterns::{recognize_patterns, PatternRecognizer, RecognizedPattern};
