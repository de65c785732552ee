//! External collaborators: the capabilities the pipeline delegates to,
//! with reference implementations and a retry wrapper.

mod embedding;
mod error;
mod generation;
mod introspection;
pub mod prompt;
mod resilience;
mod traits;

pub use embedding::{split_camel_case, HashingEmbedder, HttpEmbedder};
pub use error::CollaboratorError;
pub use generation::{LlmPlanGenerator, LlmSpecificationWriter};
pub use introspection::{infer_component_type, DirectoryIntrospector, StaticIntrospector};
pub use resilience::{call_with_retry, Resilient, RetryPolicy};
pub use traits::{
    ApiEndpoint, ComponentDependency, DocumentFormat, DocumentParser, Embedder,
    GenerationOptions, PlanDocument, PlanGenerator, SpecificationWriter, SynthesisOptions,
    SystemAnalysis, SystemComponent, SystemIntrospector,
};
