//! specforge - bidirectional specification/system pipeline
//!
//! Forward sessions turn a natural-language build request into a working
//! artifact: the prompt is embedded, related context is retrieved from the
//! vector indices, a plan is generated and parsed, and the Build Engine
//! executes it with rollback on critical failure. Reverse sessions analyze an
//! existing system, map its components onto a catalog of architectural
//! concepts, recognize patterns and synthesize a specification document.
//!
//! # Core Concepts
//!
//! - **Vector Index Store**: domain-partitioned indices (code, docs, api,
//!   concepts) with exact or graph-based nearest-neighbour search
//! - **Semantic Retriever**: strategy-weighted re-scoring, diversity
//!   filtering and a TTL cache on top of the store
//! - **Conceptual Mapper**: component to concept mapping plus pattern
//!   recognition and a concept hierarchy
//! - **Build Engine**: ordered step execution with conditions, retries,
//!   validations, rollback and packaging
//! - **Session Orchestrator**: the state machine tying it together
//!
//! # Example Usage
//!
//! ```no_run
//! use specforge::{Direction, SessionInput, SessionOrchestrator, SpecforgeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpecforgeConfig::from_env()?;
//! let orchestrator =
//!     SessionOrchestrator::new(config.create_services()?, config.orchestrator_config());
//!
//! let session = orchestrator.create_session(
//!     "todo-api",
//!     Direction::SpecToSystem,
//!     SessionInput::prompt("REST API for a todo list with a SQLite store"),
//! )?;
//! let finished = orchestrator.execute_forward(&session.id).await?;
//! println!("{} at {}%", finished.status, finished.progress);
//! # Ok(())
//! # }
//! ```

pub mod build;
pub mod cli;
pub mod collaborators;
pub mod concepts;
pub mod config;
pub mod error;
pub mod llm;
pub mod retrieval;
pub mod session;
pub mod util;
pub mod vector;

pub use build::{BuildEngine, BuildOptions, BuildPlan, BuildResult, BuildStep, StructuredPlanParser};
pub use collaborators::{
    CollaboratorError, DocumentParser, Embedder, HashingEmbedder, PlanGenerator,
    SpecificationWriter, SystemIntrospector,
};
pub use concepts::{ConceptCatalog, ConceptualMapper, ConceptualMapping};
pub use config::{ConfigError, SpecforgeConfig};
pub use error::PipelineError;
pub use retrieval::{RetrievedContext, SemanticRetriever};
pub use session::{
    Direction, OrchestratorConfig, PipelineServices, Session, SessionEvent, SessionInput,
    SessionOrchestrator, SessionStatus,
};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};
pub use vector::{IndexName, SemanticChunk, VectorStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
