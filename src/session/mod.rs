//! Session Orchestrator: session records, lifecycle events and the phase
//! pipeline for both directions.

mod events;
mod model;
mod orchestrator;
mod phases;
mod store;

pub use events::{EventBus, LoggingHandler, NoOpHandler, SessionEvent, SessionEventHandler};
pub use model::{
    ArtifactKind, ArtifactRef, Direction, LogEntry, Session, SessionInput, SessionOptions,
    SessionStatus,
};
pub use orchestrator::{OrchestratorConfig, SessionOrchestrator, StatusReport};
pub use phases::{
    forward_phases, reverse_phases, AnalyzePhase, BuildPhase, GeneratePhase, MapPhase,
    PhaseContext, PhaseNote, PipelineServices, RetrievePhase, SessionPhase, SynthesizePhase,
    VectorizePhase, SPECIFICATION_FILE,
};
pub use store::{InMemorySessionStore, SessionStore};
