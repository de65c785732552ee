//! The phases a session runs through, one object per status.

use super::model::{ArtifactKind, ArtifactRef, SessionInput, SessionStatus};
use crate::build::{BuildEngine, BuildFailure, BuildPlan, BuildResult};
use crate::collaborators::{
    DocumentParser, GenerationOptions, PlanDocument, PlanGenerator, SpecificationWriter,
    SynthesisOptions, SystemAnalysis, SystemIntrospector,
};
use crate::concepts::{ConceptualMapper, ConceptualMapping, MappingOptions};
use crate::error::PipelineError;
use crate::retrieval::{analyze_query, RetrievalOptions, RetrievedContext, SemanticRetriever};
use crate::util::LogLevel;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const SPECIFICATION_FILE: &str = "SPECIFICATION.md";

/// Components shared by every session.
pub struct PipelineServices {
    pub retriever: Arc<SemanticRetriever>,
    pub mapper: Arc<ConceptualMapper>,
    pub build_engine: Arc<BuildEngine>,
    pub plan_generator: Arc<dyn PlanGenerator>,
    pub plan_parser: Arc<dyn DocumentParser>,
    pub introspector: Arc<dyn SystemIntrospector>,
    pub specification_writer: Arc<dyn SpecificationWriter>,
}

/// Message a phase wants recorded on the session.
#[derive(Debug, Clone)]
pub struct PhaseNote {
    pub level: LogLevel,
    pub message: String,
    pub error_kind: Option<String>,
}

/// Working state threaded through the phases of one execution.
pub struct PhaseContext {
    pub session_id: String,
    pub session_name: String,
    pub input: SessionInput,
    pub workspace: PathBuf,
    pub services: Arc<PipelineServices>,
    pub token: CancellationToken,

    pub query_vector: Option<Vec<f32>>,
    pub retrieved: Option<RetrievedContext>,
    pub plan_document: Option<PlanDocument>,
    pub plan: Option<BuildPlan>,
    pub build_result: Option<BuildResult>,
    pub analysis: Option<SystemAnalysis>,
    pub mapping: Option<ConceptualMapping>,
    pub artifact: Option<ArtifactRef>,

    notes: Vec<PhaseNote>,
}

impl PhaseContext {
    pub fn new(
        session_id: impl Into<String>,
        session_name: impl Into<String>,
        input: SessionInput,
        workspace: PathBuf,
        services: Arc<PipelineServices>,
        token: CancellationToken,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            session_name: session_name.into(),
            input,
            workspace,
            services,
            token,
            query_vector: None,
            retrieved: None,
            plan_document: None,
            plan: None,
            build_result: None,
            analysis: None,
            mapping: None,
            artifact: None,
            notes: Vec::new(),
        }
    }

    /// Fails with `Cancelled` once cancellation was requested.
    pub fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn note(&mut self, level: LogLevel, message: impl Into<String>) {
        self.notes.push(PhaseNote {
            level,
            message: message.into(),
            error_kind: None,
        });
    }

    fn note_error(&mut self, level: LogLevel, message: impl Into<String>, kind: &str) {
        self.notes.push(PhaseNote {
            level,
            message: message.into(),
            error_kind: Some(kind.to_string()),
        });
    }

    pub fn take_notes(&mut self) -> Vec<PhaseNote> {
        std::mem::take(&mut self.notes)
    }
}

#[async_trait]
pub trait SessionPhase: Send + Sync {
    /// Status the session holds while this phase runs.
    fn status(&self) -> SessionStatus;

    /// Progress reported on entering the phase.
    fn checkpoint(&self) -> u8;

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError>;
}

pub fn forward_phases() -> Vec<Box<dyn SessionPhase>> {
    vec![
        Box::new(VectorizePhase),
        Box::new(RetrievePhase),
        Box::new(GeneratePhase),
        Box::new(BuildPhase),
    ]
}

pub fn reverse_phases() -> Vec<Box<dyn SessionPhase>> {
    vec![
        Box::new(AnalyzePhase),
        Box::new(MapPhase),
        Box::new(SynthesizePhase),
    ]
}

fn missing(what: &str) -> PipelineError {
    PipelineError::invalid_state(format!("{} not available; an earlier phase did not run", what))
}

pub struct VectorizePhase;

#[async_trait]
impl SessionPhase for VectorizePhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Vectorizing
    }

    fn checkpoint(&self) -> u8 {
        10
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        context.ensure_active()?;
        let vector = context
            .services
            .retriever
            .embed(&context.input.prompt)
            .await?;
        context.ensure_active()?;

        debug!(dimension = vector.len(), "Prompt embedded");
        context.query_vector = Some(vector);
        Ok(())
    }
}

pub struct RetrievePhase;

#[async_trait]
impl SessionPhase for RetrievePhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Retrieving
    }

    fn checkpoint(&self) -> u8 {
        25
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let query_vector = context
            .query_vector
            .clone()
            .ok_or_else(|| missing("query vector"))?;
        let options = &context.input.options;
        let retrieval = RetrievalOptions {
            score_threshold: options.score_threshold,
            multi_domain: options.multi_domain,
            diversity_factor: options.diversity_factor,
            query: Some(analyze_query(&context.input.prompt)),
            ..RetrievalOptions::default()
        };

        context.ensure_active()?;
        let retrieved =
            context
                .services
                .retriever
                .retrieve(&query_vector, options.max_chunks, &retrieval)?;
        context.ensure_active()?;

        context.note(
            LogLevel::Info,
            format!(
                "Retrieved {} chunks (aggregate score {:.2})",
                retrieved.chunks.len(),
                retrieved.aggregate_score
            ),
        );
        context.retrieved = Some(retrieved);
        Ok(())
    }
}

pub struct GeneratePhase;

#[async_trait]
impl SessionPhase for GeneratePhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Generating
    }

    fn checkpoint(&self) -> u8 {
        45
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let chunks = context
            .retrieved
            .as_ref()
            .map(|r| r.chunks.clone())
            .unwrap_or_default();
        let options = GenerationOptions {
            project_name: Some(context.session_name.clone()),
            ..GenerationOptions::default()
        };

        context.ensure_active()?;
        let document = context
            .services
            .plan_generator
            .generate(&context.input.prompt, &chunks, &options)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        context.ensure_active()?;

        let plan = context
            .services
            .plan_parser
            .parse(&document)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;
        context.ensure_active()?;

        context.note(
            LogLevel::Info,
            format!("Generated plan '{}' with {} steps", plan.name, plan.steps.len()),
        );
        context.plan_document = Some(document);
        context.plan = Some(plan);
        Ok(())
    }
}

pub struct BuildPhase;

impl BuildPhase {
    fn failure_to_error(failure: &BuildFailure) -> PipelineError {
        match failure {
            BuildFailure::DependencyUnmet { step, missing } => PipelineError::DependencyUnmet {
                step: step.clone(),
                missing: missing.clone(),
            },
            BuildFailure::StepFailed { step, error } => PipelineError::StepExecution {
                step: step.clone(),
                message: error.clone(),
            },
            BuildFailure::ValidationFailed { rule, error } => {
                PipelineError::Validation(format!("{}: {}", rule, error))
            }
            BuildFailure::Cancelled => PipelineError::Cancelled,
            BuildFailure::Workspace { error } | BuildFailure::Packaging { error } => {
                PipelineError::Io(std::io::Error::other(error.clone()))
            }
        }
    }
}

#[async_trait]
impl SessionPhase for BuildPhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Building
    }

    fn checkpoint(&self) -> u8 {
        70
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let plan = context.plan.clone().ok_or_else(|| missing("build plan"))?;

        context.ensure_active()?;
        let result = context
            .services
            .build_engine
            .build_with_token(
                &plan,
                &context.workspace,
                &context.input.options.build,
                context.token.child_token(),
            )
            .await;

        let rollback_failures: &[String] = result
            .rollback
            .as_ref()
            .map(|r| r.failures.as_slice())
            .unwrap_or_default();
        for warning in &result.warnings {
            if rollback_failures.iter().any(|f| warning.ends_with(f.as_str())) {
                context.note_error(LogLevel::Warn, warning.clone(), "RollbackError");
            } else {
                context.note(LogLevel::Warn, warning.clone());
            }
        }

        let outcome = if result.success {
            context.artifact = Some(match &result.artifact_path {
                Some(path) => ArtifactRef {
                    kind: ArtifactKind::BuildArchive,
                    path: path.clone(),
                },
                None => ArtifactRef {
                    kind: ArtifactKind::Workspace,
                    path: result.workspace.clone(),
                },
            });
            context.note(
                LogLevel::Info,
                format!("Build executed {} steps", result.executed_steps.len()),
            );
            Ok(())
        } else if result.cancelled || context.token.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            let failure = result.failure.clone().unwrap_or(BuildFailure::StepFailed {
                step: result.failed_step.clone().unwrap_or_default(),
                error: "build failed".to_string(),
            });
            Err(Self::failure_to_error(&failure))
        };

        context.build_result = Some(result);
        outcome
    }
}

pub struct AnalyzePhase;

#[async_trait]
impl SessionPhase for AnalyzePhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Analyzing
    }

    fn checkpoint(&self) -> u8 {
        15
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let target = context
            .input
            .target
            .clone()
            .ok_or_else(|| PipelineError::invalid_state("reverse session has no target"))?;

        context.ensure_active()?;
        let analysis = context
            .services
            .introspector
            .analyze(&target)
            .await
            .map_err(PipelineError::Introspection)?;
        context.ensure_active()?;

        context.note(
            LogLevel::Info,
            format!(
                "Found {} components and {} dependencies in {}",
                analysis.components.len(),
                analysis.dependencies.len(),
                target
            ),
        );
        context.analysis = Some(analysis);
        Ok(())
    }
}

pub struct MapPhase;

#[async_trait]
impl SessionPhase for MapPhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Mapping
    }

    fn checkpoint(&self) -> u8 {
        45
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let analysis = context.analysis.as_ref().ok_or_else(|| missing("system analysis"))?;
        let options = MappingOptions::default()
            .with_confidence_threshold(context.input.options.confidence_threshold);

        context.ensure_active()?;
        let mapping = context
            .services
            .mapper
            .map_components(&analysis.components, &options)
            .await?;
        context.ensure_active()?;

        let patterns: Vec<&str> = mapping.patterns.iter().map(|p| p.name.as_str()).collect();
        context.note(
            LogLevel::Info,
            format!(
                "Mapped {} of {} components; patterns: {}",
                mapping.mapped_components.len(),
                analysis.components.len(),
                if patterns.is_empty() {
                    "none".to_string()
                } else {
                    patterns.join(", ")
                }
            ),
        );
        context.mapping = Some(mapping);
        Ok(())
    }
}

pub struct SynthesizePhase;

#[async_trait]
impl SessionPhase for SynthesizePhase {
    fn status(&self) -> SessionStatus {
        SessionStatus::Synthesizing
    }

    fn checkpoint(&self) -> u8 {
        75
    }

    async fn execute(&self, context: &mut PhaseContext) -> Result<(), PipelineError> {
        let analysis = context.analysis.as_ref().ok_or_else(|| missing("system analysis"))?;
        let mapping = context.mapping.as_ref().ok_or_else(|| missing("conceptual mapping"))?;
        let options = SynthesisOptions {
            title: Some(context.session_name.clone()),
            ..SynthesisOptions::default()
        };

        context.ensure_active()?;
        let document = context
            .services
            .specification_writer
            .synthesize(analysis, mapping, &options)
            .await
            .map_err(PipelineError::Synthesis)?;
        context.ensure_active()?;

        tokio::fs::create_dir_all(&context.workspace).await?;
        let path = context.workspace.join(SPECIFICATION_FILE);
        tokio::fs::write(&path, &document).await?;

        context.note(
            LogLevel::Info,
            format!("Wrote specification to {}", path.display()),
        );
        context.artifact = Some(ArtifactRef {
            kind: ArtifactKind::Specification,
            path,
        });
        Ok(())
    }
}
