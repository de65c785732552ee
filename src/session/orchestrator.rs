//! Session Orchestrator: drives sessions through their phases and exposes
//! status, cancel, retry and delete to callers.

use super::events::{EventBus, SessionEvent, SessionEventHandler};
use super::model::{Direction, LogEntry, Session, SessionInput, SessionStatus};
use super::phases::{forward_phases, reverse_phases, PhaseContext, PipelineServices};
use super::store::{InMemorySessionStore, SessionStore};
use crate::build::artifact_path;
use crate::error::PipelineError;
use crate::util::LogLevel;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Executions beyond this wait in `PENDING` for a slot.
    pub max_concurrent_sessions: usize,
    /// Each session works in `<workspace_root>/<session id>`.
    pub workspace_root: PathBuf,
    /// Buffered events per subscriber before it lags.
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 4,
            workspace_root: std::env::temp_dir().join("specforge").join("workspaces"),
            event_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max.max(1);
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Caller-facing summary of a session.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub id: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub failed_phase: Option<SessionStatus>,
    pub rollback_performed: bool,
    pub last_error: Option<LogEntry>,
    pub log_count: usize,
}

pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    services: Arc<PipelineServices>,
    events: EventBus,
    permits: Arc<Semaphore>,
    running: DashMap<String, CancellationToken>,
    config: OrchestratorConfig,
}

fn transition(
    session: &mut Session,
    to: SessionStatus,
    events: &mut Vec<SessionEvent>,
) -> Result<(), PipelineError> {
    let from = session.status;
    if !from.can_transition_to(to, session.direction) {
        return Err(PipelineError::invalid_state(format!(
            "session {} cannot move from {} to {}",
            session.id, from, to
        )));
    }
    session.status = to;
    events.push(SessionEvent::StatusChanged {
        session_id: session.id.clone(),
        from,
        to,
    });
    Ok(())
}

fn advance(session: &mut Session, progress: u8, events: &mut Vec<SessionEvent>) {
    if session.advance_progress(progress) {
        events.push(SessionEvent::ProgressChanged {
            session_id: session.id.clone(),
            progress: session.progress,
        });
    }
}

fn append(session: &mut Session, entry: LogEntry, events: &mut Vec<SessionEvent>) {
    session.logs.push(entry.clone());
    events.push(SessionEvent::LogAppended {
        session_id: session.id.clone(),
        entry,
    });
}

fn reject_terminal(session: &Session) -> Result<(), PipelineError> {
    if session.status.is_terminal() {
        Err(PipelineError::invalid_state(format!(
            "session {} is already {}",
            session.id, session.status
        )))
    } else {
        Ok(())
    }
}

impl SessionOrchestrator {
    pub fn new(services: PipelineServices, config: OrchestratorConfig) -> Self {
        Self::with_store(services, Arc::new(InMemorySessionStore::new()), config)
    }

    pub fn with_store(
        services: PipelineServices,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            services: Arc::new(services),
            events: EventBus::new(config.event_capacity),
            permits: Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1))),
            running: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    pub fn add_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        self.events.add_handler(handler);
    }

    pub fn create_session(
        &self,
        name: impl Into<String>,
        direction: Direction,
        input: SessionInput,
    ) -> Result<Session, PipelineError> {
        let mut session = Session::new(name, direction, input);
        session.log(LogLevel::Info, "Session created");
        self.store.insert(session.clone())?;
        info!(session = %session.id, name = %session.name, direction = ?direction, "Session created");
        Ok(session)
    }

    /// Runs a `SpecToSystem` session to a terminal status. Phase failures
    /// end in a `FAILED` session, not an `Err`.
    pub async fn execute_forward(&self, session_id: &str) -> Result<Session, PipelineError> {
        self.execute(session_id, Direction::SpecToSystem, None).await
    }

    /// Runs a `SystemToSpec` session; `target` replaces the stored target
    /// when given.
    pub async fn execute_reverse(
        &self,
        session_id: &str,
        target: Option<&str>,
    ) -> Result<Session, PipelineError> {
        self.execute(session_id, Direction::SystemToSpec, target).await
    }

    pub fn get_status(&self, session_id: &str) -> Result<StatusReport, PipelineError> {
        let session = self.get_session(session_id)?;
        Ok(StatusReport {
            id: session.id.clone(),
            status: session.status,
            progress: session.progress,
            failed_phase: session.failed_phase,
            rollback_performed: session.rollback_performed,
            last_error: session.last_error().cloned(),
            log_count: session.logs.len(),
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session, PipelineError> {
        self.store
            .get(session_id)?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>, PipelineError> {
        self.store.list()
    }

    /// Moves a non-terminal session to `CANCELLED` and signals its running
    /// phase, which stops at its next cancellation check.
    pub fn cancel(&self, session_id: &str) -> Result<Session, PipelineError> {
        let session = self.mutate(session_id, |s, events| {
            reject_terminal(s)?;
            transition(s, SessionStatus::Cancelled, events)?;
            let entry = LogEntry::new(LogLevel::Warn, s.status, "Session cancelled by request");
            append(s, entry, events);
            events.push(SessionEvent::Completed {
                session_id: s.id.clone(),
                status: SessionStatus::Cancelled,
            });
            Ok(())
        })?;
        self.events.close(session_id);

        if let Some(token) = self.running.get(session_id) {
            token.cancel();
        }
        info!(session = %session_id, "Session cancelled");
        Ok(session)
    }

    /// New `PENDING` session with the inputs of a failed or cancelled one.
    pub fn retry(&self, session_id: &str) -> Result<Session, PipelineError> {
        let original = self.get_session(session_id)?;
        if !matches!(
            original.status,
            SessionStatus::Failed | SessionStatus::Cancelled
        ) {
            return Err(PipelineError::invalid_state(format!(
                "only failed or cancelled sessions can be retried; {} is {}",
                original.id, original.status
            )));
        }

        let mut session = Session::new(
            original.name.clone(),
            original.direction,
            original.input.clone(),
        );
        session.parent_session_id = Some(original.id.clone());
        session.metadata = original.metadata.clone();
        session.metadata.insert(
            "retry_of".to_string(),
            serde_json::Value::String(original.id.clone()),
        );
        session.log(
            LogLevel::Info,
            format!("Retry of session {} (failed in {})", original.id, original.status),
        );
        self.store.insert(session.clone())?;
        info!(session = %session.id, parent = %original.id, "Session retried");
        Ok(session)
    }

    /// Removes a session that is not running and has no live children, then
    /// deletes its workspace and artifact.
    pub async fn delete(&self, session_id: &str) -> Result<Session, PipelineError> {
        let session = self.get_session(session_id)?;
        if self.running.contains_key(session_id) || session.status.is_active() {
            return Err(PipelineError::invalid_state(format!(
                "session {} is running",
                session_id
            )));
        }
        let live_children: Vec<String> = self
            .store
            .children_of(session_id)?
            .into_iter()
            .filter(|c| !c.status.is_terminal())
            .map(|c| c.id)
            .collect();
        if !live_children.is_empty() {
            return Err(PipelineError::invalid_state(format!(
                "session {} has active child sessions: {}",
                session_id,
                live_children.join(", ")
            )));
        }

        let removed = self
            .store
            .remove(session_id)?
            .ok_or_else(|| PipelineError::SessionNotFound(session_id.to_string()))?;
        self.events.close(session_id);
        self.cleanup(&removed).await;
        info!(session = %session_id, "Session deleted");
        Ok(removed)
    }

    /// Events of one session, starting with the next one published.
    pub fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<broadcast::Receiver<SessionEvent>, PipelineError> {
        self.get_session(session_id)?;
        Ok(self.events.subscribe(session_id))
    }

    async fn execute(
        &self,
        session_id: &str,
        direction: Direction,
        target: Option<&str>,
    ) -> Result<Session, PipelineError> {
        let session = self.get_session(session_id)?;
        if session.direction != direction {
            return Err(PipelineError::invalid_state(format!(
                "session {} runs {:?}, not {:?}",
                session_id, session.direction, direction
            )));
        }
        if session.status != SessionStatus::Pending {
            return Err(PipelineError::invalid_state(format!(
                "session {} is {}, expected PENDING",
                session_id, session.status
            )));
        }

        let token = CancellationToken::new();
        match self.running.entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(PipelineError::invalid_state(format!(
                    "session {} is already executing",
                    session_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }

        if let Some(target) = target {
            let target = target.to_string();
            if let Err(e) = self.mutate(session_id, |s, _| {
                s.input.target = Some(target.clone());
                Ok(())
            }) {
                self.running.remove(session_id);
                return Err(e);
            }
        }

        let result = self.run(session_id, direction, token).await;
        self.running.remove(session_id);
        result
    }

    async fn run(
        &self,
        session_id: &str,
        direction: Direction,
        token: CancellationToken,
    ) -> Result<Session, PipelineError> {
        let _permit = tokio::select! {
            permit = self.permits.clone().acquire_owned() => permit
                .map_err(|_| PipelineError::invalid_state("orchestrator is shut down"))?,
            _ = token.cancelled() => return self.get_session(session_id),
        };

        let session = self.get_session(session_id)?;
        if session.status.is_terminal() {
            return Ok(session);
        }

        let start = Instant::now();
        let workspace = self.config.workspace_root.join(session_id);
        let phases = match direction {
            Direction::SpecToSystem => forward_phases(),
            Direction::SystemToSpec => reverse_phases(),
        };
        let mut context = PhaseContext::new(
            session_id,
            session.name.clone(),
            session.input.clone(),
            workspace.clone(),
            self.services.clone(),
            token.clone(),
        );
        info!(
            session = %session_id,
            direction = ?direction,
            workspace = %workspace.display(),
            "Starting session"
        );

        for phase in phases {
            let status = phase.status();
            if token.is_cancelled() {
                return self.get_session(session_id);
            }
            if let Err(e) = self.enter_phase(session_id, status, phase.checkpoint(), &workspace) {
                return self.settle(session_id, e);
            }

            info!("Phase: {}", status);
            let outcome = phase.execute(&mut context).await;
            self.absorb(session_id, &mut context);

            match outcome {
                Ok(()) => debug!("Phase {} complete", status),
                Err(PipelineError::Cancelled) => return self.settle_cancelled(session_id),
                Err(e) => return self.fail(session_id, status, e),
            }
        }

        let finished = self.mutate(session_id, |s, events| {
            reject_terminal(s)?;
            transition(s, SessionStatus::Completed, events)?;
            advance(s, 100, events);
            let entry = LogEntry::new(LogLevel::Info, s.status, "Session completed");
            append(s, entry, events);
            events.push(SessionEvent::Completed {
                session_id: s.id.clone(),
                status: SessionStatus::Completed,
            });
            Ok(())
        });
        match finished {
            Ok(session) => {
                self.events.close(session_id);
                info!(
                    session = %session_id,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Session execution complete"
                );
                Ok(session)
            }
            Err(e) => self.settle(session_id, e),
        }
    }

    fn enter_phase(
        &self,
        session_id: &str,
        status: SessionStatus,
        checkpoint: u8,
        workspace: &std::path::Path,
    ) -> Result<Session, PipelineError> {
        self.mutate(session_id, |s, events| {
            transition(s, status, events)?;
            advance(s, checkpoint, events);
            if s.workspace.is_none() {
                s.workspace = Some(workspace.to_path_buf());
            }
            let entry = LogEntry::new(LogLevel::Info, status, format!("Entering {}", status));
            append(s, entry, events);
            Ok(())
        })
    }

    /// Copies phase outputs and notes onto the session unless it already
    /// reached a terminal status.
    fn absorb(&self, session_id: &str, context: &mut PhaseContext) {
        let notes = context.take_notes();
        let result = self.mutate(session_id, |s, events| {
            reject_terminal(s)?;
            for note in &notes {
                let mut entry = LogEntry::new(note.level, s.status, note.message.clone());
                entry.error_kind = note.error_kind.clone();
                append(s, entry, events);
            }
            if let Some(retrieved) = &context.retrieved {
                s.retrieved_context = Some(retrieved.clone());
            }
            if let Some(mapping) = &context.mapping {
                s.conceptual_mapping = Some(mapping.clone());
            }
            if let Some(build) = &context.build_result {
                s.rollback_performed = build.rollback_performed;
                s.build_result = Some(build.clone());
            }
            if let Some(artifact) = &context.artifact {
                s.artifact = Some(artifact.clone());
            }
            Ok(())
        });
        if let Err(e) = result {
            debug!(session = %session_id, error = %e, "Phase output not recorded");
        }
    }

    fn fail(
        &self,
        session_id: &str,
        phase: SessionStatus,
        failure: PipelineError,
    ) -> Result<Session, PipelineError> {
        error!(
            session = %session_id,
            phase = %phase,
            kind = failure.kind(),
            error = %failure,
            "Session failed"
        );
        let message = failure.to_string();
        let kind = failure.kind();
        let failed = self.mutate(session_id, |s, events| {
            reject_terminal(s)?;
            transition(s, SessionStatus::Failed, events)?;
            s.failed_phase = Some(phase);
            let entry = LogEntry::new(LogLevel::Error, phase, message.clone()).with_error_kind(kind);
            append(s, entry, events);
            events.push(SessionEvent::Completed {
                session_id: s.id.clone(),
                status: SessionStatus::Failed,
            });
            Ok(())
        });
        match failed {
            Ok(session) => {
                self.events.close(session_id);
                Ok(session)
            }
            Err(e) => self.settle(session_id, e),
        }
    }

    /// A phase observed cancellation. `cancel` normally already moved the
    /// session; otherwise record it here.
    fn settle_cancelled(&self, session_id: &str) -> Result<Session, PipelineError> {
        let session = self.get_session(session_id)?;
        if session.status.is_terminal() {
            return Ok(session);
        }
        self.cancel(session_id)
    }

    /// Resolves a rejected update: a session that was cancelled meanwhile is
    /// returned as is, anything else is an error.
    fn settle(&self, session_id: &str, error: PipelineError) -> Result<Session, PipelineError> {
        match self.store.get(session_id)? {
            Some(session) if session.status.is_terminal() => Ok(session),
            _ => Err(error),
        }
    }

    async fn cleanup(&self, session: &Session) {
        if let Some(workspace) = &session.workspace {
            if workspace.exists() {
                if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
                    warn!(path = %workspace.display(), error = %e, "Failed to remove workspace");
                }
            }
            if let Ok(archive) = artifact_path(workspace) {
                if archive.exists() {
                    if let Err(e) = tokio::fs::remove_file(&archive).await {
                        warn!(path = %archive.display(), error = %e, "Failed to remove artifact");
                    }
                }
            }
        }
        if let Some(artifact) = &session.artifact {
            if artifact.path.is_file() {
                if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
                    warn!(path = %artifact.path.display(), error = %e, "Failed to remove artifact");
                }
            }
        }
    }

    /// Atomic update followed by publication of the events it produced.
    fn mutate<F>(&self, session_id: &str, mut apply: F) -> Result<Session, PipelineError>
    where
        F: FnMut(&mut Session, &mut Vec<SessionEvent>) -> Result<(), PipelineError>,
    {
        let mut events = Vec::new();
        let session = self.store.update(session_id, &mut |s| {
            events.clear();
            apply(s, &mut events)
        })?;
        for event in events {
            self.events.publish(event);
        }
        Ok(session)
    }
}
