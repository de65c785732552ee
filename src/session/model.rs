//! Session records and their state machine.

use crate::build::{BuildOptions, BuildResult};
use crate::concepts::ConceptualMapping;
use crate::retrieval::RetrievedContext;
use crate::util::LogLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Prompt in, build artifact out.
    SpecToSystem,
    /// Running system in, specification out.
    SystemToSpec,
}

impl Direction {
    /// Statuses a session passes through, in order, excluding terminal
    /// failure states.
    pub fn sequence(&self) -> &'static [SessionStatus] {
        match self {
            Direction::SpecToSystem => &[
                SessionStatus::Pending,
                SessionStatus::Vectorizing,
                SessionStatus::Retrieving,
                SessionStatus::Generating,
                SessionStatus::Building,
                SessionStatus::Completed,
            ],
            Direction::SystemToSpec => &[
                SessionStatus::Pending,
                SessionStatus::Analyzing,
                SessionStatus::Mapping,
                SessionStatus::Synthesizing,
                SessionStatus::Completed,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Vectorizing,
    Retrieving,
    Generating,
    Building,
    Analyzing,
    Mapping,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Vectorizing => "VECTORIZING",
            SessionStatus::Retrieving => "RETRIEVING",
            SessionStatus::Generating => "GENERATING",
            SessionStatus::Building => "BUILDING",
            SessionStatus::Analyzing => "ANALYZING",
            SessionStatus::Mapping => "MAPPING",
            SessionStatus::Synthesizing => "SYNTHESIZING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// A phase is running: neither waiting to start nor finished.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != SessionStatus::Pending
    }

    /// Failure and cancellation are reachable from any non-terminal status;
    /// otherwise only the next status of the direction's sequence is.
    pub fn can_transition_to(&self, next: SessionStatus, direction: Direction) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, SessionStatus::Failed | SessionStatus::Cancelled) {
            return true;
        }
        let sequence = direction.sequence();
        match (
            sequence.iter().position(|s| s == self),
            sequence.iter().position(|s| *s == next),
        ) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Status the session was in when the entry was written.
    pub phase: SessionStatus,
    pub message: String,
    /// Error kind name such as `GenerationError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, phase: SessionStatus, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            phase,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn with_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    pub max_chunks: usize,
    pub score_threshold: f32,
    pub multi_domain: bool,
    pub diversity_factor: f32,
    pub confidence_threshold: f32,
    #[serde(default)]
    pub build: BuildOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_chunks: 10,
            score_threshold: 0.5,
            multi_domain: true,
            diversity_factor: 0.3,
            confidence_threshold: 0.5,
            build: BuildOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInput {
    /// Build request for forward sessions.
    pub prompt: String,
    /// System to analyze for reverse sessions.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub options: SessionOptions,
}

impl SessionInput {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    BuildArchive,
    Workspace,
    Specification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub status: SessionStatus,
    /// 0..=100, never decreases.
    pub progress: u8,
    pub logs: Vec<LogEntry>,
    pub input: SessionInput,
    pub retrieved_context: Option<RetrievedContext>,
    pub conceptual_mapping: Option<ConceptualMapping>,
    pub build_result: Option<BuildResult>,
    pub artifact: Option<ArtifactRef>,
    pub workspace: Option<PathBuf>,
    /// Set only on sessions created by a retry.
    pub parent_session_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub failed_phase: Option<SessionStatus>,
    pub rollback_performed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: impl Into<String>, direction: Direction, input: SessionInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            direction,
            status: SessionStatus::Pending,
            progress: 0,
            logs: Vec::new(),
            input,
            retrieved_context: None,
            conceptual_mapping: None,
            build_result: None,
            artifact: None,
            workspace: None,
            parent_session_id: None,
            metadata: BTreeMap::new(),
            failed_phase: None,
            rollback_performed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Raises progress to `value` (capped at 100). Lower values are ignored.
    /// Returns whether progress changed.
    pub fn advance_progress(&mut self, value: u8) -> bool {
        let value = value.min(100);
        if value > self.progress {
            self.progress = value;
            true
        } else {
            false
        }
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, self.status, message);
        self.logs.push(entry.clone());
        entry
    }

    /// Last entry carrying an error kind.
    pub fn last_error(&self) -> Option<&LogEntry> {
        self.logs.iter().rev().find(|e| e.error_kind.is_some())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
