//! Session lifecycle events and their fan-out.

use super::model::{LogEntry, SessionStatus};
use crate::util::LogLevel;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted while a session moves through its phases
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Status transition
    StatusChanged {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Progress reached a new checkpoint
    ProgressChanged { session_id: String, progress: u8 },

    /// Log entry appended to the session
    LogAppended { session_id: String, entry: LogEntry },

    /// Session reached a terminal status; no further events follow
    Completed {
        session_id: String,
        status: SessionStatus,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::StatusChanged { session_id, .. }
            | SessionEvent::ProgressChanged { session_id, .. }
            | SessionEvent::LogAppended { session_id, .. }
            | SessionEvent::Completed { session_id, .. } => session_id,
        }
    }
}

/// Receives every event published on the bus
pub trait SessionEventHandler: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Handler that mirrors session events into tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl SessionEventHandler for LoggingHandler {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::StatusChanged {
                session_id,
                from,
                to,
            } => {
                info!(session = %session_id, from = %from, to = %to, "Session status changed");
            }
            SessionEvent::ProgressChanged {
                session_id,
                progress,
            } => {
                debug!(session = %session_id, progress, "Session progress");
            }
            SessionEvent::LogAppended { session_id, entry } => match entry.level {
                LogLevel::Debug => {
                    debug!(session = %session_id, phase = %entry.phase, "{}", entry.message)
                }
                LogLevel::Info => {
                    info!(session = %session_id, phase = %entry.phase, "{}", entry.message)
                }
                LogLevel::Warn => {
                    warn!(session = %session_id, phase = %entry.phase, "{}", entry.message)
                }
                LogLevel::Error => error!(
                    session = %session_id,
                    phase = %entry.phase,
                    kind = entry.error_kind.as_deref().unwrap_or("unknown"),
                    "{}",
                    entry.message
                ),
            },
            SessionEvent::Completed { session_id, status } => match status {
                SessionStatus::Completed => info!(session = %session_id, "Session completed"),
                SessionStatus::Cancelled => warn!(session = %session_id, "Session cancelled"),
                other => warn!(session = %session_id, status = %other, "Session finished"),
            },
        }
    }
}

/// Handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl SessionEventHandler for NoOpHandler {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Per-session broadcast channels plus process-wide handlers.
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<SessionEvent>>,
    handlers: RwLock<Vec<Arc<dyn SessionEventHandler>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn SessionEventHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(handler);
        }
    }

    /// Receiver for events of one session. Slow receivers observe
    /// `RecvError::Lagged` rather than blocking publishers.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<SessionEvent> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        if let Ok(handlers) = self.handlers.read() {
            for handler in handlers.iter() {
                handler.on_event(&event);
            }
        }
        if let Some(sender) = self.channels.get(event.session_id()) {
            // No receivers is fine.
            let _ = sender.send(event);
        }
    }

    /// Drops the session's channel; receivers see `Closed` after draining.
    pub fn close(&self, session_id: &str) {
        self.channels.remove(session_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
