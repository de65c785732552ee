//! Inverse actions recorded while a build runs.

use super::error::BuildError;
use super::executor::StepExecutor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum RollbackAction {
    DeleteFile { path: PathBuf },
    RestoreFile { path: PathBuf, previous: Vec<u8> },
    RunCommand { command: String },
    RemoveDirectory { path: PathBuf },
}

impl RollbackAction {
    async fn apply(&self, executor: &StepExecutor, timeout: Duration) -> Result<(), BuildError> {
        match self {
            RollbackAction::DeleteFile { path } => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            RollbackAction::RestoreFile { path, previous } => {
                tokio::fs::write(path, previous).await?;
                Ok(())
            }
            RollbackAction::RunCommand { command } => {
                executor.run_shell(command, timeout).await?;
                Ok(())
            }
            RollbackAction::RemoveDirectory { path } => match tokio::fs::remove_dir_all(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RollbackAction::DeleteFile { path } => format!("delete {}", path.display()),
            RollbackAction::RestoreFile { path, previous } => {
                format!("restore {} ({} bytes)", path.display(), previous.len())
            }
            RollbackAction::RunCommand { command } => format!("run `{}`", command),
            RollbackAction::RemoveDirectory { path } => format!("remove {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub performed: usize,
    /// Actions that failed, with the error. Never escalated.
    pub failures: Vec<String>,
}

/// Per-build LIFO of inverse actions tagged with the step that produced them.
#[derive(Debug, Default)]
pub struct RollbackStack {
    entries: Vec<(String, RollbackAction)>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step_id: &str, action: RollbackAction) {
        self.entries.push((step_id.to_string(), action));
    }

    pub fn extend(&mut self, step_id: &str, actions: Vec<RollbackAction>) {
        for action in actions {
            self.push(step_id, action);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pops and applies every action, newest first. A failing action is
    /// logged and the unwind continues.
    pub async fn unwind(&mut self, executor: &StepExecutor, timeout: Duration) -> RollbackReport {
        let mut report = RollbackReport::default();
        while let Some((step_id, action)) = self.entries.pop() {
            match action.apply(executor, timeout).await {
                Ok(()) => {
                    info!(step = %step_id, action = %action.describe(), "Rolled back");
                    report.performed += 1;
                }
                Err(e) => {
                    warn!(step = %step_id, action = %action.describe(), error = %e, "Rollback action failed");
                    report
                        .failures
                        .push(format!("{} ({}): {}", action.describe(), step_id, e));
                }
            }
        }
        report
    }
}
