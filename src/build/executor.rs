//! Side-effecting half of the engine: runs one step inside a workspace.

use super::error::BuildError;
use super::rollback::RollbackAction;
use super::step::{BuildStep, FileEdit, StepAction, StepCondition, ValidationRule};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

pub struct StepExecutor {
    workspace: PathBuf,
    environment: BTreeMap<String, String>,
}

impl StepExecutor {
    pub fn new(workspace: impl Into<PathBuf>, environment: BTreeMap<String, String>) -> Self {
        Self {
            workspace: workspace.into(),
            environment,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Joins a relative path onto the workspace. Absolute paths and `..`
    /// components are rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, BuildError> {
        let path = Path::new(relative);
        let escapes = path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes || relative.is_empty() {
            return Err(BuildError::PathEscape(relative.to_string()));
        }
        Ok(self.workspace.join(path))
    }

    pub async fn run_shell(&self, command: &str, timeout: Duration) -> Result<CommandOutput, BuildError> {
        debug!(command, "Running shell command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace)
            .envs(&self.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| BuildError::Timeout(timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout, stderr })
    }

    pub async fn condition_met(&self, condition: &StepCondition, timeout: Duration) -> bool {
        match condition {
            StepCondition::FileExists { path } => {
                self.resolve(path).map(|p| p.exists()).unwrap_or(false)
            }
            StepCondition::CommandSucceeds { command } => {
                self.run_shell(command, timeout).await.is_ok()
            }
            StepCondition::EnvVarSet { name } => {
                self.environment.contains_key(name) || std::env::var_os(name).is_some()
            }
        }
    }

    pub async fn evaluate(&self, rule: &ValidationRule, timeout: Duration) -> Result<(), BuildError> {
        match rule {
            ValidationRule::FileExists { path } => {
                if self.resolve(path)?.exists() {
                    Ok(())
                } else {
                    Err(BuildError::Validation(format!("{} does not exist", path)))
                }
            }
            ValidationRule::CommandOutputEquals { command, expected } => {
                let output = self.run_shell(command, timeout).await?;
                let actual = output.stdout.trim();
                if actual == expected.trim() {
                    Ok(())
                } else {
                    Err(BuildError::Validation(format!(
                        "`{}` printed {:?}, expected {:?}",
                        command, actual, expected
                    )))
                }
            }
            ValidationRule::PortReachable {
                host,
                port,
                timeout_ms,
            } => {
                let connect = TcpStream::connect((host.as_str(), *port));
                match tokio::time::timeout(Duration::from_millis(*timeout_ms), connect).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(BuildError::Validation(format!(
                        "{}:{} unreachable: {}",
                        host, port, e
                    ))),
                    Err(_) => Err(BuildError::Validation(format!(
                        "{}:{} did not accept a connection within {}ms",
                        host, port, timeout_ms
                    ))),
                }
            }
        }
    }

    /// Inverse actions for `step`, captured before it runs. Pushed onto the
    /// rollback stack only once the step succeeds.
    pub async fn inverse_of(&self, step: &BuildStep) -> Result<Vec<RollbackAction>, BuildError> {
        let mut inverse = Vec::new();
        match &step.action {
            StepAction::WriteFile { path, .. } | StepAction::ModifyFile { path, .. } => {
                self.file_inverse(path, &mut inverse).await?;
            }
            StepAction::CopyFile { to, .. } => {
                self.file_inverse(to, &mut inverse).await?;
            }
            StepAction::CreateDirectory { path } => {
                let target = self.resolve(path)?;
                if let Some(created) = self.first_missing_ancestor(&target) {
                    inverse.push(RollbackAction::RemoveDirectory { path: created });
                }
            }
            StepAction::RunCommand { .. }
            | StepAction::InstallDependency { .. }
            | StepAction::ValidateStep { .. } => {}
        }
        inverse.extend(
            step.rollback_commands
                .iter()
                .map(|command| RollbackAction::RunCommand {
                    command: command.clone(),
                }),
        );
        Ok(inverse)
    }

    async fn file_inverse(&self, path: &str, inverse: &mut Vec<RollbackAction>) -> Result<(), BuildError> {
        let target = self.resolve(path)?;
        if target.is_file() {
            let previous = tokio::fs::read(&target).await?;
            inverse.push(RollbackAction::RestoreFile {
                path: target,
                previous,
            });
        } else {
            if let Some(parent) = target.parent() {
                if let Some(created) = self.first_missing_ancestor(parent) {
                    inverse.push(RollbackAction::RemoveDirectory { path: created });
                }
            }
            inverse.push(RollbackAction::DeleteFile { path: target });
        }
        Ok(())
    }

    /// Outermost directory between the workspace and `target` that does not
    /// exist yet.
    fn first_missing_ancestor(&self, target: &Path) -> Option<PathBuf> {
        if target.exists() {
            return None;
        }
        let mut missing = target.to_path_buf();
        while let Some(parent) = missing.parent() {
            if parent == self.workspace.as_path() || parent.exists() {
                break;
            }
            missing = parent.to_path_buf();
        }
        Some(missing)
    }

    /// Runs the step's action once under `timeout`. Returns a short summary.
    pub async fn execute(&self, step: &BuildStep, timeout: Duration) -> Result<String, BuildError> {
        tokio::time::timeout(timeout, self.perform(&step.action, timeout))
            .await
            .map_err(|_| BuildError::Timeout(timeout))?
    }

    async fn perform(&self, action: &StepAction, timeout: Duration) -> Result<String, BuildError> {
        match action {
            StepAction::RunCommand { command } => {
                let output = self.run_shell(command, timeout).await?;
                Ok(last_line(&output.stdout))
            }
            StepAction::WriteFile { path, content } => {
                let target = self.resolve(path)?;
                ensure_parent(&target).await?;
                tokio::fs::write(&target, content).await?;
                Ok(format!("wrote {} ({} bytes)", path, content.len()))
            }
            StepAction::InstallDependency {
                package,
                manager,
                command,
            } => {
                let rendered = match command {
                    Some(command) => Some(command.clone()),
                    None => {
                        let manager = manager.clone().or_else(|| self.detect_package_manager());
                        manager.and_then(|m| install_command(&m, package))
                    }
                };
                match rendered {
                    Some(command) => {
                        self.run_shell(&command, timeout).await?;
                        Ok(format!("installed {}", package))
                    }
                    None => {
                        warn!(package = %package, "No package manager detected, skipping install");
                        Ok(format!("skipped {}: no package manager", package))
                    }
                }
            }
            StepAction::CreateDirectory { path } => {
                tokio::fs::create_dir_all(self.resolve(path)?).await?;
                Ok(format!("created {}", path))
            }
            StepAction::CopyFile { from, to } => {
                let source = self.resolve(from)?;
                let target = self.resolve(to)?;
                ensure_parent(&target).await?;
                let bytes = tokio::fs::copy(&source, &target).await?;
                Ok(format!("copied {} to {} ({} bytes)", from, to, bytes))
            }
            StepAction::ModifyFile { path, edit } => {
                let target = self.resolve(path)?;
                let current = tokio::fs::read_to_string(&target).await?;
                let updated = match edit {
                    FileEdit::Replace { find, replace } => {
                        if find.is_empty() || !current.contains(find.as_str()) {
                            return Err(BuildError::Step(format!(
                                "pattern {:?} not found in {}",
                                find, path
                            )));
                        }
                        current.replace(find.as_str(), replace)
                    }
                    FileEdit::Append { content } => {
                        let mut updated = current;
                        updated.push_str(content);
                        updated
                    }
                };
                tokio::fs::write(&target, updated).await?;
                Ok(format!("modified {}", path))
            }
            StepAction::ValidateStep { rule } => {
                self.evaluate(rule, timeout).await?;
                Ok(format!("validated {}", rule))
            }
        }
    }

    fn detect_package_manager(&self) -> Option<String> {
        let markers = [
            ("package.json", "npm"),
            ("Cargo.toml", "cargo"),
            ("requirements.txt", "pip"),
            ("pyproject.toml", "pip"),
            ("go.mod", "go"),
        ];
        markers
            .iter()
            .find(|(file, _)| self.workspace.join(file).exists())
            .map(|(_, manager)| manager.to_string())
    }
}

/// Install command for a package manager, or `None` if it is unknown.
pub fn install_command(manager: &str, package: &str) -> Option<String> {
    let package = shell_word(package);
    let command = match manager.to_lowercase().as_str() {
        "npm" => format!("npm install {}", package),
        "yarn" => format!("yarn add {}", package),
        "pnpm" => format!("pnpm add {}", package),
        "pip" | "pip3" => format!("pip install {}", package),
        "cargo" => format!("cargo add {}", package),
        "go" => format!("go get {}", package),
        _ => return None,
    };
    Some(command)
}

/// Single-quotes `word` when it holds anything beyond a plain package spec,
/// so version bounds such as `fastapi>=0.100` are not read as redirects.
fn shell_word(word: &str) -> String {
    let plain = word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.@/:+=".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

async fn ensure_parent(target: &Path) -> Result<(), BuildError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

fn last_line(output: &str) -> String {
    output.lines().last().unwrap_or_default().trim().to_string()
}
