//! Build Execution Engine.

use super::artifact::package_workspace;
use super::executor::StepExecutor;
use super::rollback::{RollbackReport, RollbackStack};
use super::step::{BuildPlan, BuildStep, StepCondition};
use crate::util::LogLevel;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Log every step without touching the filesystem.
    pub dry_run: bool,
    pub package_artifact: bool,
    pub keep_workspace_on_failure: bool,
    /// Wait between attempts of a failing step.
    pub backoff: Duration,
    pub default_timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            package_artifact: true,
            keep_workspace_on_failure: false,
            backoff: Duration::from_secs(1),
            default_timeout: Duration::from_secs(300),
        }
    }
}

impl BuildOptions {
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn without_artifact(mut self) -> Self {
        self.package_artifact = false;
        self
    }

    pub fn keep_workspace_on_failure(mut self) -> Self {
        self.keep_workspace_on_failure = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildMetrics {
    pub total_steps: usize,
    /// Every execution attempt, retries included.
    pub attempts: u32,
    pub duration: Duration,
    pub rollback_actions: usize,
}

/// Why a build did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BuildFailure {
    DependencyUnmet { step: String, missing: Vec<String> },
    StepFailed { step: String, error: String },
    ValidationFailed { rule: String, error: String },
    Cancelled,
    Workspace { error: String },
    Packaging { error: String },
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildFailure::DependencyUnmet { step, missing } => {
                write!(f, "step {} depends on incomplete steps: {}", step, missing.join(", "))
            }
            BuildFailure::StepFailed { step, error } => write!(f, "step {} failed: {}", step, error),
            BuildFailure::ValidationFailed { rule, error } => {
                write!(f, "validation '{}' failed: {}", rule, error)
            }
            BuildFailure::Cancelled => f.write_str("build cancelled"),
            BuildFailure::Workspace { error } => write!(f, "workspace error: {}", error),
            BuildFailure::Packaging { error } => write!(f, "packaging failed: {}", error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    pub build_id: String,
    pub success: bool,
    pub executed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub skipped_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub failure: Option<BuildFailure>,
    pub artifact_path: Option<PathBuf>,
    pub workspace: PathBuf,
    pub logs: Vec<BuildLogEntry>,
    pub metrics: BuildMetrics,
    pub rollback_performed: bool,
    pub rollback: Option<RollbackReport>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl BuildResult {
    fn new(build_id: String, workspace: &Path, total_steps: usize) -> Self {
        Self {
            build_id,
            success: false,
            executed_steps: Vec::new(),
            failed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            failed_step: None,
            failure: None,
            artifact_path: None,
            workspace: workspace.to_path_buf(),
            logs: Vec::new(),
            metrics: BuildMetrics {
                total_steps,
                ..BuildMetrics::default()
            },
            rollback_performed: false,
            rollback: None,
            warnings: Vec::new(),
            cancelled: false,
        }
    }

    fn log(&mut self, level: LogLevel, step: Option<&str>, message: impl Into<String>) {
        self.logs.push(BuildLogEntry {
            timestamp: Utc::now(),
            level,
            step: step.map(str::to_string),
            message: message.into(),
        });
    }

    fn warn(&mut self, step: Option<&str>, message: String) {
        self.log(LogLevel::Warn, step, message.clone());
        self.warnings.push(message);
    }
}

enum StepOutcome {
    Completed,
    Failed(String),
}

fn step_timeout(step: &BuildStep, options: &BuildOptions) -> Duration {
    step.timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(options.default_timeout)
}

/// First condition of `step` that does not hold. Conditions are checked
/// before dependencies, so a skipped step never trips the dependency gate.
async fn unmet_condition<'a>(
    step: &'a BuildStep,
    executor: &StepExecutor,
    options: &BuildOptions,
) -> Option<&'a StepCondition> {
    let timeout = step_timeout(step, options);
    for condition in &step.conditions {
        if !executor.condition_met(condition, timeout).await {
            return Some(condition);
        }
    }
    None
}

/// Runs build plans step by step inside a per-build workspace.
///
/// Steps run in the order given. A step whose conditions do not hold is
/// skipped; a step with an incomplete dependency fails the whole build. A
/// critical failure unwinds the rollback stack before the build aborts.
/// Cancellation is observed between steps only.
#[derive(Default)]
pub struct BuildEngine {
    active: DashMap<String, CancellationToken>,
}

impl BuildEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn build(&self, plan: &BuildPlan, workspace: &Path, options: &BuildOptions) -> BuildResult {
        self.build_with_token(plan, workspace, options, CancellationToken::new())
            .await
    }

    /// Like [`BuildEngine::build`], also stopping when `token` (or the
    /// engine's own cancel) fires.
    pub async fn build_with_token(
        &self,
        plan: &BuildPlan,
        workspace: &Path,
        options: &BuildOptions,
        token: CancellationToken,
    ) -> BuildResult {
        let build_id = Uuid::new_v4().to_string();
        self.active.insert(build_id.clone(), token.clone());

        let result = self.run(build_id.clone(), plan, workspace, options, &token).await;

        self.active.remove(&build_id);
        result
    }

    /// Requests cancellation of an active build. Returns false for unknown ids.
    pub fn cancel(&self, build_id: &str) -> bool {
        match self.active.get(build_id) {
            Some(token) => {
                info!(build = %build_id, "Cancelling build");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active_builds(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    async fn run(
        &self,
        build_id: String,
        plan: &BuildPlan,
        workspace: &Path,
        options: &BuildOptions,
        token: &CancellationToken,
    ) -> BuildResult {
        let start = Instant::now();
        let mut result = BuildResult::new(build_id, workspace, plan.steps.len());
        info!(
            build = %result.build_id,
            plan = %plan.name,
            steps = plan.steps.len(),
            dry_run = options.dry_run,
            "Starting build"
        );

        if !options.dry_run {
            if let Err(e) = tokio::fs::create_dir_all(workspace).await {
                let failure = BuildFailure::Workspace { error: e.to_string() };
                result.log(LogLevel::Error, None, failure.to_string());
                result.failure = Some(failure);
                result.metrics.duration = start.elapsed();
                return result;
            }
        }

        let executor = StepExecutor::new(workspace, plan.environment.clone());
        let mut stack = RollbackStack::new();
        let mut completed: HashSet<String> = HashSet::new();

        for step in &plan.steps {
            if token.is_cancelled() {
                warn!(build = %result.build_id, step = %step.id, "Build cancelled before step");
                result.log(LogLevel::Warn, Some(&step.id), "Build cancelled");
                result.cancelled = true;
                result.failure = Some(BuildFailure::Cancelled);
                break;
            }

            if !options.dry_run {
                if let Some(condition) = unmet_condition(step, &executor, options).await {
                    info!(step = %step.id, condition = ?condition, "Condition not met, skipping step");
                    result.log(
                        LogLevel::Info,
                        Some(&step.id),
                        format!("Skipped: condition {:?} not met", condition),
                    );
                    result.skipped_steps.push(step.id.clone());
                    continue;
                }
            }

            let missing: Vec<String> = step
                .depends_on
                .iter()
                .filter(|d| !completed.contains(*d))
                .cloned()
                .collect();
            if !missing.is_empty() {
                let failure = BuildFailure::DependencyUnmet {
                    step: step.id.clone(),
                    missing,
                };
                error!(build = %result.build_id, step = %step.id, "{}", failure);
                result.log(LogLevel::Error, Some(&step.id), failure.to_string());
                result.failed_step = Some(step.id.clone());
                result.failed_steps.push(step.id.clone());
                result.failure = Some(failure);
                break;
            }

            if options.dry_run {
                info!(step = %step.id, step_type = %step.step_type(), "[dry run] would execute");
                result.log(
                    LogLevel::Info,
                    Some(&step.id),
                    format!("[dry run] {} {}", step.step_type(), step.description),
                );
                completed.insert(step.id.clone());
                result.executed_steps.push(step.id.clone());
                continue;
            }

            match self
                .run_step(step, &executor, &mut stack, options, &mut result)
                .await
            {
                StepOutcome::Completed => {
                    completed.insert(step.id.clone());
                    result.executed_steps.push(step.id.clone());
                }
                StepOutcome::Failed(error) => {
                    result.failed_steps.push(step.id.clone());
                    if step.critical {
                        result.failed_step = Some(step.id.clone());
                        result.failure = Some(BuildFailure::StepFailed {
                            step: step.id.clone(),
                            error,
                        });
                        self.rollback(&mut stack, &executor, options, &mut result).await;
                        break;
                    }
                    result.warn(
                        Some(&step.id),
                        format!("non-critical step {} failed: {}", step.id, error),
                    );
                }
            }
        }

        if result.failure.is_none() && !options.dry_run {
            self.run_validations(plan, &executor, &mut stack, options, &mut result)
                .await;
        }

        if result.failure.is_none() {
            result.success = true;
            if options.package_artifact && !options.dry_run {
                match package_workspace(workspace).await {
                    Ok(path) => {
                        result.log(LogLevel::Info, None, format!("Packaged {}", path.display()));
                        result.artifact_path = Some(path);
                    }
                    Err(e) => {
                        result.success = false;
                        result.failure = Some(BuildFailure::Packaging { error: e.to_string() });
                    }
                }
            }
        }

        if !result.success && !options.dry_run && !options.keep_workspace_on_failure {
            if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
                debug!(workspace = %workspace.display(), error = %e, "Workspace cleanup failed");
            }
        }

        result.metrics.duration = start.elapsed();
        match result.failure.clone() {
            None => info!(
                build = %result.build_id,
                executed = result.executed_steps.len(),
                skipped = result.skipped_steps.len(),
                "Build succeeded"
            ),
            Some(failure) => {
                result.log(LogLevel::Error, None, failure.to_string());
                warn!(build = %result.build_id, failure = %failure, "Build failed");
            }
        }
        result
    }

    async fn run_step(
        &self,
        step: &BuildStep,
        executor: &StepExecutor,
        stack: &mut RollbackStack,
        options: &BuildOptions,
        result: &mut BuildResult,
    ) -> StepOutcome {
        let timeout = step_timeout(step, options);

        let inverse = match executor.inverse_of(step).await {
            Ok(inverse) => inverse,
            Err(e) => return StepOutcome::Failed(e.to_string()),
        };

        let mut remaining = step.retries;
        loop {
            result.metrics.attempts += 1;
            match executor.execute(step, timeout).await {
                Ok(summary) => {
                    debug!(step = %step.id, summary = %summary, "Step completed");
                    result.log(LogLevel::Info, Some(&step.id), summary);
                    stack.extend(&step.id, inverse);
                    return StepOutcome::Completed;
                }
                Err(e) if remaining > 0 => {
                    remaining -= 1;
                    warn!(step = %step.id, error = %e, remaining, "Step failed, retrying");
                    result.log(
                        LogLevel::Warn,
                        Some(&step.id),
                        format!("Attempt failed: {} ({} retries left)", e, remaining),
                    );
                    tokio::time::sleep(options.backoff).await;
                }
                Err(e) => {
                    error!(step = %step.id, error = %e, "Step failed");
                    result.log(LogLevel::Error, Some(&step.id), format!("Failed: {}", e));
                    return StepOutcome::Failed(e.to_string());
                }
            }
        }
    }

    async fn run_validations(
        &self,
        plan: &BuildPlan,
        executor: &StepExecutor,
        stack: &mut RollbackStack,
        options: &BuildOptions,
        result: &mut BuildResult,
    ) {
        for check in &plan.validations {
            match executor.evaluate(&check.rule, options.default_timeout).await {
                Ok(()) => result.log(LogLevel::Info, None, format!("Validation passed: {}", check.rule)),
                Err(e) if check.critical => {
                    result.failure = Some(BuildFailure::ValidationFailed {
                        rule: check.rule.to_string(),
                        error: e.to_string(),
                    });
                    self.rollback(stack, executor, options, result).await;
                    return;
                }
                Err(e) => result.warn(None, format!("validation '{}' failed: {}", check.rule, e)),
            }
        }
    }

    async fn rollback(
        &self,
        stack: &mut RollbackStack,
        executor: &StepExecutor,
        options: &BuildOptions,
        result: &mut BuildResult,
    ) {
        info!(build = %result.build_id, actions = stack.len(), "Rolling back");
        let report = stack.unwind(executor, options.default_timeout).await;
        for failure in &report.failures {
            result.warn(None, format!("rollback action failed: {}", failure));
        }
        result.log(
            LogLevel::Info,
            None,
            format!("Rollback performed {} action(s)", report.performed),
        );
        result.metrics.rollback_actions = report.performed;
        result.rollback_performed = true;
        result.rollback = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{StepAction, StepCondition, ValidationRule};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn options() -> BuildOptions {
        BuildOptions::default()
            .with_backoff(Duration::ZERO)
            .with_default_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_successful_build_packages_artifact() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        let plan = BuildPlan::new(
            "demo",
            vec![
                BuildStep::create_dir("dirs", "src"),
                BuildStep::write_file("main", "src/main.py", "print('hi')").depends_on(&["dirs"]),
            ],
        )
        .with_validation(ValidationRule::FileExists { path: "src/main.py".into() }, true);

        let result = BuildEngine::new().build(&plan, &workspace, &options()).await;
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.executed_steps, vec!["dirs", "main"]);
        let artifact = result.artifact_path.unwrap();
        assert!(artifact.exists());
        assert_eq!(artifact.parent().unwrap(), root.path());
    }

    #[tokio::test]
    async fn test_unmet_condition_skips() {
        let root = TempDir::new().unwrap();
        let plan = BuildPlan::new(
            "skip",
            vec![BuildStep::write_file("a", "a.txt", "x")
                .when(StepCondition::FileExists { path: "missing".into() })],
        );
        let result = BuildEngine::new()
            .build(&plan, &root.path().join("ws"), &options().without_artifact())
            .await;
        assert!(result.success);
        assert_eq!(result.skipped_steps, vec!["a"]);
        assert!(result.executed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_on_skipped_step_is_fatal() {
        let root = TempDir::new().unwrap();
        let plan = BuildPlan::new(
            "deps",
            vec![
                BuildStep::run("a", "true").when(StepCondition::EnvVarSet {
                    name: "SPECFORGE_NEVER_SET".into(),
                }),
                BuildStep::run("b", "true").depends_on(&["a"]),
                BuildStep::run("c", "true"),
            ],
        );
        let result = BuildEngine::new()
            .build(&plan, &root.path().join("ws"), &options())
            .await;
        assert!(!result.success);
        assert_eq!(result.failed_step.as_deref(), Some("b"));
        assert!(matches!(result.failure, Some(BuildFailure::DependencyUnmet { .. })));
        assert!(!result.executed_steps.contains(&"c".to_string()));
        assert!(!result.rollback_performed);
    }

    #[tokio::test]
    async fn test_unmet_condition_skips_before_dependency_check() {
        let root = TempDir::new().unwrap();
        let plan = BuildPlan::new(
            "optional",
            vec![
                BuildStep::run("docs", "true")
                    .depends_on(&["never-ran"])
                    .when(StepCondition::FileExists { path: "docs.toml".into() }),
                BuildStep::write_file("main", "main.py", "print('ok')"),
            ],
        );
        let result = BuildEngine::new()
            .build(&plan, &root.path().join("ws"), &options().without_artifact())
            .await;
        assert!(result.success, "{:?}", result.failure);
        assert_eq!(result.skipped_steps, vec!["docs"]);
        assert_eq!(result.executed_steps, vec!["main"]);
        assert!(result.failed_steps.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_exhausts_retries_then_rolls_back() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        let plan = BuildPlan::new(
            "slow",
            vec![
                BuildStep::write_file("cfg", "app.cfg", "port=8080"),
                BuildStep::run("serve", "sleep 5")
                    .with_timeout_secs(1)
                    .with_retries(1)
                    .depends_on(&["cfg"]),
            ],
        );
        let result = BuildEngine::new()
            .build(&plan, &workspace, &options().keep_workspace_on_failure())
            .await;

        assert!(!result.success);
        assert_eq!(result.failed_step.as_deref(), Some("serve"));
        match &result.failure {
            Some(BuildFailure::StepFailed { step, error }) => {
                assert_eq!(step, "serve");
                assert!(error.contains("timed out"), "{}", error);
            }
            other => panic!("unexpected failure: {:?}", other),
        }
        // One attempt for cfg, retries + 1 for serve.
        assert_eq!(result.metrics.attempts, 3);
        assert!(result
            .logs
            .iter()
            .any(|l| l.step.as_deref() == Some("serve") && l.message.starts_with("Attempt failed")));
        assert!(result.rollback_performed);
        assert_eq!(result.metrics.rollback_actions, 1);
        assert!(!workspace.join("app.cfg").exists());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let root = TempDir::new().unwrap();
        // Fails until the marker exists; the first attempt creates it.
        let flaky = "if [ -f marker ]; then exit 0; else touch marker; exit 1; fi";
        let plan = BuildPlan::new("retry", vec![BuildStep::run("flaky", flaky).with_retries(2)]);

        let result = BuildEngine::new()
            .build(&plan, &root.path().join("ws"), &options().without_artifact())
            .await;
        assert!(result.success);
        assert_eq!(result.metrics.attempts, 2);
    }

    #[tokio::test]
    async fn test_non_critical_failure_continues() {
        let root = TempDir::new().unwrap();
        let plan = BuildPlan::new(
            "soft",
            vec![
                BuildStep::run("lint", "exit 1").non_critical(),
                BuildStep::run("build", "true"),
            ],
        );
        let result = BuildEngine::new()
            .build(&plan, &root.path().join("ws"), &options().without_artifact())
            .await;
        assert!(result.success);
        assert_eq!(result.failed_steps, vec!["lint"]);
        assert_eq!(result.executed_steps, vec!["build"]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_critical_failure_restores_modified_file() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("settings.ini"), "debug=false").unwrap();

        let plan = BuildPlan::new(
            "restore",
            vec![
                BuildStep::write_file("overwrite", "settings.ini", "debug=true"),
                BuildStep::new(
                    "append",
                    StepAction::ModifyFile {
                        path: "settings.ini".into(),
                        edit: crate::build::FileEdit::Append { content: "\nx=1".into() },
                    },
                ),
                BuildStep::run("explode", "exit 7"),
            ],
        );
        let result = BuildEngine::new()
            .build(&plan, &workspace, &options().keep_workspace_on_failure())
            .await;

        assert!(!result.success);
        assert!(result.rollback_performed);
        assert_eq!(
            std::fs::read_to_string(workspace.join("settings.ini")).unwrap(),
            "debug=false"
        );
    }

    #[tokio::test]
    async fn test_failed_build_removes_workspace() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        let plan = BuildPlan::new("fail", vec![BuildStep::run("boom", "exit 1")]);
        let result = BuildEngine::new().build(&plan, &workspace, &options()).await;
        assert!(!result.success);
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_critical_validation_failure_rolls_back() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        let plan = BuildPlan::new("validate", vec![BuildStep::write_file("w", "out.txt", "x")])
            .with_validation(ValidationRule::FileExists { path: "nope".into() }, false)
            .with_validation(
                ValidationRule::CommandOutputEquals {
                    command: "echo no".into(),
                    expected: "yes".into(),
                },
                true,
            );
        let result = BuildEngine::new()
            .build(&plan, &workspace, &options().keep_workspace_on_failure())
            .await;

        assert!(!result.success);
        assert!(matches!(result.failure, Some(BuildFailure::ValidationFailed { .. })));
        assert_eq!(result.warnings.len(), 1);
        assert!(!workspace.join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_dry_run_has_no_side_effects() {
        let root = TempDir::new().unwrap();
        let workspace = root.path().join("ws");
        let plan = BuildPlan::new("dry", vec![BuildStep::write_file("w", "a.txt", "x")]);
        let result = BuildEngine::new()
            .build(&plan, &workspace, &options().dry_run())
            .await;
        assert!(result.success);
        assert_eq!(result.executed_steps, vec!["w"]);
        assert!(!workspace.exists());
        assert!(result.artifact_path.is_none());
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let root = TempDir::new().unwrap();
        let engine = Arc::new(BuildEngine::new());
        let plan = BuildPlan::new(
            "slow",
            vec![BuildStep::run("wait", "sleep 1"), BuildStep::run("after", "touch after")],
        );
        let workspace = root.path().join("ws");

        let handle = {
            let engine = engine.clone();
            let workspace = workspace.clone();
            tokio::spawn(async move { engine.build(&plan, &workspace, &options()).await })
        };

        let build_id = loop {
            if let Some(id) = engine.active_builds().pop() {
                break id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert!(engine.cancel(&build_id));

        let result = handle.await.unwrap();
        assert!(result.cancelled);
        assert!(!result.success);
        assert_eq!(result.executed_steps, vec!["wait"]);
        assert!(engine.active_builds().is_empty());
        assert!(!engine.cancel(&build_id));
    }
}
