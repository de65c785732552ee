//! Build plan data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    RunCommand,
    WriteFile,
    InstallDependency,
    CreateDirectory,
    CopyFile,
    ModifyFile,
    ValidateStep,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FileEdit {
    /// Replaces every occurrence of `find`.
    Replace { find: String, replace: String },
    Append { content: String },
}

/// What a step does. Serialized with a `type` tag next to the step's
/// other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepAction {
    RunCommand {
        command: String,
    },
    WriteFile {
        path: String,
        #[serde(default)]
        content: String,
    },
    InstallDependency {
        package: String,
        /// npm, yarn, pnpm, pip, cargo or go. Detected from the workspace when absent.
        #[serde(default)]
        manager: Option<String>,
        /// Overrides the rendered install command.
        #[serde(default)]
        command: Option<String>,
    },
    CreateDirectory {
        path: String,
    },
    CopyFile {
        from: String,
        to: String,
    },
    ModifyFile {
        path: String,
        edit: FileEdit,
    },
    ValidateStep {
        rule: ValidationRule,
    },
}

impl StepAction {
    pub fn step_type(&self) -> StepType {
        match self {
            StepAction::RunCommand { .. } => StepType::RunCommand,
            StepAction::WriteFile { .. } => StepType::WriteFile,
            StepAction::InstallDependency { .. } => StepType::InstallDependency,
            StepAction::CreateDirectory { .. } => StepType::CreateDirectory,
            StepAction::CopyFile { .. } => StepType::CopyFile,
            StepAction::ModifyFile { .. } => StepType::ModifyFile,
            StepAction::ValidateStep { .. } => StepType::ValidateStep,
        }
    }

    /// Workspace-relative paths the action touches.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            StepAction::WriteFile { path, .. }
            | StepAction::CreateDirectory { path }
            | StepAction::ModifyFile { path, .. } => vec![path.as_str()],
            StepAction::CopyFile { from, to } => vec![from.as_str(), to.as_str()],
            StepAction::ValidateStep {
                rule: ValidationRule::FileExists { path },
            } => vec![path.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Predicate evaluated before a step; an unmet condition skips the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StepCondition {
    FileExists { path: String },
    CommandSucceeds { command: String },
    EnvVarSet { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ValidationRule {
    FileExists {
        path: String,
    },
    CommandOutputEquals {
        command: String,
        expected: String,
    },
    PortReachable {
        host: String,
        port: u16,
        #[serde(default = "default_connect_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::FileExists { path } => write!(f, "file exists: {}", path),
            ValidationRule::CommandOutputEquals { command, expected } => {
                write!(f, "`{}` outputs {:?}", command, expected)
            }
            ValidationRule::PortReachable { host, port, .. } => {
                write!(f, "{}:{} reachable", host, port)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub rule: ValidationRule,
    #[serde(default = "default_true")]
    pub critical: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<StepCondition>,
    #[serde(default = "default_true")]
    pub critical: bool,
    #[serde(default)]
    pub retries: u32,
    /// Falls back to the build's default timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub rollback_commands: Vec<String>,
}

impl BuildStep {
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            action,
            depends_on: Vec::new(),
            conditions: Vec::new(),
            critical: true,
            retries: 0,
            timeout_secs: None,
            rollback_commands: Vec::new(),
        }
    }

    pub fn run(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            id,
            StepAction::RunCommand {
                command: command.into(),
            },
        )
    }

    pub fn write_file(id: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            StepAction::WriteFile {
                path: path.into(),
                content: content.into(),
            },
        )
    }

    pub fn create_dir(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, StepAction::CreateDirectory { path: path.into() })
    }

    pub fn validate(id: impl Into<String>, rule: ValidationRule) -> Self {
        Self::new(id, StepAction::ValidateStep { rule })
    }

    pub fn step_type(&self) -> StepType {
        self.action.step_type()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_rollback(mut self, commands: &[&str]) -> Self {
        self.rollback_commands = commands.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<BuildStep>,
    #[serde(default)]
    pub validations: Vec<ValidationCheck>,
    /// Extra variables for every spawned command.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl BuildPlan {
    pub fn new(name: impl Into<String>, steps: Vec<BuildStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            ..Self::default()
        }
    }

    pub fn with_validation(mut self, rule: ValidationRule, critical: bool) -> Self {
        self.validations.push(ValidationCheck { rule, critical });
        self
    }

    pub fn step(&self, id: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_deserializes_flat_shape() {
        let json = r#"{
            "id": "write-config",
            "type": "WriteFile",
            "description": "write config",
            "path": "app.config",
            "content": "port=8080",
            "depends_on": ["init"],
            "retries": 2
        }"#;
        let step: BuildStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_type(), StepType::WriteFile);
        assert_eq!(step.depends_on, vec!["init"]);
        assert!(step.critical);
        assert_eq!(step.retries, 2);
        assert_eq!(step.action.paths(), vec!["app.config"]);
    }

    #[test]
    fn test_validate_step_and_conditions() {
        let yaml = r#"
id: check
type: ValidateStep
rule:
  type: CommandOutputEquals
  command: echo ok
  expected: ok
conditions:
  - type: EnvVarSet
    name: CI
critical: false
"#;
        let step: BuildStep = serde_yaml::from_str(yaml).unwrap();
        assert!(!step.critical);
        assert_eq!(
            step.conditions,
            vec![StepCondition::EnvVarSet {
                name: "CI".to_string()
            }]
        );
        assert!(matches!(
            step.action,
            StepAction::ValidateStep {
                rule: ValidationRule::CommandOutputEquals { .. }
            }
        ));
    }

    #[test]
    fn test_modify_file_edit() {
        let json = r#"{"id":"m","type":"ModifyFile","path":"a.txt","edit":{"mode":"append","content":"x"}}"#;
        let step: BuildStep = serde_json::from_str(json).unwrap();
        assert_eq!(
            step.action,
            StepAction::ModifyFile {
                path: "a.txt".to_string(),
                edit: FileEdit::Append {
                    content: "x".to_string()
                }
            }
        );
    }

    #[test]
    fn test_port_rule_default_timeout() {
        let rule: ValidationRule =
            serde_json::from_str(r#"{"type":"PortReachable","host":"localhost","port":8080}"#).unwrap();
        assert_eq!(
            rule,
            ValidationRule::PortReachable {
                host: "localhost".to_string(),
                port: 8080,
                timeout_ms: 2000
            }
        );
    }
}
