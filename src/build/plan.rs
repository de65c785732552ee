//! Plan document parsing: JSON or YAML, optionally fenced in markdown, in
//! either the detailed step shape or the coarse grouped shape.

use super::lint::PlanValidator;
use super::step::{BuildPlan, BuildStep, StepAction};
use super::template::ProjectTemplate;
use crate::collaborators::prompt::extract_fenced;
use crate::collaborators::{DocumentParser, PlanDocument};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("plan document is empty")]
    Empty,

    #[error("plan is neither JSON nor YAML: {0}")]
    Syntax(String),

    #[error("plan has an unexpected shape: {0}")]
    Shape(String),

    #[error("invalid plan: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
struct CoarseFile {
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoarseFiles {
    List(Vec<CoarseFile>),
    Map(BTreeMap<String, String>),
}

impl Default for CoarseFiles {
    fn default() -> Self {
        CoarseFiles::List(Vec::new())
    }
}

impl CoarseFiles {
    fn into_vec(self) -> Vec<CoarseFile> {
        match self {
            CoarseFiles::List(files) => files,
            CoarseFiles::Map(map) => map
                .into_iter()
                .map(|(path, content)| CoarseFile { path, content })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoarseInstruction {
    #[serde(rename = "type")]
    kind: String,
    target: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    order: i64,
}

/// Grouped plan: directories, files, dependencies, then commands.
#[derive(Debug, Default, Deserialize)]
struct CoarsePlan {
    #[serde(default, alias = "project_name")]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default)]
    files: CoarseFiles,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    post_build_commands: Vec<String>,
    #[serde(default)]
    build_instructions: Vec<CoarseInstruction>,
    #[serde(default, alias = "environment_variables")]
    environment: BTreeMap<String, String>,
    /// Framework scaffold laid down ahead of the plan's own groups.
    #[serde(default, alias = "framework")]
    template: Option<String>,
}

const COARSE_KEYS: &[&str] = &[
    "directories",
    "files",
    "dependencies",
    "commands",
    "build_instructions",
    "template",
];

impl CoarsePlan {
    /// Expands groups into steps; every step depends on all steps of the
    /// previous non-empty group.
    fn expand(mut self) -> Result<BuildPlan, PlanParseError> {
        self.build_instructions.sort_by_key(|i| i.order);
        let mut files = std::mem::take(&mut self.files).into_vec();

        if let Some(name) = self.template.take() {
            let template: ProjectTemplate = name.parse().map_err(PlanParseError::Invalid)?;
            if self.name.is_empty() {
                self.name = "app".to_string();
            }
            debug!(template = template.key(), project = %self.name, "Applying project template");
            let mut directories = template.directories(&self.name);
            directories.append(&mut self.directories);
            self.directories = directories;
            let mut scaffold: Vec<CoarseFile> = template
                .files(&self.name)
                .into_iter()
                .map(|(path, content)| CoarseFile { path, content })
                .collect();
            scaffold.append(&mut files);
            files = scaffold;
            let mut dependencies: Vec<String> = template
                .runtime_dependencies()
                .iter()
                .map(|d| d.to_string())
                .collect();
            dependencies.append(&mut self.dependencies);
            self.dependencies = dependencies;
        }

        for instruction in std::mem::take(&mut self.build_instructions) {
            match instruction.kind.as_str() {
                "directory" => self.directories.push(instruction.target),
                "file" => files.push(CoarseFile {
                    path: instruction.target,
                    content: instruction.content.unwrap_or_default(),
                }),
                "dependency" => self.dependencies.push(instruction.target),
                "command" => self.commands.push(instruction.target),
                other => debug!(kind = other, "Ignoring unknown instruction type"),
            }
        }

        let groups: Vec<Vec<BuildStep>> = vec![
            self.directories
                .iter()
                .enumerate()
                .map(|(i, dir)| {
                    BuildStep::create_dir(format!("dir-{}", i + 1), dir.as_str())
                        .with_description(format!("Create directory {}", dir))
                })
                .collect(),
            files
                .into_iter()
                .enumerate()
                .map(|(i, file)| {
                    let description = format!("Write {}", file.path);
                    BuildStep::write_file(format!("file-{}", i + 1), file.path, file.content)
                        .with_description(description)
                })
                .collect(),
            self.dependencies
                .iter()
                .enumerate()
                .map(|(i, package)| {
                    BuildStep::new(
                        format!("dep-{}", i + 1),
                        StepAction::InstallDependency {
                            package: package.clone(),
                            manager: None,
                            command: None,
                        },
                    )
                    .with_description(format!("Install {}", package))
                })
                .collect(),
            self.commands
                .iter()
                .enumerate()
                .map(|(i, command)| {
                    BuildStep::run(format!("cmd-{}", i + 1), command.as_str())
                        .with_description(format!("Run {}", command))
                })
                .collect(),
            self.post_build_commands
                .iter()
                .enumerate()
                .map(|(i, command)| {
                    BuildStep::run(format!("post-{}", i + 1), command.as_str())
                        .with_description(format!("Post-build {}", command))
                        .non_critical()
                })
                .collect(),
        ];

        Ok(BuildPlan {
            name: self.name,
            description: self.description,
            steps: chain_groups(groups),
            validations: Vec::new(),
            environment: self.environment,
        })
    }
}

/// Flattens step groups in order, making every step depend on all steps of
/// the previous non-empty group.
pub(super) fn chain_groups(groups: Vec<Vec<BuildStep>>) -> Vec<BuildStep> {
    let mut steps = Vec::new();
    let mut previous: Vec<String> = Vec::new();
    for group in groups {
        if group.is_empty() {
            continue;
        }
        let ids: Vec<String> = group.iter().map(|s| s.id.clone()).collect();
        for mut step in group {
            step.depends_on = previous.clone();
            steps.push(step);
        }
        previous = ids;
    }
    steps
}

/// Default document parser for plans produced by the plan generator or
/// written by hand.
#[derive(Default)]
pub struct StructuredPlanParser {
    validator: PlanValidator,
}

impl StructuredPlanParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_str(&self, content: &str) -> Result<BuildPlan, PlanParseError> {
        let body = extract_fenced(content);
        if body.is_empty() {
            return Err(PlanParseError::Empty);
        }

        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(json_err) => serde_yaml::from_str(body).map_err(|yaml_err| {
                PlanParseError::Syntax(format!("json: {}; yaml: {}", json_err, yaml_err))
            })?,
        };

        let Some(object) = value.as_object() else {
            return Err(PlanParseError::Shape("expected a mapping at the top level".to_string()));
        };

        let plan = if object.contains_key("steps") {
            serde_json::from_value::<BuildPlan>(value)
                .map_err(|e| PlanParseError::Shape(e.to_string()))?
        } else if COARSE_KEYS.iter().any(|k| object.contains_key(*k)) {
            serde_json::from_value::<CoarsePlan>(value)
                .map_err(|e| PlanParseError::Shape(e.to_string()))?
                .expand()?
        } else {
            return Err(PlanParseError::Shape(
                "expected `steps` or grouped directories/files/dependencies/commands".to_string(),
            ));
        };

        self.validator
            .validate(&plan)
            .map_err(PlanParseError::Invalid)?;
        debug!(plan = %plan.name, steps = plan.steps.len(), "Parsed build plan");
        Ok(plan)
    }
}

#[async_trait]
impl DocumentParser for StructuredPlanParser {
    async fn parse(&self, document: &PlanDocument) -> Result<BuildPlan, PlanParseError> {
        self.parse_str(&document.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::StepType;

    #[test]
    fn test_parses_fenced_json() {
        let doc = r#"Here is the plan:
```json
{
  "name": "api",
  "steps": [
    {"id": "src", "type": "CreateDirectory", "path": "src"},
    {"id": "main", "type": "WriteFile", "path": "src/app.py", "content": "app = 1", "depends_on": ["src"]}
  ],
  "validations": [{"rule": {"type": "FileExists", "path": "src/app.py"}}]
}
```"#;
        let plan = StructuredPlanParser::new().parse_str(doc).unwrap();
        assert_eq!(plan.name, "api");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].step_type(), StepType::WriteFile);
        assert!(plan.validations[0].critical);
    }

    #[test]
    fn test_parses_yaml() {
        let doc = r#"
name: cli
steps:
  - id: build
    type: RunCommand
    command: make
    retries: 1
"#;
        let plan = StructuredPlanParser::new().parse_str(doc).unwrap();
        assert_eq!(plan.steps[0].retries, 1);
    }

    #[test]
    fn test_expands_coarse_plan_in_group_order() {
        let doc = r#"{
            "project_name": "site",
            "commands": ["npm run build"],
            "dependencies": ["react"],
            "files": {"src/index.js": "render()"},
            "directories": ["src", "public"]
        }"#;
        let plan = StructuredPlanParser::new().parse_str(doc).unwrap();
        let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["dir-1", "dir-2", "file-1", "dep-1", "cmd-1"]);
        assert_eq!(plan.name, "site");
        assert!(plan.steps[0].depends_on.is_empty());
        assert_eq!(plan.steps[2].depends_on, vec!["dir-1", "dir-2"]);
        assert_eq!(plan.steps[3].depends_on, vec!["file-1"]);
        assert_eq!(plan.steps[4].depends_on, vec!["dep-1"]);
    }

    #[test]
    fn test_build_instructions_are_ordered() {
        let doc = r#"{
            "build_instructions": [
                {"type": "command", "action": "run", "target": "ls", "order": 2},
                {"type": "directory", "action": "create", "target": "app", "order": 1}
            ]
        }"#;
        let plan = StructuredPlanParser::new().parse_str(doc).unwrap();
        assert_eq!(plan.steps[0].step_type(), StepType::CreateDirectory);
        assert_eq!(plan.steps[1].depends_on, vec!["dir-1"]);
    }

    #[test]
    fn test_template_key_scaffolds_before_plan_groups() {
        let doc = r#"
project_name: orders
template: fastapi
files:
  app/api/orders.py: "router = None"
commands: ["python -m compileall app"]
"#;
        let plan = StructuredPlanParser::new().parse_str(doc).unwrap();
        let writes: Vec<&str> = plan
            .steps
            .iter()
            .filter_map(|s| match &s.action {
                StepAction::WriteFile { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(writes.first(), Some(&"requirements.txt"));
        assert!(writes.contains(&"main.py"));
        assert_eq!(writes.last(), Some(&"app/api/orders.py"));
        assert_eq!(plan.steps[0].step_type(), StepType::CreateDirectory);
        assert!(plan
            .steps
            .iter()
            .any(|s| s.step_type() == StepType::InstallDependency));
        assert_eq!(plan.steps.last().unwrap().id, "cmd-1");

        let unknown = StructuredPlanParser::new().parse_str(r#"{"template": "rails"}"#);
        assert!(matches!(unknown, Err(PlanParseError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_documents() {
        let parser = StructuredPlanParser::new();
        assert!(matches!(parser.parse_str("   "), Err(PlanParseError::Empty)));
        assert!(matches!(parser.parse_str("[1, 2]"), Err(PlanParseError::Shape(_))));
        assert!(matches!(parser.parse_str(r#"{"title": "x"}"#), Err(PlanParseError::Shape(_))));
        assert!(matches!(
            parser.parse_str(r#"{"steps": [{"id": "a", "type": "WriteFile", "path": "../x"}]}"#),
            Err(PlanParseError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_document_parser_trait() {
        let doc = PlanDocument::new(r#"{"steps":[{"id":"a","type":"RunCommand","command":"true"}]}"#, "test");
        let plan = StructuredPlanParser::new().parse(&doc).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
    }
}
