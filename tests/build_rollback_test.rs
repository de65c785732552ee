//! Build engine runs against real temp workspaces: rollback on critical
//! failure, dependency ordering and plans parsed from documents.

use specforge::build::{
    BuildEngine, BuildFailure, BuildOptions, BuildPlan, BuildStep, StepAction,
    StructuredPlanParser, ValidationRule,
};
use std::time::Duration;
use tempfile::TempDir;

fn options() -> BuildOptions {
    BuildOptions::default()
        .with_backoff(Duration::ZERO)
        .with_default_timeout(Duration::from_secs(10))
        .without_artifact()
}

#[tokio::test]
async fn test_failed_validation_step_rolls_back_written_config() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("ws");

    let plan = BuildPlan::new(
        "config",
        vec![
            BuildStep::write_file("A", "app.config", "port=8080"),
            BuildStep::new(
                "B",
                StepAction::InstallDependency {
                    package: "left-pad".into(),
                    manager: None,
                    command: Some("true".into()),
                },
            )
            .depends_on(&["A"]),
            BuildStep::validate(
                "C",
                ValidationRule::CommandOutputEquals {
                    command: "cat app.config".into(),
                    expected: "port=9090".into(),
                },
            )
            .depends_on(&["A", "B"]),
        ],
    );

    let result = BuildEngine::new()
        .build(&plan, &workspace, &options().keep_workspace_on_failure())
        .await;

    assert!(!result.success);
    assert_eq!(result.executed_steps, vec!["A", "B"]);
    assert_eq!(result.failed_step.as_deref(), Some("C"));
    assert!(matches!(result.failure, Some(BuildFailure::StepFailed { .. })));
    assert!(result.rollback_performed);
    assert!(!workspace.join("app.config").exists());
    assert!(result.rollback.unwrap().failures.is_empty());
}

#[tokio::test]
async fn test_rollback_restores_pre_existing_content() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("ws");
    std::fs::create_dir_all(workspace.join("conf")).unwrap();
    std::fs::write(workspace.join("conf/db.yaml"), "host: localhost\n").unwrap();

    let plan = BuildPlan::new(
        "overwrite",
        vec![
            BuildStep::write_file("db", "conf/db.yaml", "host: prod\n"),
            BuildStep::write_file("extra", "conf/nested/extra.yaml", "a: 1\n"),
            BuildStep::run("fail", "exit 4").depends_on(&["db", "extra"]),
        ],
    );

    let result = BuildEngine::new()
        .build(&plan, &workspace, &options().keep_workspace_on_failure())
        .await;

    assert!(!result.success);
    assert_eq!(
        std::fs::read_to_string(workspace.join("conf/db.yaml")).unwrap(),
        "host: localhost\n"
    );
    assert!(!workspace.join("conf/nested").exists());
    assert!(result.metrics.rollback_actions >= 2);
}

#[tokio::test]
async fn test_rollback_commands_run_in_reverse_order() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("ws");
    std::fs::create_dir_all(&workspace).unwrap();

    let plan = BuildPlan::new(
        "undo-order",
        vec![
            BuildStep::run("first", "true").with_rollback(&["echo first >> undo.log"]),
            BuildStep::run("second", "true").with_rollback(&["echo second >> undo.log"]),
            BuildStep::run("boom", "exit 1"),
        ],
    );

    let result = BuildEngine::new()
        .build(&plan, &workspace, &options().keep_workspace_on_failure())
        .await;

    assert!(result.rollback_performed);
    assert_eq!(
        std::fs::read_to_string(workspace.join("undo.log")).unwrap(),
        "second\nfirst\n"
    );
}

#[tokio::test]
async fn test_dependency_declared_later_is_unmet() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("ws");
    let plan = BuildPlan::new(
        "order",
        vec![
            BuildStep::write_file("a", "a.txt", "a"),
            BuildStep::run("b", "true").depends_on(&["c"]),
            BuildStep::run("c", "true"),
        ],
    );

    let result = BuildEngine::new()
        .build(&plan, &workspace, &options().keep_workspace_on_failure())
        .await;

    assert_eq!(result.executed_steps, vec!["a"]);
    match result.failure {
        Some(BuildFailure::DependencyUnmet { step, missing }) => {
            assert_eq!(step, "b");
            assert_eq!(missing, vec!["c"]);
        }
        other => panic!("expected unmet dependency, got {:?}", other),
    }
    assert!(!result.rollback_performed);
    assert!(workspace.join("a.txt").exists());
}

#[tokio::test]
async fn test_parsed_coarse_plan_builds_and_packages() {
    let root = TempDir::new().unwrap();
    let workspace = root.path().join("site");
    let document = r#"
project_name: site
directories: [public, src]
files:
  public/index.html: "<h1>hi</h1>"
  src/app.js: "console.log('hi')"
commands:
  - test -f public/index.html
"#;
    let plan = StructuredPlanParser::new().parse_str(document).unwrap();
    assert_eq!(plan.name, "site");

    let options = BuildOptions::default()
        .with_backoff(Duration::ZERO)
        .with_default_timeout(Duration::from_secs(10));
    let result = BuildEngine::new().build(&plan, &workspace, &options).await;

    assert!(result.success, "{:?}", result.failure);
    assert_eq!(result.executed_steps.len(), 5);
    assert_eq!(result.executed_steps.last().map(String::as_str), Some("cmd-1"));
    let archive = result.artifact_path.unwrap();
    assert_eq!(archive, root.path().join("site.tar.gz"));
    assert!(archive.exists());
}
