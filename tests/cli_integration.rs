//! CLI integration tests
//!
//! These run the built binary and check command parsing, output formats and
//! exit codes.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn specforge_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_specforge"))
}

fn specforge(temp: &TempDir, args: &[&str]) -> Output {
    Command::new(specforge_bin())
        .args(args)
        .env("SPECFORGE_WORKSPACE_ROOT", temp.path().join("workspaces"))
        .env("SPECFORGE_STEP_BACKOFF_MS", "0")
        .env_remove("SPECFORGE_PROVIDER")
        .env_remove("SPECFORGE_EMBEDDING_URL")
        .env_remove("SPECFORGE_LOG_LEVEL")
        .output()
        .expect("Failed to execute specforge")
}

fn write_plan(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write plan");
    path
}

const HELLO_PLAN: &str = r#"
name: hello
steps:
  - id: src
    type: CreateDirectory
    path: src
  - id: main
    type: WriteFile
    path: src/main.py
    content: "print('hello')"
    depends_on: [src]
validations:
  - rule:
      type: FileExists
      path: src/main.py
"#;

#[test]
fn test_cli_help() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("specforge"));
    assert!(stdout.contains("plan"));
    assert!(stdout.contains("concepts"));
    assert!(stdout.contains("map"));
}

#[test]
fn test_cli_version() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("specforge"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_plan_builds_workspace() {
    let temp = TempDir::new().unwrap();
    let plan = write_plan(temp.path(), "plan.yaml", HELLO_PLAN);
    let workspace = temp.path().join("out");

    let output = specforge(
        &temp,
        &[
            "plan",
            plan.to_str().unwrap(),
            "--workspace",
            workspace.to_str().unwrap(),
            "--no-package",
        ],
    );

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let result: Value = serde_json::from_slice(&output.stdout).expect("JSON build result");
    assert_eq!(result["success"], true);
    assert_eq!(result["executed_steps"], serde_json::json!(["src", "main"]));
    assert!(workspace.join("src/main.py").exists());
    assert!(!temp.path().join("out.tar.gz").exists());
}

#[test]
fn test_plan_packages_by_default() {
    let temp = TempDir::new().unwrap();
    let plan = write_plan(temp.path(), "plan.yaml", HELLO_PLAN);
    let workspace = temp.path().join("site");

    let output = specforge(
        &temp,
        &["plan", plan.to_str().unwrap(), "--workspace", workspace.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(temp.path().join("site.tar.gz").exists());
}

#[test]
fn test_plan_dry_run_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let plan = write_plan(temp.path(), "plan.yaml", HELLO_PLAN);
    let workspace = temp.path().join("dry");

    let output = specforge(
        &temp,
        &[
            "plan",
            plan.to_str().unwrap(),
            "--workspace",
            workspace.to_str().unwrap(),
            "--dry-run",
        ],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(!workspace.exists());
}

#[test]
fn test_failed_plan_exits_with_build_failure_code() {
    let temp = TempDir::new().unwrap();
    let plan = write_plan(
        temp.path(),
        "broken.json",
        r#"{"name": "broken", "steps": [
            {"id": "note", "type": "WriteFile", "path": "notes.txt", "content": "x"},
            {"id": "fail", "type": "RunCommand", "command": "exit 5", "depends_on": ["note"]}
        ]}"#,
    );
    let workspace = temp.path().join("ws");

    let output = specforge(
        &temp,
        &[
            "plan",
            plan.to_str().unwrap(),
            "--workspace",
            workspace.to_str().unwrap(),
            "--keep-workspace",
            "--format",
            "yaml",
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("failed_step: fail"));
    assert!(stdout.contains("rollback_performed: true"));
    assert!(workspace.exists());
    assert!(!workspace.join("notes.txt").exists());
}

#[test]
fn test_plan_missing_file() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["plan", "/nonexistent/plan.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read plan file"));
}

#[test]
fn test_plan_rejects_unknown_dependency() {
    let temp = TempDir::new().unwrap();
    let plan = write_plan(
        temp.path(),
        "plan.json",
        r#"{"name": "x", "steps": [{"id": "a", "type": "RunCommand", "command": "true", "depends_on": ["ghost"]}]}"#,
    );

    let output = specforge(&temp, &["plan", plan.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to parse plan"));
}

#[test]
fn test_scaffold_fastapi_project() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("orders");

    let output = specforge(
        &temp,
        &[
            "scaffold",
            "fastapi",
            "orders",
            "--workspace",
            workspace.to_str().unwrap(),
            "--no-package",
        ],
    );

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let result: Value = serde_json::from_slice(&output.stdout).expect("JSON build result");
    assert_eq!(result["success"], true);
    assert!(workspace.join("app/api").is_dir());
    let requirements = fs::read_to_string(workspace.join("requirements.txt")).unwrap();
    assert!(requirements.contains("fastapi>=0.100.0"));
    assert!(fs::read_to_string(workspace.join("main.py"))
        .unwrap()
        .contains("FastAPI(title=\"orders\")"));
}

#[test]
fn test_scaffold_unknown_template() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["scaffold", "rails", "blog"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown project template"));
}

#[test]
fn test_concepts_lists_catalog() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["concepts", "--format", "json"]);

    assert!(output.status.success());
    let concepts: Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = concepts
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"controller"));
    assert!(names.contains(&"message_queue"));
}

#[test]
fn test_concepts_show_one() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["concepts", "--show", "controller"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("controller"));
    assert!(stdout.contains("Relationships:"));
}

#[test]
fn test_concepts_unknown_suggests_closest() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["concepts", "--show", "controler"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Did you mean 'controller'?"));
}

#[test]
fn test_map_directory() {
    let temp = TempDir::new().unwrap();
    let repo = temp.path().join("repo");
    fs::create_dir_all(repo.join("controllers")).unwrap();
    fs::create_dir_all(repo.join("models")).unwrap();
    fs::write(repo.join("controllers/users.py"), "def index(): pass\n").unwrap();
    fs::write(repo.join("models/user.py"), "class User: pass\n").unwrap();

    let output = specforge(&temp, &["map", repo.to_str().unwrap(), "--format", "json"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let mapping: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(mapping["mapped_components"].is_array());
    assert!(mapping["patterns"].is_array());
}

#[test]
fn test_map_nonexistent_path() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["map", "/nonexistent/path/12345"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Path does not exist"));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    let temp = TempDir::new().unwrap();
    let output = specforge(&temp, &["--verbose", "--quiet", "concepts"]);
    assert!(!output.status.success());
}
