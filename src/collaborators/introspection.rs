//! Introspection collaborators that derive a component model from a target.

use super::error::CollaboratorError;
use super::traits::{ApiEndpoint, ComponentDependency, SystemAnalysis, SystemComponent, SystemIntrospector};
use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

const MAX_FILES: usize = 2000;
const MAX_SOURCE_BYTES: u64 = 256 * 1024;

/// Derives components from a directory tree.
///
/// Every directory directly under the root (or under `src/` when present)
/// becomes a component whose type is inferred from its name. Services in a
/// `docker-compose.yml` become components too, with their `depends_on`
/// edges. Route declarations found in source files form the API surface.
pub struct DirectoryIntrospector {
    max_depth: usize,
}

impl DirectoryIntrospector {
    pub fn new() -> Self {
        Self { max_depth: 6 }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    fn component_roots(root: &Path) -> Vec<PathBuf> {
        let mut roots = vec![root.to_path_buf()];
        for nested in ["src", "app", "lib"] {
            let candidate = root.join(nested);
            if candidate.is_dir() {
                roots.push(candidate);
            }
        }
        roots
    }

    fn scan(&self, root: &Path) -> Result<SystemAnalysis, CollaboratorError> {
        if !root.is_dir() {
            return Err(CollaboratorError::Failed(format!(
                "analysis target {} is not a directory",
                root.display()
            )));
        }

        let mut components: BTreeMap<PathBuf, SystemComponent> = BTreeMap::new();
        for parent in Self::component_roots(root) {
            let entries = std::fs::read_dir(&parent).map_err(|e| {
                CollaboratorError::Failed(format!("cannot read {}: {}", parent.display(), e))
            })?;
            for entry in entries.flatten() {
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !path.is_dir() || name.starts_with('.') || is_ignored_dir(name) {
                    continue;
                }
                if parent == root && ["src", "app", "lib"].contains(&name) {
                    continue;
                }
                let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                let id = rel.to_string_lossy().replace('\\', "/");
                components.insert(
                    path.clone(),
                    SystemComponent::new(id, name, infer_component_type(name))
                        .with_description(format!("directory {}", rel.display())),
                );
            }
        }

        let mut analysis = SystemAnalysis {
            target: root.display().to_string(),
            ..Default::default()
        };

        let mut technologies_by_dir: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();
        let mut files = 0usize;
        for result in WalkBuilder::new(root)
            .max_depth(Some(self.max_depth))
            .hidden(true)
            .git_ignore(true)
            .build()
        {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            files += 1;
            if files > MAX_FILES {
                debug!("File limit reached, stopping scan");
                break;
            }

            let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if let Some(tech) = manifest_technology(file_name) {
                analysis.technologies.insert(tech.to_string());
            }

            let Some(language) = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(language_for_extension)
            else {
                continue;
            };
            analysis.technologies.insert(language.to_string());

            let owner = components
                .keys()
                .filter(|dir| path.starts_with(dir))
                .max_by_key(|dir| dir.components().count())
                .cloned();
            if let Some(dir) = &owner {
                technologies_by_dir
                    .entry(dir.clone())
                    .or_default()
                    .insert(language.to_string());
            }

            if entry.metadata().map(|m| m.len() <= MAX_SOURCE_BYTES).unwrap_or(false) {
                if let Ok(source) = std::fs::read_to_string(path) {
                    let component = owner
                        .as_ref()
                        .and_then(|d| components.get(d))
                        .map(|c| c.id.clone())
                        .unwrap_or_else(|| "root".to_string());
                    analysis.api_surface.extend(extract_routes(&source, &component));
                }
            }
        }

        for (dir, techs) in technologies_by_dir {
            if let Some(component) = components.get_mut(&dir) {
                component.technologies = techs.into_iter().collect();
            }
        }

        analysis.components = components.into_values().collect();

        let compose = root.join("docker-compose.yml");
        if compose.is_file() {
            match std::fs::read_to_string(&compose) {
                Ok(raw) => merge_compose_services(&raw, &mut analysis),
                Err(e) => warn!(error = %e, "Failed to read docker-compose.yml"),
            }
        }

        info!(
            target = %analysis.target,
            components = analysis.components.len(),
            endpoints = analysis.api_surface.len(),
            "System analysis complete"
        );
        Ok(analysis)
    }
}

impl Default for DirectoryIntrospector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemIntrospector for DirectoryIntrospector {
    async fn analyze(&self, target: &str) -> Result<SystemAnalysis, CollaboratorError> {
        let root = PathBuf::from(target);
        let max_depth = self.max_depth;
        tokio::task::spawn_blocking(move || DirectoryIntrospector { max_depth }.scan(&root))
            .await
            .map_err(|e| CollaboratorError::Failed(format!("introspection task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "directory-introspector"
    }
}

/// Returns a fixed analysis regardless of target.
pub struct StaticIntrospector {
    analysis: SystemAnalysis,
}

impl StaticIntrospector {
    pub fn new(analysis: SystemAnalysis) -> Self {
        Self { analysis }
    }

    pub fn from_components(components: Vec<SystemComponent>) -> Self {
        Self::new(SystemAnalysis {
            components,
            ..Default::default()
        })
    }
}

#[async_trait]
impl SystemIntrospector for StaticIntrospector {
    async fn analyze(&self, target: &str) -> Result<SystemAnalysis, CollaboratorError> {
        let mut analysis = self.analysis.clone();
        analysis.target = target.to_string();
        Ok(analysis)
    }

    fn name(&self) -> &str {
        "static-introspector"
    }
}

fn is_ignored_dir(name: &str) -> bool {
    matches!(
        name,
        "node_modules" | "target" | "dist" | "build" | "vendor" | "__pycache__" | "venv" | "tests" | "test" | "docs"
    )
}

/// Component type guessed from a directory name.
pub fn infer_component_type(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["controller", "handler"]) {
        "controller"
    } else if has(&["model", "entity", "schema"]) {
        "model"
    } else if has(&["view", "template", "page", "ui", "component"]) {
        "view"
    } else if has(&["repositor", "dao"]) {
        "repository"
    } else if has(&["gateway"]) {
        "gateway"
    } else if has(&["api", "route", "endpoint"]) {
        "api"
    } else if has(&["service", "svc"]) {
        "service"
    } else if has(&["queue", "event", "broker", "kafka", "worker", "job"]) {
        "queue"
    } else if has(&["db", "database", "migration", "storage", "persistence"]) {
        "database"
    } else if has(&["cache", "redis"]) {
        "cache"
    } else if has(&["auth"]) {
        "authentication"
    } else if has(&["config", "settings"]) {
        "configuration"
    } else {
        "module"
    }
}

fn manifest_technology(file_name: &str) -> Option<&'static str> {
    match file_name {
        "package.json" => Some("node"),
        "Cargo.toml" => Some("rust"),
        "requirements.txt" | "pyproject.toml" | "setup.py" => Some("python"),
        "go.mod" => Some("go"),
        "pom.xml" | "build.gradle" => Some("java"),
        "Dockerfile" | "docker-compose.yml" => Some("docker"),
        _ => None,
    }
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "mjs" | "cjs" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "php" => Some("php"),
        "cs" => Some("csharp"),
        _ => None,
    }
}

fn route_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:app|router|api|bp|blueprint)\s*\.\s*(get|post|put|delete|patch)\s*\(\s*['"]([^'"]+)['"]"#)
            .expect("route pattern is valid")
    })
}

pub fn extract_routes(source: &str, component: &str) -> Vec<ApiEndpoint> {
    route_pattern()
        .captures_iter(source)
        .map(|caps| ApiEndpoint {
            component: component.to_string(),
            method: caps[1].to_uppercase(),
            path: caps[2].to_string(),
        })
        .collect()
}

fn merge_compose_services(raw: &str, analysis: &mut SystemAnalysis) {
    let document: serde_yaml::Value = match serde_yaml::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Ignoring unparsable docker-compose.yml");
            return;
        }
    };
    let Some(services) = document.get("services").and_then(|s| s.as_mapping()) else {
        return;
    };

    for (name, spec) in services {
        let Some(name) = name.as_str() else { continue };
        let image = spec.get("image").and_then(|i| i.as_str()).unwrap_or_default();
        let id = format!("service:{}", name);

        let mut component_type = infer_component_type(name);
        if component_type == "module" {
            component_type = infer_component_type(image);
        }
        if component_type == "module" {
            component_type = "service";
        }

        let mut component = SystemComponent::new(id.clone(), name, component_type)
            .with_description(format!("container service {}", name));
        if !image.is_empty() {
            component.technologies.push(image.split(':').next().unwrap_or(image).to_string());
        }
        analysis.components.push(component);

        let depends_on: Vec<String> = match spec.get("depends_on") {
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(serde_yaml::Value::Mapping(map)) => map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        for target in depends_on {
            analysis.dependencies.push(ComponentDependency {
                from: id.clone(),
                to: format!("service:{}", target),
                kind: "depends_on".to_string(),
            });
        }
    }
}
