//! Static checks applied to a parsed plan before it reaches the engine.

use super::step::BuildPlan;
use std::collections::HashSet;
use std::path::{Component, Path};

pub trait PlanRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, plan: &BuildPlan) -> Result<(), String>;
}

pub struct NonEmptyStepsRule;

impl PlanRule for NonEmptyStepsRule {
    fn name(&self) -> &'static str {
        "NonEmptySteps"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), String> {
        if plan.steps.is_empty() {
            return Err("Plan has no steps".to_string());
        }
        if let Some(step) = plan.steps.iter().find(|s| s.id.trim().is_empty()) {
            return Err(format!("Step '{}' has an empty id", step.description));
        }
        Ok(())
    }
}

pub struct UniqueStepIdsRule;

impl PlanRule for UniqueStepIdsRule {
    fn name(&self) -> &'static str {
        "UniqueStepIds"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), String> {
        let mut seen = HashSet::new();
        for step in &plan.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(format!("Duplicate step id '{}'", step.id));
            }
        }
        Ok(())
    }
}

/// Dependencies must name a step of the plan other than the step itself.
/// Ordering is left to the engine.
pub struct KnownDependenciesRule;

impl PlanRule for KnownDependenciesRule {
    fn name(&self) -> &'static str {
        "KnownDependencies"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), String> {
        let ids: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        for step in &plan.steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(format!("Step '{}' depends on itself", step.id));
                }
                if !ids.contains(dep.as_str()) {
                    return Err(format!("Step '{}' depends on unknown step '{}'", step.id, dep));
                }
            }
        }
        Ok(())
    }
}

pub struct RelativePathsRule;

impl PlanRule for RelativePathsRule {
    fn name(&self) -> &'static str {
        "RelativePaths"
    }

    fn validate(&self, plan: &BuildPlan) -> Result<(), String> {
        for step in &plan.steps {
            for path in step.action.paths() {
                let escapes = Path::new(path)
                    .components()
                    .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                if path.is_empty() || escapes {
                    return Err(format!("Step '{}' uses path '{}' outside the workspace", step.id, path));
                }
            }
        }
        Ok(())
    }
}

pub struct PlanValidator {
    rules: Vec<Box<dyn PlanRule>>,
}

impl PlanValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn PlanRule>>) -> Self {
        Self { rules }
    }

    /// First failing rule wins, reported as `[RuleName] message`.
    pub fn validate(&self, plan: &BuildPlan) -> Result<(), String> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(plan) {
                return Err(format!("[{}] {}", rule.name(), e));
            }
        }
        Ok(())
    }
}

impl Default for PlanValidator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(NonEmptyStepsRule),
                Box::new(UniqueStepIdsRule),
                Box::new(KnownDependenciesRule),
                Box::new(RelativePathsRule),
            ],
        }
    }
}
