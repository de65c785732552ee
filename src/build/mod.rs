//! Build Execution Engine: plan model, parsing, step execution, rollback
//! and packaging.

mod artifact;
mod engine;
mod error;
mod executor;
mod lint;
mod plan;
mod rollback;
mod step;
mod template;

pub use artifact::{artifact_path, package_workspace};
pub use engine::{BuildEngine, BuildFailure, BuildLogEntry, BuildMetrics, BuildOptions, BuildResult};
pub use error::BuildError;
pub use executor::{install_command, CommandOutput, StepExecutor};
pub use lint::{PlanRule, PlanValidator};
pub use plan::{PlanParseError, StructuredPlanParser};
pub use rollback::{RollbackAction, RollbackReport, RollbackStack};
pub use step::{
    BuildPlan, BuildStep, FileEdit, StepAction, StepCondition, StepType, ValidationCheck,
    ValidationRule,
};
pub use template::ProjectTemplate;
