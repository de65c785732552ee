pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, ConceptsArgs, MapArgs, PlanArgs, ScaffoldArgs};
pub use handlers::{handle_concepts, handle_map, handle_plan, handle_scaffold, suggest_concept};
pub use output::{OutputFormat, OutputFormatter};
