use crate::build::ProjectTemplate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Build systems from plans and map systems onto architectural concepts
#[derive(Parser, Debug)]
#[command(
    name = "specforge",
    about = "Build systems from plans and map systems onto architectural concepts",
    version,
    author,
    long_about = "specforge executes structured build plans with rollback on failure and \
                  maps existing codebases onto a catalog of architectural concepts."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Execute a build plan document",
        long_about = "Parses a JSON or YAML build plan (optionally fenced in markdown) and \
                      executes it step by step in a workspace directory.\n\n\
                      Examples:\n  \
                      specforge plan plan.yaml\n  \
                      specforge plan plan.json --workspace ./out --dry-run"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Show the architectural concept catalog",
        long_about = "Lists the built-in concepts, optionally filtered by category, or shows \
                      a single concept with its relationships.\n\n\
                      Examples:\n  \
                      specforge concepts\n  \
                      specforge concepts --category data-pattern\n  \
                      specforge concepts --show controller"
    )]
    Concepts(ConceptsArgs),

    #[command(
        about = "Map a source tree onto architectural concepts",
        long_about = "Analyzes a directory, maps its components onto the concept catalog \
                      and reports recognized architectural patterns.\n\n\
                      Examples:\n  \
                      specforge map ./my-service\n  \
                      specforge map . --threshold 0.4 --format json"
    )]
    Map(MapArgs),

    #[command(
        about = "Scaffold a project from a framework template",
        long_about = "Expands a framework template (python, fastapi, django, react, nextjs) \
                      into a build plan and executes it.\n\n\
                      Examples:\n  \
                      specforge scaffold fastapi orders --workspace ./orders\n  \
                      specforge scaffold next.js site --install"
    )]
    Scaffold(ScaffoldArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "FILE", help = "Plan document (JSON or YAML)")]
    pub file: PathBuf,

    #[arg(
        short = 'w',
        long,
        value_name = "DIR",
        help = "Workspace directory (defaults to a new directory under the workspace root)"
    )]
    pub workspace: Option<PathBuf>,

    #[arg(long, help = "Validate and walk the plan without touching the filesystem")]
    pub dry_run: bool,

    #[arg(long, help = "Skip packaging the workspace into an archive")]
    pub no_package: bool,

    #[arg(long, help = "Keep the workspace when the build fails")]
    pub keep_workspace: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConceptsArgs {
    #[arg(long, value_enum, help = "Only list concepts of this category")]
    pub category: Option<CategoryArg>,

    #[arg(long, value_name = "NAME", help = "Show one concept in detail")]
    pub show: Option<String>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct MapArgs {
    #[arg(value_name = "PATH", help = "Directory to analyze (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "SCORE",
        default_value = "0.5",
        help = "Minimum similarity for a component to map onto a concept"
    )]
    pub threshold: f32,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ScaffoldArgs {
    #[arg(value_name = "TEMPLATE", help = "Framework template name")]
    pub template: ProjectTemplate,

    #[arg(value_name = "NAME", help = "Project name")]
    pub name: String,

    #[arg(
        short = 'w',
        long,
        value_name = "DIR",
        help = "Workspace directory (defaults to a new directory under the workspace root)"
    )]
    pub workspace: Option<PathBuf>,

    #[arg(long, help = "Install the template's runtime dependencies")]
    pub install: bool,

    #[arg(long, help = "Walk the plan without touching the filesystem")]
    pub dry_run: bool,

    #[arg(long, help = "Skip packaging the workspace into an archive")]
    pub no_package: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryArg {
    ArchitecturalPattern,
    DesignPattern,
    ComponentType,
    DataPattern,
    IntegrationPattern,
    PerformancePattern,
}

impl From<CategoryArg> for crate::concepts::ConceptCategory {
    fn from(arg: CategoryArg) -> Self {
        use crate::concepts::ConceptCategory;
        match arg {
            CategoryArg::ArchitecturalPattern => ConceptCategory::ArchitecturalPattern,
            CategoryArg::DesignPattern => ConceptCategory::DesignPattern,
            CategoryArg::ComponentType => ConceptCategory::ComponentType,
            CategoryArg::DataPattern => ConceptCategory::DataPattern,
            CategoryArg::IntegrationPattern => ConceptCategory::IntegrationPattern,
            CategoryArg::PerformancePattern => ConceptCategory::PerformancePattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_plan_args() {
        let args = CliArgs::parse_from(["specforge", "plan", "plan.yaml", "--dry-run"]);
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.file, PathBuf::from("plan.yaml"));
                assert!(plan.dry_run);
                assert!(plan.workspace.is_none());
                assert_eq!(plan.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_concepts_args() {
        let args = CliArgs::parse_from([
            "specforge",
            "concepts",
            "--category",
            "data-pattern",
            "-f",
            "yaml",
        ]);
        match args.command {
            Commands::Concepts(c) => {
                assert_eq!(c.category, Some(CategoryArg::DataPattern));
                assert_eq!(c.format, OutputFormatArg::Yaml);
            }
            _ => panic!("Expected Concepts command"),
        }
    }

    #[test]
    fn test_map_defaults() {
        let args = CliArgs::parse_from(["specforge", "map"]);
        match args.command {
            Commands::Map(m) => {
                assert!(m.path.is_none());
                assert!((m.threshold - 0.5).abs() < f32::EPSILON);
            }
            _ => panic!("Expected Map command"),
        }
    }

    #[test]
    fn test_scaffold_args() {
        let args = CliArgs::parse_from(["specforge", "scaffold", "Next.js", "site", "--install"]);
        match args.command {
            Commands::Scaffold(s) => {
                assert_eq!(s.template, ProjectTemplate::NextJs);
                assert_eq!(s.name, "site");
                assert!(s.install);
                assert!(!s.dry_run);
            }
            _ => panic!("Expected Scaffold command"),
        }
        assert!(CliArgs::try_parse_from(["specforge", "scaffold", "rails", "x"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(CliArgs::try_parse_from(["specforge", "-q", "-v", "concepts"]).is_err());
    }
}
