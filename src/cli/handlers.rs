//! Subcommand implementations. Each returns the process exit code.

use super::commands::{ConceptsArgs, MapArgs, OutputFormatArg, PlanArgs, ScaffoldArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::build::{BuildEngine, BuildPlan, StructuredPlanParser};
use crate::collaborators::{DirectoryIntrospector, DocumentParser, PlanDocument, SystemIntrospector};
use crate::concepts::{ArchitecturalConcept, ConceptCatalog, ConceptualMapper, MappingOptions};
use crate::config::SpecforgeConfig;
use crate::vector::VectorStore;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const SUGGESTION_SIMILARITY: f64 = 0.8;

pub async fn handle_plan(args: &PlanArgs, config: &SpecforgeConfig) -> Result<i32> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read plan file {}", args.file.display()))?;
    let document = PlanDocument::new(content, args.file.display().to_string());
    debug!(format = ?document.format, "Plan document loaded");

    let plan = StructuredPlanParser::default()
        .parse(&document)
        .await
        .context("Failed to parse plan")?;
    info!(plan = %plan.name, steps = plan.steps.len(), "Plan parsed");

    let run = PlanRun {
        workspace: args.workspace.clone(),
        dry_run: args.dry_run,
        package: !args.no_package,
        keep_workspace: args.keep_workspace,
        format: args.format,
    };
    run_plan(&plan, &run, config).await
}

pub async fn handle_scaffold(args: &ScaffoldArgs, config: &SpecforgeConfig) -> Result<i32> {
    let plan = args.template.plan(&args.name, args.install);
    info!(
        template = args.template.key(),
        project = %args.name,
        steps = plan.steps.len(),
        "Scaffold plan ready"
    );

    let run = PlanRun {
        workspace: args.workspace.clone(),
        dry_run: args.dry_run,
        package: !args.no_package,
        keep_workspace: false,
        format: args.format,
    };
    run_plan(&plan, &run, config).await
}

struct PlanRun {
    workspace: Option<PathBuf>,
    dry_run: bool,
    package: bool,
    keep_workspace: bool,
    format: OutputFormatArg,
}

/// Executes `plan` and prints the result; exit code 2 on build failure.
async fn run_plan(plan: &BuildPlan, run: &PlanRun, config: &SpecforgeConfig) -> Result<i32> {
    let workspace = match &run.workspace {
        Some(dir) => dir.clone(),
        None => config.workspace_root.join(Uuid::new_v4().to_string()),
    };

    let mut options = config.build_options();
    options.dry_run = run.dry_run;
    options.package_artifact = run.package;
    options.keep_workspace_on_failure = run.keep_workspace;

    let result = BuildEngine::new().build(plan, &workspace, &options).await;
    let formatter = OutputFormatter::new(run.format.into());
    println!("{}", formatter.format_build_result(&result)?);

    Ok(if result.success { 0 } else { 2 })
}

/// Closest catalog name to `name`, if any is close enough.
pub fn suggest_concept<'a>(catalog: &'a ConceptCatalog, name: &str) -> Option<&'a str> {
    let needle = name.to_lowercase();
    catalog
        .iter()
        .map(|c| (c.name.as_str(), strsim::jaro_winkler(&needle, &c.name)))
        .filter(|(_, score)| *score >= SUGGESTION_SIMILARITY)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name)
}

pub fn handle_concepts(args: &ConceptsArgs) -> Result<i32> {
    let catalog = ConceptCatalog::builtin();
    let formatter = OutputFormatter::new(args.format.into());

    if let Some(name) = &args.show {
        return match catalog.get(&name.to_lowercase()) {
            Some(concept) => {
                println!("{}", formatter.format_concept(concept)?);
                Ok(0)
            }
            None => {
                match suggest_concept(&catalog, name) {
                    Some(hint) => eprintln!("Unknown concept '{}'. Did you mean '{}'?", name, hint),
                    None => eprintln!("Unknown concept '{}'", name),
                }
                Ok(1)
            }
        };
    }

    let concepts: Vec<&ArchitecturalConcept> = match args.category {
        Some(category) => catalog.by_category(category.into()),
        None => catalog.iter().collect(),
    };
    println!("{}", formatter.format_concepts(&concepts)?);
    Ok(0)
}

pub async fn handle_map(args: &MapArgs, config: &SpecforgeConfig) -> Result<i32> {
    let path = match &args.path {
        Some(path) => path.clone(),
        None => env::current_dir().context("Failed to get current directory")?,
    };
    let path = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;

    let analysis = DirectoryIntrospector::new()
        .analyze(&path.to_string_lossy())
        .await
        .context("Failed to analyze directory")?;
    info!(components = analysis.components.len(), "Directory analyzed");

    let store = Arc::new(VectorStore::in_memory(config.embedding_dim)?);
    let mapper = ConceptualMapper::new(store, config.create_embedder()?);
    let options = MappingOptions::default().with_confidence_threshold(args.threshold);
    let mapping = mapper.map_components(&analysis.components, &options).await?;

    let formatter = OutputFormatter::new(args.format.into());
    if formatter_is_human(args.format.into()) {
        println!("Target: {}", path.display());
    }
    println!("{}", formatter.format_mapping(&mapping)?);
    Ok(0)
}

fn formatter_is_human(format: OutputFormat) -> bool {
    format == OutputFormat::Human
}
