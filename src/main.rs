use specforge::cli::commands::{CliArgs, Commands};
use specforge::cli::handlers::{handle_concepts, handle_map, handle_plan, handle_scaffold};
use specforge::util::logging::{init_logging, parse_level, LoggingConfig};
use specforge::{SpecforgeConfig, VERSION};

use anyhow::Result;
use clap::Parser;
use std::env;
use tracing::{debug, error, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("specforge v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match run(&args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run(args: &CliArgs) -> Result<i32> {
    let config = SpecforgeConfig::from_env()?;
    match &args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args, &config).await,
        Commands::Concepts(concepts_args) => handle_concepts(concepts_args),
        Commands::Map(map_args) => handle_map(map_args, &config).await,
        Commands::Scaffold(scaffold_args) => handle_scaffold(scaffold_args, &config).await,
    }
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("SPECFORGE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
        parse_level(&level_str)
    };
    init_logging(LoggingConfig::with_level(level));
}
