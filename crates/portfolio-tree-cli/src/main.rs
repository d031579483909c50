mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use commands::aggregate::AggregateArgs;
use commands::allocate::AllocateArgs;
use commands::optimize::OptimizeArgs;
use commands::stats::StatsArgs;

/// Hierarchical portfolio statistics, aggregation and weight optimization
#[derive(Parser)]
#[command(
    name = "ptree",
    version,
    about = "Hierarchical portfolio statistics, aggregation and weight optimization",
    long_about = "Builds a category / subcategory / security tree from a holdings list, \
                  computes per-security return and risk statistics, fills gaps in return \
                  series and optimizes weights level by level under min/max constraints."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Return and risk statistics for one security
    Stats(StatsArgs),
    /// Gap-fill and blend a set of return series
    Aggregate(AggregateArgs),
    /// Optimize one level's weights under min/max constraints
    Optimize(OptimizeArgs),
    /// Run the full hierarchical allocation pipeline
    Allocate(AllocateArgs),
    /// Print version information
    Version,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Stats(_) => "stats",
            Commands::Aggregate(_) => "aggregate",
            Commands::Optimize(_) => "optimize",
            Commands::Allocate(_) => "allocate",
            Commands::Version => "version",
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.name();
    let start = Instant::now();
    info!(command, output = ?cli.output, "running");

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Stats(args) => commands::stats::run_stats(args),
        Commands::Aggregate(args) => commands::aggregate::run_aggregate(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Version => {
            println!("ptree {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            debug!(command, elapsed_ms = start.elapsed().as_millis() as u64, "finished");
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
