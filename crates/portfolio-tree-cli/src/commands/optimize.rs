use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use portfolio_tree_core::config::SolverSettings;
use portfolio_tree_core::optimization::{optimize_weights, OptimizationRequest};

use crate::input;

/// Arguments for one level of constrained weight optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to JSON/YAML optimization request
    #[arg(long)]
    pub input: Option<String>,

    /// Seed for the random-search objectives
    #[arg(long)]
    pub seed: Option<u64>,

    /// Random portfolios drawn by the search objectives
    #[arg(long)]
    pub num_portfolios: Option<u32>,
}

#[derive(Deserialize)]
struct OptimizeInput {
    #[serde(flatten)]
    request: OptimizationRequest,
    #[serde(default)]
    solver: SolverSettings,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let OptimizeInput {
        request,
        mut solver,
    } = input::load(args.input.as_deref(), "weight optimization")?;
    if let Some(seed) = args.seed {
        solver.seed = Some(seed);
    }
    if let Some(n) = args.num_portfolios {
        solver.num_portfolios = n;
    }
    let result = optimize_weights(&request, &solver)?;
    Ok(serde_json::to_value(result)?)
}
