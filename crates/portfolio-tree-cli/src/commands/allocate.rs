use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use portfolio_tree_core::hierarchy::{allocate_portfolio, AllocationInput};

use crate::input;

/// Arguments for the full hierarchical allocation pipeline
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to JSON/YAML file with `holdings`, `market_data`, optional `fx_rates` and `config`
    #[arg(long)]
    pub input: Option<String>,

    /// Total portfolio value used for allocations and share counts
    #[arg(long)]
    pub total_value: Option<Decimal>,

    /// Seed for every randomized step (VaR paths and random search)
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut alloc_input: AllocationInput = input::load(args.input.as_deref(), "portfolio allocation")?;
    if let Some(total) = args.total_value {
        alloc_input.config.total_portfolio_value = Some(total);
    }
    if let Some(seed) = args.seed {
        alloc_input.config.var.seed = Some(seed);
        alloc_input.config.solver.seed = Some(seed);
    }
    let result = allocate_portfolio(&alloc_input)?;
    Ok(serde_json::to_value(result)?)
}
