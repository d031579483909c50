use clap::Args;
use serde_json::Value;

use portfolio_tree_core::aggregation::{aggregate_return_series, AggregationInput};

use crate::input;

/// Arguments for gap-filling and blending return series
#[derive(Args)]
pub struct AggregateArgs {
    /// Path to JSON/YAML file with `series` and optional `weights`
    #[arg(long)]
    pub input: Option<String>,

    /// Neighbours used to fill each gap (overrides the input)
    #[arg(long)]
    pub neighbors: Option<usize>,
}

pub fn run_aggregate(args: AggregateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut agg_input: AggregationInput = input::load(args.input.as_deref(), "return aggregation")?;
    if let Some(k) = args.neighbors {
        agg_input.n_neighbors = k;
    }
    let result = aggregate_return_series(&agg_input)?;
    Ok(serde_json::to_value(result)?)
}
