use clap::Args;
use serde_json::Value;

use portfolio_tree_core::security::{compute_security_statistics, StatisticsInput};

use crate::input;

/// Arguments for single-security statistics
#[derive(Args)]
pub struct StatsArgs {
    /// Path to JSON/YAML file with `ticker`, `market_data` and optional `settings`
    #[arg(long)]
    pub input: Option<String>,

    /// Seed for the Monte Carlo VaR paths
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut stats_input: StatisticsInput = input::load(args.input.as_deref(), "security statistics")?;
    if let Some(seed) = args.seed {
        let mut settings = stats_input.settings.unwrap_or_else(|| {
            portfolio_tree_core::PipelineConfig::default().statistics_settings()
        });
        settings.var.seed = Some(seed);
        stats_input.settings = Some(settings);
    }
    let result = compute_security_statistics(&stats_input)?;
    Ok(serde_json::to_value(result)?)
}
