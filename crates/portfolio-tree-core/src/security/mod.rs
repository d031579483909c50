pub mod entity;
pub mod statistics;
pub mod var;

pub use entity::Security;
pub use statistics::{SecurityStatistics, UnavailableStatistic};
pub use var::monte_carlo_var;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::{PipelineConfig, StatisticsSettings};
use crate::market_data::SecurityData;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::PortfolioTreeResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsInput {
    pub ticker: String,
    pub market_data: SecurityData,
    /// Defaults to the pipeline defaults (risk-free rate 0.02, current
    /// dividend yield, 10,000 VaR paths).
    #[serde(default)]
    pub settings: Option<StatisticsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsOutput {
    pub ticker: String,
    pub last_price: Option<Money>,
    pub observations: usize,
    #[serde(flatten)]
    pub statistics: SecurityStatistics,
}

/// Compute the statistics bundle for one security's market data.
pub fn compute_security_statistics(
    input: &StatisticsInput,
) -> PortfolioTreeResult<ComputationOutput<StatisticsOutput>> {
    let start = Instant::now();
    let settings = input
        .settings
        .unwrap_or_else(|| PipelineConfig::default().statistics_settings());
    let security = Security::new(&input.ticker, "", "")
        .with_settings(settings)
        .with_market_data(input.market_data.clone());

    let statistics = security.statistics().clone();
    let warnings = statistics
        .unavailable
        .iter()
        .map(|u| format!("{} unavailable: {}", u.statistic, u.reason))
        .collect();
    let output = StatisticsOutput {
        ticker: input.ticker.clone(),
        last_price: security.last_price(),
        observations: security.historical_data().map_or(0, |h| h.len()),
        statistics,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Business-day PCHIP resampling, yearly CAGR and volatility, Monte Carlo VaR",
        &serde_json::json!({
            "risk_free_rate": settings.risk_free_rate.map(|r| r.to_string()),
            "dividend_policy": settings.dividend_policy,
            "var_simulations": settings.var.simulations,
            "var_confidence": settings.var.confidence.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
