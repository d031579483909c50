pub mod category;
pub mod import;
pub mod level;
pub mod portfolio;
pub mod report;
pub mod sub_category;

pub use category::Category;
pub use import::{FailedFetch, HoldingRecord, ImportSummary};
pub use level::LevelSettings;
pub use portfolio::{PipelineStage, Portfolio};
pub use report::{LevelReport, PortfolioReport, SecurityReport};
pub use sub_category::SubCategory;

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::market_data::{CurrencyConverter, FixedRates, InMemoryMarketData};
use crate::types::{with_metadata, ComputationOutput};
use crate::PortfolioTreeResult;

/// Self-contained allocation request: holdings, their market data and the
/// pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationInput {
    pub holdings: Vec<HoldingRecord>,
    pub market_data: InMemoryMarketData,
    /// Exchange rates into the base currency; no conversion when omitted.
    #[serde(default)]
    pub fx_rates: Option<FixedRates>,
    #[serde(default)]
    pub config: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub import: ImportSummary,
    pub report: PortfolioReport,
}

/// Build the tree from `input.holdings` and run the full weighting pipeline.
pub fn allocate_portfolio(
    input: &AllocationInput,
) -> PortfolioTreeResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    let mut portfolio = Portfolio::new(input.config.clone())?;
    let converter = input.fx_rates.as_ref().map(|r| r as &dyn CurrencyConverter);
    let import = portfolio.add_holdings(&input.holdings, &input.market_data, converter)?;
    let report = portfolio.run()?;

    let mut warnings: Vec<String> = import
        .failed
        .iter()
        .map(|f| format!("No market data for {}: {}", f.ticker, f.reason))
        .collect();
    for s in &report.securities {
        if let Some(w) = s.portfolio_asset_weight {
            if w > dec!(0.40) {
                warnings.push(format!(
                    "Concentrated position: {} holds {:.4} of the portfolio",
                    s.ticker, w
                ));
            }
        }
        for u in &s.unavailable {
            warnings.push(format!("{}: {} unavailable ({})", s.ticker, u.statistic, u.reason));
        }
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Hierarchical allocation: inverse-volatility or imported security weights, \
         constrained optimization of subcategory and category weights",
        &serde_json::json!({
            "weight_policy": input.config.weight_policy,
            "sub_category_objective": input.config.sub_category_objective,
            "category_objective": input.config.category_objective,
            "risk_free_rate": input.config.risk_free_rate.map(|r| r.to_string()),
            "knn_neighbors": input.config.knn_neighbors,
            "weight_tolerance": input.config.weight_tolerance.to_string(),
        }),
        warnings,
        elapsed,
        AllocationOutput { import, report },
    ))
}
