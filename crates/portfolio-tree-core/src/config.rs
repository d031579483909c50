use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PortfolioTreeError;
use crate::market_data::{QualityThresholds, RetryPolicy};
use crate::optimization::{ConstraintSet, ConstraintSpec, Objective};
use crate::types::{Money, Rate};
use crate::PortfolioTreeResult;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Where a security's weight inside its subcategory comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAssetWeightPolicy {
    /// `(1/σᵢ) / Σ(1/σⱼ)` over the securities of the subcategory.
    #[default]
    InverseVolatility,
    /// The risk weight supplied with each imported holding record.
    Imported,
}

/// Which dividend yield is added to the daily return series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendPolicy {
    #[default]
    Current,
    Average,
}

/// Monte Carlo value-at-risk settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VarSettings {
    pub simulations: u32,
    pub confidence: Decimal,
    pub seed: Option<u64>,
}

impl Default for VarSettings {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            confidence: dec!(0.95),
            seed: None,
        }
    }
}

/// Settings for the optimizer's iterative and random-search solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Random portfolios drawn for the search-based objectives.
    pub num_portfolios: u32,
    /// Projected gradient iterations for the Sharpe objective.
    pub max_iterations: u32,
    pub seed: Option<u64>,
    /// Minimum acceptable return for the Sortino search.
    pub target_return: Rate,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            num_portfolios: 10_000,
            max_iterations: 2_000,
            seed: None,
            target_return: Decimal::ZERO,
        }
    }
}

/// Everything a security needs to compute its statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsSettings {
    pub risk_free_rate: Option<Rate>,
    pub dividend_policy: DividendPolicy,
    pub var: VarSettings,
}

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resolved once before the pipeline runs; `None` leaves the
    /// rate-dependent statistics unavailable.
    pub risk_free_rate: Option<Rate>,
    pub weight_policy: SubAssetWeightPolicy,
    pub dividend_policy: DividendPolicy,
    pub knn_neighbors: usize,
    pub weight_tolerance: Decimal,
    pub rounding_dp: u32,
    pub sub_category_objective: Objective,
    pub category_objective: Objective,
    pub var: VarSettings,
    pub solver: SolverSettings,
    pub retry: RetryPolicy,
    pub price_quality: Option<QualityThresholds>,
    pub total_portfolio_value: Option<Money>,
    pub constraints: ConstraintSet,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: Some(dec!(0.02)),
            weight_policy: SubAssetWeightPolicy::default(),
            dividend_policy: DividendPolicy::default(),
            knn_neighbors: 5,
            weight_tolerance: dec!(0.01),
            rounding_dp: 5,
            sub_category_objective: Objective::MaxSharpe,
            category_objective: Objective::MaxSharpe,
            var: VarSettings::default(),
            solver: SolverSettings::default(),
            retry: RetryPolicy::default(),
            price_quality: None,
            total_portfolio_value: None,
            constraints: default_constraints(),
        }
    }
}

/// Allocation guard rails applied when no constraints are configured.
pub fn default_constraints() -> ConstraintSet {
    let category = BTreeMap::from([
        ("Equity_min".to_string(), dec!(0.3)),
        ("Bond_min".to_string(), dec!(0.1)),
        ("Alternative_max".to_string(), dec!(0.2)),
    ]);
    let sub_category = BTreeMap::from([
        (
            "Equity".to_string(),
            ConstraintSpec::Legacy(BTreeMap::from([(
                "Traditional Equity_min".to_string(),
                dec!(0.6),
            )])),
        ),
        (
            "Alternative".to_string(),
            ConstraintSpec::Legacy(BTreeMap::from([("Metal_min".to_string(), dec!(0.3))])),
        ),
    ]);
    ConstraintSet {
        category: ConstraintSpec::Legacy(category),
        sub_category,
    }
}

impl PipelineConfig {
    pub fn statistics_settings(&self) -> StatisticsSettings {
        StatisticsSettings {
            risk_free_rate: self.risk_free_rate,
            dividend_policy: self.dividend_policy,
            var: self.var,
        }
    }

    pub fn validate(&self) -> PortfolioTreeResult<()> {
        if self.knn_neighbors == 0 {
            return Err(PortfolioTreeError::InvalidInput {
                field: "knn_neighbors".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.weight_tolerance < Decimal::ZERO || self.weight_tolerance >= Decimal::ONE {
            return Err(PortfolioTreeError::InvalidInput {
                field: "weight_tolerance".into(),
                reason: "must be within [0, 1)".into(),
            });
        }
        if self.var.confidence <= Decimal::ZERO || self.var.confidence >= Decimal::ONE {
            return Err(PortfolioTreeError::InvalidInput {
                field: "var.confidence".into(),
                reason: "must be within (0, 1)".into(),
            });
        }
        if self.var.simulations == 0 || self.solver.num_portfolios == 0 {
            return Err(PortfolioTreeError::InvalidInput {
                field: "simulations".into(),
                reason: "simulation and portfolio counts must be positive".into(),
            });
        }
        if let Some(total) = self.total_portfolio_value {
            if total <= Decimal::ZERO {
                return Err(PortfolioTreeError::InvalidInput {
                    field: "total_portfolio_value".into(),
                    reason: "must be positive".into(),
                });
            }
        }
        self.constraints.category_constraints()?;
        for category in self.constraints.sub_category.keys() {
            self.constraints.sub_category_constraints(category)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk_free_rate, Some(dec!(0.02)));
        assert_eq!(config.knn_neighbors, 5);
        assert_eq!(config.constraints.category_constraints().unwrap().len(), 3);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"weight_policy": "imported", "constraints": {"category": {"Equity_min": "0.6"}}}"#,
        )
        .unwrap();
        assert_eq!(config.weight_policy, SubAssetWeightPolicy::Imported);
        assert_eq!(config.var.simulations, 10_000);
        assert!(config.constraints.sub_category.is_empty());
        let category = config.constraints.category_constraints().unwrap();
        assert_eq!(category.len(), 1);
        assert_eq!(category[0].entity, "Equity");
    }

    #[test]
    fn test_bad_constraint_key_fails_validation() {
        let mut config = PipelineConfig::default();
        config.constraints.category =
            ConstraintSpec::Legacy(BTreeMap::from([("Equity_floor".to_string(), dec!(0.1))]));
        assert!(config.validate().is_err());
    }
}
