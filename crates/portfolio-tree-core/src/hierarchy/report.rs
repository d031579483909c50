use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::portfolio::PipelineStage;
use crate::security::{Security, UnavailableStatistic};
use crate::time_series::TimeSeries;
use crate::types::{Money, Rate, Weight};

/// One row of the per-security export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub ticker: String,
    pub name: Option<String>,
    pub category: String,
    pub sub_category: String,
    pub exchange: Option<String>,
    pub traded_currency: Option<String>,
    pub fund_category: Option<String>,
    pub expense_ratio: Option<Rate>,
    pub dividend_yield: Option<Rate>,
    pub avg_dividend_yield: Option<Rate>,
    pub geometric_mean_5y: Option<Rate>,
    pub adjusted_geometric_mean_5y: Option<Rate>,
    pub standard_deviation_5y: Option<Decimal>,
    pub downside_deviation_5y: Option<Decimal>,
    pub var_95: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub last_price: Option<Money>,
    pub risk_weight: Option<Weight>,
    pub portfolio_asset_weight: Option<Weight>,
    pub allocation: Option<Money>,
    pub number_of_shares: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<UnavailableStatistic>,
}

impl SecurityReport {
    pub fn from_security(security: &Security, total_value: Option<Money>) -> Self {
        let stats = security.statistics();
        let profile = security.profile();
        Self {
            ticker: security.ticker().to_string(),
            name: profile.and_then(|p| p.name.clone()),
            category: security.category().to_string(),
            sub_category: security.sub_category().to_string(),
            exchange: profile.and_then(|p| p.exchange_name.clone()),
            traded_currency: security.traded_currency().map(|c| c.code().to_string()),
            fund_category: profile.and_then(|p| p.fund_category.clone()),
            expense_ratio: security.expense_ratio(),
            dividend_yield: security.dividend_yield(),
            avg_dividend_yield: stats.avg_dividend_yield,
            geometric_mean_5y: stats.geometric_mean_5y,
            adjusted_geometric_mean_5y: stats.adjusted_geometric_mean_5y,
            standard_deviation_5y: stats.standard_deviation_5y,
            downside_deviation_5y: stats.downside_deviation_5y,
            var_95: stats.var_95,
            sharpe_ratio: stats.sharpe_ratio,
            last_price: security.last_price(),
            risk_weight: security.sub_asset_weight(),
            portfolio_asset_weight: security.portfolio_asset_weight(),
            allocation: total_value.and_then(|t| security.allocation(t)),
            number_of_shares: total_value.and_then(|t| security.number_of_shares(t)),
            unavailable: stats.unavailable.clone(),
        }
    }
}

/// Weight and blended return series of a subcategory or category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub weight: Option<Weight>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returns: Option<TimeSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReport {
    pub stage: PipelineStage,
    pub risk_free_rate: Option<Rate>,
    pub total_value: Option<Money>,
    pub total_weight: Weight,
    pub securities: Vec<SecurityReport>,
    pub sub_categories: Vec<LevelReport>,
    pub categories: Vec<LevelReport>,
}

impl PortfolioReport {
    pub fn security(&self, ticker: &str) -> Option<&SecurityReport> {
        self.securities.iter().find(|s| s.ticker == ticker)
    }

    pub fn category(&self, name: &str) -> Option<&LevelReport> {
        self.categories.iter().find(|c| c.name == name)
    }
}
