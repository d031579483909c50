use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use super::category::Category;
use super::import::{load_holding, HoldingRecord, ImportSummary};
use super::level::{optimize_level, LevelSettings};
use super::report::{LevelReport, PortfolioReport, SecurityReport};
use crate::config::PipelineConfig;
use crate::error::{MissingInputReason, PortfolioTreeError};
use crate::market_data::{
    resolve_risk_free_rate, CurrencyConverter, MarketDataProvider, RiskFreeRateSource,
};
use crate::optimization::{ConstrainedOptimizer, Objective, WeightOptimizer};
use crate::security::Security;
use crate::types::{Rate, Weight};
use crate::PortfolioTreeResult;

/// How far the pipeline has progressed. Every mutation of the tree drops
/// back to `TreeBuilt`, clearing the weights computed after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Unpopulated,
    TreeBuilt,
    SubCategoryOptimized,
    CategoryOptimized,
    WeightsFinalized,
}

/// Root of the tree: categories, their subcategories, and the securities.
#[derive(Debug, Clone)]
pub struct Portfolio {
    config: PipelineConfig,
    categories: Vec<Category>,
    stage: PipelineStage,
}

impl Portfolio {
    pub fn new(config: PipelineConfig) -> PortfolioTreeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            categories: Vec::new(),
            stage: PipelineStage::Unpopulated,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name() == name)
    }

    pub fn securities(&self) -> impl Iterator<Item = &Security> + '_ {
        self.categories.iter().flat_map(|c| c.securities())
    }

    pub fn security(&self, ticker: &str) -> Option<&Security> {
        self.securities().find(|s| s.ticker() == ticker)
    }

    pub fn risk_free_rate(&self) -> Option<Rate> {
        self.config.risk_free_rate
    }

    // -- tree maintenance ---------------------------------------------------

    fn find_or_create_category(&mut self, name: &str) -> &mut Category {
        let idx = match self.categories.iter().position(|c| c.name() == name) {
            Some(idx) => idx,
            None => {
                self.categories.push(Category::new(name));
                self.categories.len() - 1
            }
        };
        &mut self.categories[idx]
    }

    /// Place `security` under its category and subcategory, creating them
    /// as needed. Tickers are unique across the whole tree.
    pub fn add_security(&mut self, mut security: Security) -> PortfolioTreeResult<()> {
        if self.security(security.ticker()).is_some() {
            return Err(PortfolioTreeError::InvalidInput {
                field: "ticker".into(),
                reason: format!("'{}' is already in the portfolio", security.ticker()),
            });
        }
        security.apply_settings(self.config.statistics_settings());
        let category = security.category().to_string();
        let sub_category = security.sub_category().to_string();
        self.find_or_create_category(&category)
            .find_or_create_sub_category(&sub_category)
            .add_security(security)?;
        self.reset_weights();
        Ok(())
    }

    /// Fetch and add every record not already held. Fetch failures do not
    /// abort the import; they are listed in the summary.
    pub fn add_holdings(
        &mut self,
        records: &[HoldingRecord],
        provider: &dyn MarketDataProvider,
        converter: Option<&dyn CurrencyConverter>,
    ) -> PortfolioTreeResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        self.add_records(records, provider, converter, &mut summary)?;
        Ok(summary)
    }

    fn add_records(
        &mut self,
        records: &[HoldingRecord],
        provider: &dyn MarketDataProvider,
        converter: Option<&dyn CurrencyConverter>,
        summary: &mut ImportSummary,
    ) -> PortfolioTreeResult<()> {
        for record in records {
            if self.security(&record.ticker).is_some() {
                summary.unchanged.push(record.ticker.clone());
                continue;
            }
            let security = load_holding(record, provider, converter, &self.config, summary)?;
            self.add_security(security)?;
            summary.added.push(record.ticker.clone());
        }
        info!(
            added = summary.added.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failed.len(),
            "imported holdings"
        );
        Ok(())
    }

    /// Remove the given tickers, pruning subcategories and categories left
    /// empty. Unknown tickers are ignored.
    pub fn remove_securities<S: AsRef<str>>(&mut self, tickers: &[S]) -> Vec<Security> {
        let mut removed = Vec::new();
        for ticker in tickers {
            let ticker = ticker.as_ref();
            let Some(idx) = self
                .categories
                .iter()
                .position(|c| c.securities().any(|s| s.ticker() == ticker))
            else {
                warn!(ticker, "cannot remove a security that is not held");
                continue;
            };
            if let Some(security) = self.categories[idx].remove_security(ticker) {
                removed.push(security);
            }
            if self.categories[idx].is_empty() {
                let category = self.categories.remove(idx);
                info!(category = category.name(), "removed empty category");
            }
        }
        if !removed.is_empty() {
            self.reset_weights();
        }
        removed
    }

    /// Make the tree hold exactly `records`: drop securities that are no
    /// longer listed, then add the new ones.
    pub fn sync_holdings(
        &mut self,
        records: &[HoldingRecord],
        provider: &dyn MarketDataProvider,
        converter: Option<&dyn CurrencyConverter>,
    ) -> PortfolioTreeResult<ImportSummary> {
        let wanted: HashSet<&str> = records.iter().map(|r| r.ticker.as_str()).collect();
        let stale: Vec<String> = self
            .securities()
            .filter(|s| !wanted.contains(s.ticker()))
            .map(|s| s.ticker().to_string())
            .collect();

        let mut summary = ImportSummary::default();
        for security in self.remove_securities(&stale) {
            summary.removed.push(security.ticker().to_string());
        }
        self.add_records(records, provider, converter, &mut summary)?;
        Ok(summary)
    }

    /// Resolve the risk-free rate once, from configuration or `source`,
    /// and hand it to every security.
    pub fn resolve_risk_free_rate(
        &mut self,
        source: Option<&dyn RiskFreeRateSource>,
    ) -> Option<Rate> {
        let rate = resolve_risk_free_rate(self.config.risk_free_rate, source, &self.config.retry);
        if rate != self.config.risk_free_rate {
            self.config.risk_free_rate = rate;
            let settings = self.config.statistics_settings();
            for category in self.categories.iter_mut() {
                for security in category.securities_mut() {
                    security.apply_settings(settings);
                }
            }
            self.reset_weights();
        }
        rate
    }

    fn reset_weights(&mut self) {
        for category in self.categories.iter_mut() {
            category.clear_weights();
        }
        self.stage = if self.categories.is_empty() {
            PipelineStage::Unpopulated
        } else {
            PipelineStage::TreeBuilt
        };
    }

    // -- pipeline -----------------------------------------------------------

    fn require_stage(&self, required: PipelineStage, operation: &str) -> PortfolioTreeResult<()> {
        if self.stage < required {
            return Err(PortfolioTreeError::InvalidInput {
                field: "stage".into(),
                reason: format!(
                    "{operation} requires stage {required:?}, portfolio is at {:?}",
                    self.stage
                ),
            });
        }
        Ok(())
    }

    fn level_settings<'a>(
        &self,
        optimizer: &'a dyn WeightOptimizer,
        objective: Objective,
    ) -> PortfolioTreeResult<LevelSettings<'a>> {
        let risk_free_rate =
            self.config
                .risk_free_rate
                .ok_or_else(|| PortfolioTreeError::MissingInput {
                    entity: "portfolio".into(),
                    reason: MissingInputReason::MissingRiskFreeRate,
                })?;
        Ok(LevelSettings {
            optimizer,
            objective,
            risk_free_rate,
            n_neighbors: self.config.knn_neighbors,
            rounding_dp: self.config.rounding_dp,
        })
    }

    /// Assign sub-asset weights inside every subcategory, then optimize
    /// subcategory weights inside every category.
    pub fn optimize_sub_categories(
        &mut self,
        optimizer: &dyn WeightOptimizer,
    ) -> PortfolioTreeResult<()> {
        self.require_stage(PipelineStage::TreeBuilt, "optimize_sub_categories")?;
        self.reset_weights();
        let settings = self.level_settings(optimizer, self.config.sub_category_objective)?;

        for category in self.categories.iter_mut() {
            category.calculate_asset_weights(self.config.weight_policy, self.config.weight_tolerance)?;
        }
        for category in self.categories.iter_mut() {
            let constraints = self
                .config
                .constraints
                .sub_category_constraints(category.name())?;
            category.optimize_sub_categories(constraints, &settings)?;
        }
        self.stage = PipelineStage::SubCategoryOptimized;
        Ok(())
    }

    /// Optimize category weights from the subcategory-weighted blends.
    pub fn optimize_categories(&mut self, optimizer: &dyn WeightOptimizer) -> PortfolioTreeResult<()> {
        self.require_stage(PipelineStage::SubCategoryOptimized, "optimize_categories")?;
        self.stage = PipelineStage::SubCategoryOptimized;
        for category in self.categories.iter_mut() {
            category.clear_category_weight();
        }
        let settings = self.level_settings(optimizer, self.config.category_objective)?;
        let constraints = self.config.constraints.category_constraints()?;

        let result = {
            let n_neighbors = self.config.knn_neighbors;
            let rounding_dp = self.config.rounding_dp;
            let children = self
                .categories
                .iter()
                .map(|c| {
                    c.aggregated_returns(n_neighbors, rounding_dp)
                        .map(|series| (c.name(), series))
                })
                .collect::<PortfolioTreeResult<Vec<_>>>()?;
            optimize_level("portfolio", &children, constraints, &settings)?
        };

        for category in self.categories.iter_mut() {
            let weight = result
                .weight_of(category.name())
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: category.name().to_string(),
                })?;
            category.set_category_weight(weight)?;
        }
        info!(
            categories = self.categories.len(),
            expected_return = %result.expected_return,
            volatility = %result.volatility,
            "optimized category weights"
        );
        self.stage = PipelineStage::CategoryOptimized;
        Ok(())
    }

    /// `portfolio_asset_weight = sub_asset × subcategory × category` for
    /// every security; the result must sum to one within tolerance.
    pub fn finalize_weights(&mut self) -> PortfolioTreeResult<()> {
        self.require_stage(PipelineStage::CategoryOptimized, "finalize_weights")?;
        self.stage = PipelineStage::CategoryOptimized;
        self.clear_portfolio_weights();
        if let Err(e) = self.assign_portfolio_weights() {
            self.clear_portfolio_weights();
            return Err(e);
        }
        self.stage = PipelineStage::WeightsFinalized;
        Ok(())
    }

    fn assign_portfolio_weights(&mut self) -> PortfolioTreeResult<()> {
        let mut total = Decimal::ZERO;
        for category in self.categories.iter_mut() {
            total += category.assign_portfolio_weights()?;
        }
        let tolerance = self.config.weight_tolerance;
        if (total - Decimal::ONE).abs() > tolerance {
            return Err(PortfolioTreeError::WeightSumMismatch {
                entity: "portfolio".into(),
                sum: total,
                tolerance,
            });
        }
        Ok(())
    }

    fn clear_portfolio_weights(&mut self) {
        for category in self.categories.iter_mut() {
            category.clear_portfolio_weights();
        }
    }

    /// Run every stage with the built-in optimizer.
    pub fn run(&mut self) -> PortfolioTreeResult<PortfolioReport> {
        let optimizer = ConstrainedOptimizer::new(self.config.solver);
        self.run_with(&optimizer)
    }

    pub fn run_with(&mut self, optimizer: &dyn WeightOptimizer) -> PortfolioTreeResult<PortfolioReport> {
        if self.stage == PipelineStage::Unpopulated {
            return Err(PortfolioTreeError::InsufficientData(
                "portfolio holds no securities".into(),
            ));
        }
        self.optimize_sub_categories(optimizer)?;
        self.optimize_categories(optimizer)?;
        self.finalize_weights()?;
        Ok(self.report())
    }

    pub fn total_weight(&self) -> Weight {
        self.securities()
            .filter_map(|s| s.portfolio_asset_weight())
            .sum()
    }

    pub fn report(&self) -> PortfolioReport {
        let total_value = self.config.total_portfolio_value;
        let mut sub_categories = Vec::new();
        let mut categories = Vec::new();
        for category in &self.categories {
            categories.push(LevelReport {
                name: category.name().to_string(),
                parent: None,
                weight: category.category_weight(),
                returns: category.cached_returns().cloned(),
            });
            for sub in category.sub_categories() {
                sub_categories.push(LevelReport {
                    name: sub.name().to_string(),
                    parent: Some(category.name().to_string()),
                    weight: sub.sub_category_weight(),
                    returns: sub.cached_returns().cloned(),
                });
            }
        }
        PortfolioReport {
            stage: self.stage,
            risk_free_rate: self.config.risk_free_rate,
            total_value,
            total_weight: self.total_weight(),
            securities: self
                .securities()
                .map(|s| SecurityReport::from_security(s, total_value))
                .collect(),
            sub_categories,
            categories,
        }
    }
}
