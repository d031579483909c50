use rust_decimal::Decimal;
use std::sync::OnceLock;
use tracing::{debug, info};

use super::level::{optimize_level, LevelSettings};
use super::sub_category::SubCategory;
use crate::aggregation::fill_return_series;
use crate::config::SubAssetWeightPolicy;
use crate::error::PortfolioTreeError;
use crate::optimization::{OptimizationResult, WeightConstraint};
use crate::security::Security;
use crate::time_series::TimeSeries;
use crate::types::{ensure_unit_interval, AssetClass, Weight};
use crate::PortfolioTreeResult;

/// Top-level grouping (Equity, Bond, Alternative, ...).
#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    asset_class: AssetClass,
    sub_categories: Vec<SubCategory>,
    category_weight: Option<Weight>,
    aggregated_returns: OnceLock<TimeSeries>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            asset_class: AssetClass::from_label(&name),
            name,
            sub_categories: Vec::new(),
            category_weight: None,
            aggregated_returns: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset_class(&self) -> &AssetClass {
        &self.asset_class
    }

    pub fn sub_categories(&self) -> &[SubCategory] {
        &self.sub_categories
    }

    pub fn sub_category(&self, name: &str) -> Option<&SubCategory> {
        self.sub_categories.iter().find(|s| s.name() == name)
    }

    pub fn sub_category_mut(&mut self, name: &str) -> Option<&mut SubCategory> {
        self.invalidate();
        self.sub_categories.iter_mut().find(|s| s.name() == name)
    }

    pub fn find_or_create_sub_category(&mut self, name: &str) -> &mut SubCategory {
        self.invalidate();
        let idx = match self.sub_categories.iter().position(|s| s.name() == name) {
            Some(idx) => idx,
            None => {
                debug!(category = %self.name, sub_category = name, "created subcategory");
                self.sub_categories.push(SubCategory::new(name));
                self.sub_categories.len() - 1
            }
        };
        &mut self.sub_categories[idx]
    }

    pub fn securities(&self) -> impl Iterator<Item = &Security> + '_ {
        self.sub_categories.iter().flat_map(|s| s.securities())
    }

    pub(crate) fn securities_mut(&mut self) -> impl Iterator<Item = &mut Security> + '_ {
        self.invalidate();
        self.sub_categories
            .iter_mut()
            .flat_map(|s| s.securities_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.sub_categories.iter().all(|s| s.is_empty())
    }

    /// Remove `ticker` from whichever subcategory holds it, dropping the
    /// subcategory if it becomes empty.
    pub fn remove_security(&mut self, ticker: &str) -> Option<Security> {
        let idx = self
            .sub_categories
            .iter()
            .position(|s| s.security(ticker).is_some())?;
        let removed = self.sub_categories[idx].remove_security(ticker);
        if self.sub_categories[idx].is_empty() {
            let sub = self.sub_categories.remove(idx);
            info!(category = %self.name, sub_category = sub.name(), "removed empty subcategory");
        }
        self.invalidate();
        removed
    }

    pub fn category_weight(&self) -> Option<Weight> {
        self.category_weight
    }

    pub(crate) fn set_category_weight(&mut self, weight: Weight) -> PortfolioTreeResult<()> {
        if let Some(current) = self.category_weight {
            return Err(PortfolioTreeError::InvalidInput {
                field: "category_weight".into(),
                reason: format!("'{}' already has weight {current}", self.name),
            });
        }
        self.category_weight = Some(ensure_unit_interval(&self.name, weight)?);
        Ok(())
    }

    pub(crate) fn clear_category_weight(&mut self) {
        self.category_weight = None;
    }

    /// Spread the category weight down through subcategory weights onto
    /// each security. Returns the sum of the assigned weights.
    pub(crate) fn assign_portfolio_weights(&mut self) -> PortfolioTreeResult<Weight> {
        let category_weight = self
            .category_weight
            .ok_or_else(|| PortfolioTreeError::MissingWeight {
                entity: self.name.clone(),
            })?;
        let mut total = Decimal::ZERO;
        for sub in self.sub_categories.iter_mut() {
            let sub_weight = sub
                .sub_category_weight()
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: sub.name().to_string(),
                })?;
            total += sub.assign_portfolio_weights(sub_weight * category_weight)?;
        }
        Ok(total)
    }

    pub(crate) fn clear_portfolio_weights(&mut self) {
        for sub in self.sub_categories.iter_mut() {
            sub.clear_portfolio_weights();
        }
    }

    /// Drop every weight below and including this category.
    pub fn clear_weights(&mut self) {
        self.category_weight = None;
        for sub in self.sub_categories.iter_mut() {
            sub.clear_sub_category_weight();
            for s in sub.securities_mut() {
                s.clear_weights();
            }
            sub.invalidate();
        }
        self.invalidate();
    }

    pub fn invalidate(&mut self) {
        self.aggregated_returns.take();
    }

    pub fn cached_returns(&self) -> Option<&TimeSeries> {
        self.aggregated_returns.get()
    }

    pub fn calculate_asset_weights(
        &mut self,
        policy: SubAssetWeightPolicy,
        tolerance: Decimal,
    ) -> PortfolioTreeResult<()> {
        for sub in self.sub_categories.iter_mut() {
            sub.calculate_asset_weights(policy, tolerance)?;
        }
        self.invalidate();
        Ok(())
    }

    /// Optimize subcategory weights from their blended series and store
    /// them on each subcategory.
    pub fn optimize_sub_categories(
        &mut self,
        constraints: Vec<WeightConstraint>,
        settings: &LevelSettings<'_>,
    ) -> PortfolioTreeResult<OptimizationResult> {
        for sub in self.sub_categories.iter_mut() {
            sub.clear_sub_category_weight();
        }
        let result = {
            let children = self
                .sub_categories
                .iter()
                .map(|s| {
                    s.aggregated_returns(settings.n_neighbors, settings.rounding_dp)
                        .map(|series| (s.name(), series))
                })
                .collect::<PortfolioTreeResult<Vec<_>>>()?;
            optimize_level(&self.name, &children, constraints, settings)?
        };

        for sub in self.sub_categories.iter_mut() {
            let weight = result
                .weight_of(sub.name())
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: sub.name().to_string(),
                })?;
            sub.set_sub_category_weight(weight)?;
        }
        self.invalidate();
        info!(category = %self.name, sub_categories = self.sub_categories.len(), "optimized subcategory weights");
        Ok(result)
    }

    /// Subcategory series gap-filled and blended by subcategory weight.
    pub fn aggregated_returns(
        &self,
        n_neighbors: usize,
        rounding_dp: u32,
    ) -> PortfolioTreeResult<&TimeSeries> {
        if let Some(cached) = self.aggregated_returns.get() {
            return Ok(cached);
        }
        let mut columns = Vec::with_capacity(self.sub_categories.len());
        let mut weights = Vec::with_capacity(self.sub_categories.len());
        for sub in &self.sub_categories {
            let weight = sub
                .sub_category_weight()
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: sub.name().to_string(),
                })?;
            columns.push((sub.name(), sub.aggregated_returns(n_neighbors, rounding_dp)?));
            weights.push(weight);
        }
        if columns.is_empty() {
            return Err(PortfolioTreeError::NoUsableData {
                column: self.name.clone(),
            });
        }
        let filled = fill_return_series(columns, n_neighbors, rounding_dp)?;
        let blended = filled.blend(Some(&weights))?;
        Ok(self.aggregated_returns.get_or_init(|| blended))
    }
}
