use rust_decimal::Decimal;
use std::sync::OnceLock;
use tracing::debug;

use crate::aggregation::fill_return_series;
use crate::config::SubAssetWeightPolicy;
use crate::error::PortfolioTreeError;
use crate::security::Security;
use crate::time_series::TimeSeries;
use crate::types::{ensure_unit_interval, Weight};
use crate::PortfolioTreeResult;

/// Group of securities blended into one return series and weighted as a
/// unit inside its category.
#[derive(Debug, Clone)]
pub struct SubCategory {
    name: String,
    securities: Vec<Security>,
    sub_category_weight: Option<Weight>,
    aggregated_returns: OnceLock<TimeSeries>,
}

impl SubCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            securities: Vec::new(),
            sub_category_weight: None,
            aggregated_returns: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn securities(&self) -> &[Security] {
        &self.securities
    }

    pub fn security(&self, ticker: &str) -> Option<&Security> {
        self.securities.iter().find(|s| s.ticker() == ticker)
    }

    /// Mutable access drops the blended series, since the caller may change
    /// anything it depends on.
    pub fn security_mut(&mut self, ticker: &str) -> Option<&mut Security> {
        self.invalidate();
        self.securities.iter_mut().find(|s| s.ticker() == ticker)
    }

    pub(crate) fn securities_mut(&mut self) -> std::slice::IterMut<'_, Security> {
        self.invalidate();
        self.securities.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn add_security(&mut self, security: Security) -> PortfolioTreeResult<()> {
        if self.security(security.ticker()).is_some() {
            return Err(PortfolioTreeError::InvalidInput {
                field: "ticker".into(),
                reason: format!(
                    "'{}' is already held in subcategory '{}'",
                    security.ticker(),
                    self.name
                ),
            });
        }
        self.securities.push(security);
        self.invalidate();
        Ok(())
    }

    pub fn remove_security(&mut self, ticker: &str) -> Option<Security> {
        let idx = self.securities.iter().position(|s| s.ticker() == ticker)?;
        self.invalidate();
        Some(self.securities.remove(idx))
    }

    pub fn sub_category_weight(&self) -> Option<Weight> {
        self.sub_category_weight
    }

    /// Written once per optimization run; clear it before assigning again.
    pub(crate) fn set_sub_category_weight(&mut self, weight: Weight) -> PortfolioTreeResult<()> {
        if let Some(current) = self.sub_category_weight {
            return Err(PortfolioTreeError::InvalidInput {
                field: "sub_category_weight".into(),
                reason: format!("'{}' already has weight {current}", self.name),
            });
        }
        self.sub_category_weight = Some(ensure_unit_interval(&self.name, weight)?);
        Ok(())
    }

    pub(crate) fn clear_sub_category_weight(&mut self) {
        self.sub_category_weight = None;
    }

    pub fn invalidate(&mut self) {
        self.aggregated_returns.take();
    }

    /// Blended series if it has already been computed.
    pub fn cached_returns(&self) -> Option<&TimeSeries> {
        self.aggregated_returns.get()
    }

    /// Assign every security's `sub_asset_weight` under `policy`, then
    /// check that they sum to one within `tolerance`.
    pub fn calculate_asset_weights(
        &mut self,
        policy: SubAssetWeightPolicy,
        tolerance: Decimal,
    ) -> PortfolioTreeResult<()> {
        if self.securities.is_empty() {
            return Err(PortfolioTreeError::InsufficientData(format!(
                "subcategory '{}' holds no securities",
                self.name
            )));
        }

        let weights: Vec<Weight> = match policy {
            SubAssetWeightPolicy::InverseVolatility => {
                let inverse: Vec<Decimal> = self
                    .securities
                    .iter()
                    .map(|s| match s.standard_deviation_5y() {
                        Some(sd) if sd > Decimal::ZERO => Decimal::ONE / sd,
                        _ => Decimal::ZERO,
                    })
                    .collect();
                let total: Decimal = inverse.iter().sum();
                if total.is_zero() {
                    return Err(PortfolioTreeError::ZeroTotalInverseRisk {
                        entity: self.name.clone(),
                    });
                }
                inverse.iter().map(|v| *v / total).collect()
            }
            SubAssetWeightPolicy::Imported => self
                .securities
                .iter()
                .map(|s| {
                    s.imported_risk_weight()
                        .ok_or_else(|| PortfolioTreeError::MissingWeight {
                            entity: s.ticker().to_string(),
                        })
                })
                .collect::<PortfolioTreeResult<_>>()?,
        };

        for (security, weight) in self.securities.iter_mut().zip(weights) {
            security.set_sub_asset_weight(weight)?;
        }
        self.invalidate();
        self.validate_asset_weights(tolerance)?;
        debug!(sub_category = %self.name, ?policy, "assigned sub-asset weights");
        Ok(())
    }

    /// Every security carries a weight and together they sum to `1 ± tolerance`.
    pub fn validate_asset_weights(&self, tolerance: Decimal) -> PortfolioTreeResult<()> {
        let mut sum = Decimal::ZERO;
        for s in &self.securities {
            sum += s
                .sub_asset_weight()
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: s.ticker().to_string(),
                })?;
        }
        if (sum - Decimal::ONE).abs() > tolerance {
            return Err(PortfolioTreeError::WeightSumMismatch {
                entity: self.name.clone(),
                sum,
                tolerance,
            });
        }
        Ok(())
    }

    /// Set each security's whole-portfolio weight to `sub_asset_weight × scale`
    /// and return their sum. The blended series does not depend on these.
    pub(crate) fn assign_portfolio_weights(&mut self, scale: Weight) -> PortfolioTreeResult<Weight> {
        let mut total = Decimal::ZERO;
        for s in self.securities.iter_mut() {
            let weight = s
                .sub_asset_weight()
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: s.ticker().to_string(),
                })?
                * scale;
            s.set_portfolio_asset_weight(weight)?;
            total += weight;
        }
        Ok(total)
    }

    pub(crate) fn clear_portfolio_weights(&mut self) {
        for s in self.securities.iter_mut() {
            s.clear_portfolio_asset_weight();
        }
    }

    /// Securities' adjusted daily return series, gap-filled and blended by
    /// `sub_asset_weight`. Zero-weight securities without a series are left
    /// out; a weighted one without a series is an error.
    pub fn aggregated_returns(
        &self,
        n_neighbors: usize,
        rounding_dp: u32,
    ) -> PortfolioTreeResult<&TimeSeries> {
        if let Some(cached) = self.aggregated_returns.get() {
            return Ok(cached);
        }

        let mut columns: Vec<(&str, &TimeSeries)> = Vec::new();
        let mut weights: Vec<Weight> = Vec::new();
        for s in &self.securities {
            let weight = s
                .sub_asset_weight()
                .ok_or_else(|| PortfolioTreeError::MissingWeight {
                    entity: s.ticker().to_string(),
                })?;
            match s.adjusted_returns_in_series_5y() {
                Some(series) => {
                    columns.push((s.ticker(), series));
                    weights.push(weight);
                }
                None if weight.is_zero() => continue,
                None => {
                    return Err(PortfolioTreeError::NoUsableData {
                        column: s.ticker().to_string(),
                    })
                }
            }
        }
        if columns.is_empty() {
            return Err(PortfolioTreeError::NoUsableData {
                column: self.name.clone(),
            });
        }

        let filled = fill_return_series(columns, n_neighbors, rounding_dp)?;
        let blended = filled.blend(Some(&weights))?;
        debug!(
            sub_category = %self.name,
            securities = weights.len(),
            observations = blended.len(),
            "aggregated subcategory returns"
        );
        Ok(self.aggregated_returns.get_or_init(|| blended))
    }
}
