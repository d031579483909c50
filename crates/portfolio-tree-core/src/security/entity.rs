use rust_decimal::Decimal;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::statistics::{
    adjusted_daily_returns, average_dividend_yield, compound_annual_growth, downside_deviation,
    sharpe_ratio, yearly_returns, yearly_standard_deviation, SecurityStatistics,
    UnavailableStatistic,
};
use super::var::monte_carlo_var;
use crate::config::{DividendPolicy, StatisticsSettings};
use crate::error::{MissingInputReason, PortfolioTreeError};
use crate::market_data::{SecurityData, SecurityProfile};
use crate::time_series::{resample_business_days, TimeSeries};
use crate::types::{ensure_unit_interval, AssetClass, Currency, Money, Rate, Weight};
use crate::PortfolioTreeResult;

/// Length of the statistics window ending at the last close.
pub const HISTORY_YEARS: u32 = 5;

/// Leaf of the portfolio tree.
///
/// The resampled price history and the statistics bundle are computed on
/// first access and cached until [`Security::invalidate`] is called, which
/// happens automatically when market data or settings change.
#[derive(Debug, Clone)]
pub struct Security {
    ticker: String,
    sub_category: String,
    category: String,
    asset_class: AssetClass,
    imported_risk_weight: Option<Weight>,
    sub_asset_weight: Option<Weight>,
    portfolio_asset_weight: Option<Weight>,
    market_data: Option<SecurityData>,
    settings: StatisticsSettings,
    historical_data: OnceLock<TimeSeries>,
    statistics: OnceLock<SecurityStatistics>,
}

impl Security {
    pub fn new(
        ticker: impl Into<String>,
        sub_category: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let category = category.into();
        Self {
            ticker: ticker.into(),
            sub_category: sub_category.into(),
            asset_class: AssetClass::from_label(&category),
            category,
            imported_risk_weight: None,
            sub_asset_weight: None,
            portfolio_asset_weight: None,
            market_data: None,
            settings: StatisticsSettings::default(),
            historical_data: OnceLock::new(),
            statistics: OnceLock::new(),
        }
    }

    pub fn with_asset_class(mut self, asset_class: AssetClass) -> Self {
        self.asset_class = asset_class;
        self
    }

    pub fn with_market_data(mut self, data: SecurityData) -> Self {
        self.set_market_data(Some(data));
        self
    }

    pub fn with_settings(mut self, settings: StatisticsSettings) -> Self {
        self.apply_settings(settings);
        self
    }

    pub fn with_imported_risk_weight(mut self, weight: Weight) -> PortfolioTreeResult<Self> {
        self.imported_risk_weight = Some(ensure_unit_interval(&self.ticker, weight)?);
        Ok(self)
    }

    // -- identity -----------------------------------------------------------

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn sub_category(&self) -> &str {
        &self.sub_category
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn asset_class(&self) -> &AssetClass {
        &self.asset_class
    }

    pub fn market_data(&self) -> Option<&SecurityData> {
        self.market_data.as_ref()
    }

    pub fn profile(&self) -> Option<&SecurityProfile> {
        self.market_data.as_ref().map(|d| &d.profile)
    }

    pub fn traded_currency(&self) -> Option<&Currency> {
        self.market_data.as_ref().map(|d| &d.traded_currency)
    }

    pub fn dividend_yield(&self) -> Option<Rate> {
        self.market_data.as_ref().and_then(|d| d.dividend_yield)
    }

    pub fn expense_ratio(&self) -> Option<Rate> {
        self.profile()
            .and_then(|p| p.expense_ratio)
            .map(|r| r.round_dp(5))
    }

    pub fn settings(&self) -> &StatisticsSettings {
        &self.settings
    }

    // -- mutation -----------------------------------------------------------

    /// Replace the market data and drop every derived value.
    pub fn set_market_data(&mut self, data: Option<SecurityData>) {
        self.market_data = data;
        self.invalidate();
    }

    pub fn apply_settings(&mut self, settings: StatisticsSettings) {
        if self.settings != settings {
            self.settings = settings;
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        self.historical_data.take();
        self.statistics.take();
    }

    pub fn imported_risk_weight(&self) -> Option<Weight> {
        self.imported_risk_weight
    }

    pub fn sub_asset_weight(&self) -> Option<Weight> {
        self.sub_asset_weight
    }

    pub fn set_sub_asset_weight(&mut self, weight: Weight) -> PortfolioTreeResult<()> {
        self.sub_asset_weight = Some(ensure_unit_interval(&self.ticker, weight)?);
        Ok(())
    }

    pub fn portfolio_asset_weight(&self) -> Option<Weight> {
        self.portfolio_asset_weight
    }

    pub(crate) fn set_portfolio_asset_weight(&mut self, weight: Weight) -> PortfolioTreeResult<()> {
        self.portfolio_asset_weight = Some(ensure_unit_interval(&self.ticker, weight)?);
        Ok(())
    }

    pub(crate) fn clear_portfolio_asset_weight(&mut self) {
        self.portfolio_asset_weight = None;
    }

    pub fn clear_weights(&mut self) {
        self.sub_asset_weight = None;
        self.portfolio_asset_weight = None;
    }

    // -- derived data -------------------------------------------------------

    /// Business-day closes over the trailing [`HISTORY_YEARS`], interior gaps
    /// interpolated. `None` when no market data is attached or the history
    /// is empty.
    pub fn historical_data(&self) -> Option<&TimeSeries> {
        let data = self.market_data.as_ref()?;
        let history = self
            .historical_data
            .get_or_init(|| resample_business_days(&data.prices).trailing_years(HISTORY_YEARS));
        if history.is_empty() {
            None
        } else {
            Some(history)
        }
    }

    pub fn last_price(&self) -> Option<Money> {
        self.historical_data()?.last().map(|(_, close)| close)
    }

    pub fn statistics(&self) -> &SecurityStatistics {
        self.statistics.get_or_init(|| self.compute_statistics())
    }

    pub fn geometric_mean_5y(&self) -> Option<Rate> {
        self.statistics().geometric_mean_5y
    }

    pub fn adjusted_geometric_mean_5y(&self) -> Option<Rate> {
        self.statistics().adjusted_geometric_mean_5y
    }

    pub fn adjusted_returns_in_series_5y(&self) -> Option<&TimeSeries> {
        self.statistics().adjusted_returns_in_series_5y.as_ref()
    }

    pub fn standard_deviation_5y(&self) -> Option<Decimal> {
        self.statistics().standard_deviation_5y
    }

    pub fn downside_deviation_5y(&self) -> Option<Decimal> {
        self.statistics().downside_deviation_5y
    }

    pub fn var_95(&self) -> Option<Decimal> {
        self.statistics().var_95
    }

    pub fn sharpe_ratio(&self) -> Option<Decimal> {
        self.statistics().sharpe_ratio
    }

    pub fn avg_dividend_yield(&self) -> Option<Rate> {
        self.statistics().avg_dividend_yield
    }

    /// Money allocated to this security out of `total`.
    pub fn allocation(&self, total: Money) -> Option<Money> {
        self.portfolio_asset_weight.map(|w| (w * total).round_dp(2))
    }

    /// Whole-portfolio allocation divided by the last close, 2 dp.
    pub fn number_of_shares(&self, total: Money) -> Option<Decimal> {
        let allocation = self.portfolio_asset_weight? * total;
        let last = self.last_price()?;
        if last.is_zero() {
            return None;
        }
        Some((allocation / last).round_dp(2))
    }

    fn compute_statistics(&self) -> SecurityStatistics {
        let mut stats = SecurityStatistics::default();
        let ticker = self.ticker.as_str();

        let history = match self.historical_data() {
            Some(h) => h,
            None => {
                for name in [
                    "geometric_mean_5y",
                    "adjusted_geometric_mean_5y",
                    "adjusted_returns_in_series_5y",
                    "standard_deviation_5y",
                    "downside_deviation_5y",
                    "var_95",
                    "sharpe_ratio",
                    "avg_dividend_yield",
                ] {
                    record_unavailable(&mut stats, ticker, name, MissingInputReason::EmptyHistory);
                }
                return stats;
            }
        };

        let yearly = yearly_returns(history);
        let current_yield = self.dividend_yield();
        let dividends = self
            .market_data
            .as_ref()
            .map(|d| d.dividends.as_slice())
            .unwrap_or_default();
        let avg_yield = average_dividend_yield(history, dividends);
        stats.avg_dividend_yield = Some(avg_yield);

        stats.geometric_mean_5y = settle(
            &mut stats,
            "geometric_mean_5y",
            compound_annual_growth(ticker, &yearly, Decimal::ZERO),
        );

        stats.adjusted_geometric_mean_5y = settle(
            &mut stats,
            "adjusted_geometric_mean_5y",
            current_yield
                .ok_or_else(|| {
                    PortfolioTreeError::missing(ticker, MissingInputReason::MissingDividendYield)
                })
                .and_then(|y| compound_annual_growth(ticker, &yearly, y)),
        );

        let series_yield = match self.settings.dividend_policy {
            DividendPolicy::Current => current_yield,
            DividendPolicy::Average => Some(avg_yield),
        };
        stats.adjusted_returns_in_series_5y = settle(
            &mut stats,
            "adjusted_returns_in_series_5y",
            series_yield
                .ok_or_else(|| {
                    PortfolioTreeError::missing(ticker, MissingInputReason::MissingDividendYield)
                })
                .and_then(|y| adjusted_daily_returns(ticker, history, y)),
        );

        stats.standard_deviation_5y = settle(
            &mut stats,
            "standard_deviation_5y",
            yearly_standard_deviation(ticker, &yearly),
        );

        stats.downside_deviation_5y = settle(
            &mut stats,
            "downside_deviation_5y",
            downside_deviation(ticker, &yearly, self.settings.risk_free_rate),
        );

        let adjusted_and_std = stats
            .adjusted_geometric_mean_5y
            .zip(stats.standard_deviation_5y);

        let var = match (adjusted_and_std, history.last()) {
            (Some((mean, std)), Some((_, last))) => {
                monte_carlo_var(ticker, last, mean, std, &self.settings.var)
            }
            _ => Err(upstream_reason(&stats, ticker)),
        };
        stats.var_95 = settle(&mut stats, "var_95", var);

        let sharpe = match adjusted_and_std {
            Some((ret, std)) => sharpe_ratio(ticker, ret, std, self.settings.risk_free_rate),
            None => Err(upstream_reason(&stats, ticker)),
        };
        stats.sharpe_ratio = settle(&mut stats, "sharpe_ratio", sharpe);

        debug!(
            ticker,
            unavailable = stats.unavailable.len(),
            "computed security statistics"
        );
        stats
    }
}

/// Reason inherited from the first unavailable input of a derived statistic.
fn upstream_reason(stats: &SecurityStatistics, ticker: &str) -> PortfolioTreeError {
    let reason = stats
        .unavailable
        .iter()
        .find(|u| {
            u.statistic == "adjusted_geometric_mean_5y" || u.statistic == "standard_deviation_5y"
        })
        .map(|u| u.reason)
        .unwrap_or(MissingInputReason::NoYearlyReturns);
    PortfolioTreeError::missing(ticker, reason)
}

fn record_unavailable(
    stats: &mut SecurityStatistics,
    ticker: &str,
    statistic: &str,
    reason: MissingInputReason,
) {
    warn!(ticker, statistic, %reason, "statistic unavailable");
    stats.unavailable.push(UnavailableStatistic {
        statistic: statistic.to_string(),
        reason,
    });
}

/// Turn a computation result into an optional statistic. Missing inputs are
/// recorded; any other failure is logged and also leaves the value empty.
fn settle<T>(
    stats: &mut SecurityStatistics,
    statistic: &str,
    result: PortfolioTreeResult<T>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(PortfolioTreeError::MissingInput { entity, reason }) => {
            record_unavailable(stats, &entity, statistic, reason);
            None
        }
        Err(e) => {
            warn!(statistic, error = %e, "statistic could not be computed");
            None
        }
    }
}
