use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MissingInputReason, PortfolioTreeError};
use crate::market_data::DividendEvent;
use crate::math::{checked_pow, mean, sample_std_dev, sqrt_decimal, TRADING_DAYS_PER_YEAR};
use crate::time_series::TimeSeries;
use crate::types::Rate;
use crate::PortfolioTreeResult;

/// Statistics derived from one security's price history. `None` means the
/// statistic is unavailable; the reason is listed in `unavailable`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityStatistics {
    pub geometric_mean_5y: Option<Rate>,
    pub adjusted_geometric_mean_5y: Option<Rate>,
    pub standard_deviation_5y: Option<Decimal>,
    pub downside_deviation_5y: Option<Decimal>,
    pub var_95: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub avg_dividend_yield: Option<Rate>,
    #[serde(skip)]
    pub adjusted_returns_in_series_5y: Option<TimeSeries>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<UnavailableStatistic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableStatistic {
    pub statistic: String,
    pub reason: MissingInputReason,
}

/// Simple returns between consecutive calendar-year-end closes.
pub fn yearly_returns(history: &TimeSeries) -> Vec<Decimal> {
    history.year_end().pct_change().values()
}

fn require_yearly(ticker: &str, yearly: &[Decimal]) -> PortfolioTreeResult<()> {
    if yearly.is_empty() {
        return Err(PortfolioTreeError::missing(
            ticker,
            MissingInputReason::NoYearlyReturns,
        ));
    }
    Ok(())
}

/// Compound annual growth rate `Π(1 + rᵧ + yield)^(1/N) − 1`, 5 dp.
pub fn compound_annual_growth(
    ticker: &str,
    yearly: &[Decimal],
    dividend_yield: Rate,
) -> PortfolioTreeResult<Rate> {
    require_yearly(ticker, yearly)?;
    let growth: Decimal = yearly
        .iter()
        .map(|r| Decimal::ONE + *r + dividend_yield)
        .product();
    let exponent = Decimal::ONE / Decimal::from(yearly.len() as i64);
    let root = checked_pow(growth, exponent, ticker)?;
    Ok((root - Decimal::ONE).round_dp(5))
}

/// Daily percentage changes plus a daily share of the dividend yield, 5 dp.
pub fn adjusted_daily_returns(
    ticker: &str,
    history: &TimeSeries,
    dividend_yield: Rate,
) -> PortfolioTreeResult<TimeSeries> {
    let daily = history.pct_change();
    if daily.is_empty() {
        return Err(PortfolioTreeError::missing(
            ticker,
            MissingInputReason::NoDailyReturns,
        ));
    }
    let carry = dividend_yield / Decimal::from(TRADING_DAYS_PER_YEAR);
    Ok(daily.map_values(|r| (r + carry).round_dp(5)))
}

/// Sample standard deviation of yearly returns, 5 dp.
pub fn yearly_standard_deviation(ticker: &str, yearly: &[Decimal]) -> PortfolioTreeResult<Decimal> {
    require_yearly(ticker, yearly)?;
    sample_std_dev(yearly)
        .map(|sd| sd.round_dp(5))
        .ok_or_else(|| {
            PortfolioTreeError::missing(ticker, MissingInputReason::InsufficientYearlyReturns)
        })
}

/// `sqrt(mean(min(0, rᵧ − MAR)²))` over all yearly returns, 5 dp.
pub fn downside_deviation(
    ticker: &str,
    yearly: &[Decimal],
    minimum_acceptable: Option<Rate>,
) -> PortfolioTreeResult<Decimal> {
    require_yearly(ticker, yearly)?;
    let mar = minimum_acceptable.ok_or_else(|| {
        PortfolioTreeError::missing(ticker, MissingInputReason::MissingRiskFreeRate)
    })?;
    let squared: Vec<Decimal> = yearly
        .iter()
        .map(|r| {
            let shortfall = (*r - mar).min(Decimal::ZERO);
            shortfall * shortfall
        })
        .collect();
    Ok(sqrt_decimal(mean(&squared)).round_dp(5))
}

/// `(return − rf) / σ`, 2 dp.
pub fn sharpe_ratio(
    ticker: &str,
    annual_return: Rate,
    std_dev: Decimal,
    risk_free_rate: Option<Rate>,
) -> PortfolioTreeResult<Decimal> {
    let rf = risk_free_rate.ok_or_else(|| {
        PortfolioTreeError::missing(ticker, MissingInputReason::MissingRiskFreeRate)
    })?;
    if std_dev.is_zero() {
        return Err(PortfolioTreeError::missing(
            ticker,
            MissingInputReason::ZeroVolatility,
        ));
    }
    Ok(((annual_return - rf) / std_dev).round_dp(2))
}

/// Mean over years of (dividends paid in the year / year-end close). Only
/// years with both a dividend and a close count. No dividends at all gives
/// a zero yield.
pub fn average_dividend_yield(history: &TimeSeries, dividends: &[DividendEvent]) -> Rate {
    let mut paid: BTreeMap<i32, Decimal> = BTreeMap::new();
    for d in dividends {
        *paid.entry(d.date.year()).or_insert(Decimal::ZERO) += d.amount;
    }
    let year_end: BTreeMap<i32, Decimal> = history
        .year_end()
        .iter()
        .map(|(date, close)| (date.year(), close))
        .collect();

    let yields: Vec<Decimal> = paid
        .iter()
        .filter_map(|(year, amount)| {
            year_end
                .get(year)
                .filter(|close| !close.is_zero())
                .map(|close| *amount / *close)
        })
        .collect();
    mean(&yields).round_dp(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn year_end_history(closes: &[Decimal]) -> TimeSeries {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| (d(2020 + i as i32, 12, 31), *c))
            .collect()
    }

    #[test]
    fn test_cagr_from_year_ends() {
        let history = year_end_history(&[dec!(100), dec!(110), dec!(121)]);
        let yearly = yearly_returns(&history);
        assert_eq!(yearly, vec![dec!(0.1), dec!(0.1)]);
        let cagr = compound_annual_growth("T", &yearly, Decimal::ZERO).unwrap();
        assert_eq!(cagr, dec!(0.1));
        let adjusted = compound_annual_growth("T", &yearly, dec!(0.02)).unwrap();
        assert_eq!(adjusted, dec!(0.12));
    }

    #[test]
    fn test_no_yearly_returns_is_missing_input() {
        let err = compound_annual_growth("T", &[], Decimal::ZERO).unwrap_err();
        assert!(matches!(
            err,
            PortfolioTreeError::MissingInput {
                reason: MissingInputReason::NoYearlyReturns,
                ..
            }
        ));
    }

    #[test]
    fn test_std_needs_two_returns() {
        let err = yearly_standard_deviation("T", &[dec!(0.1)]).unwrap_err();
        assert!(matches!(
            err,
            PortfolioTreeError::MissingInput {
                reason: MissingInputReason::InsufficientYearlyReturns,
                ..
            }
        ));
        let sd = yearly_standard_deviation("T", &[dec!(0.1), dec!(0.3)]).unwrap();
        assert_eq!(sd, dec!(0.14142));
    }

    #[test]
    fn test_downside_only_counts_shortfall() {
        let yearly = [dec!(0.10), dec!(-0.02), dec!(0.00), dec!(0.05)];
        // shortfalls vs 0.02: 0, -0.04, -0.02, 0 -> mean sq = 0.0005
        let dd = downside_deviation("T", &yearly, Some(dec!(0.02))).unwrap();
        assert_eq!(dd, dec!(0.02236));
        assert!(downside_deviation("T", &yearly, None).is_err());
    }

    #[test]
    fn test_sharpe_rounding_and_zero_vol() {
        let sharpe = sharpe_ratio("T", dec!(0.08), dec!(0.15), Some(dec!(0.02))).unwrap();
        assert_eq!(sharpe, dec!(0.40));
        let err = sharpe_ratio("T", dec!(0.08), Decimal::ZERO, Some(dec!(0.02))).unwrap_err();
        assert!(matches!(
            err,
            PortfolioTreeError::MissingInput {
                reason: MissingInputReason::ZeroVolatility,
                ..
            }
        ));
    }

    #[test]
    fn test_daily_returns_add_yield_carry() {
        let history = TimeSeries::from_points(vec![
            (d(2024, 1, 2), dec!(100)),
            (d(2024, 1, 3), dec!(101)),
        ]);
        let adjusted = adjusted_daily_returns("T", &history, dec!(0.0252)).unwrap();
        assert_eq!(adjusted.get(&d(2024, 1, 3)), Some(dec!(0.0101)));
    }

    #[test]
    fn test_average_dividend_yield() {
        let history = year_end_history(&[dec!(100), dec!(200)]);
        let dividends = vec![
            DividendEvent { date: d(2020, 6, 1), amount: dec!(1) },
            DividendEvent { date: d(2020, 9, 1), amount: dec!(1) },
            DividendEvent { date: d(2021, 6, 1), amount: dec!(2) },
            // no close for 2019, ignored
            DividendEvent { date: d(2019, 6, 1), amount: dec!(50) },
        ];
        assert_eq!(average_dividend_yield(&history, &dividends), dec!(0.015));
        assert_eq!(average_dividend_yield(&history, &[]), Decimal::ZERO);
    }
}
