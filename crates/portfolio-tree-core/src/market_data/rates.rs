use rust_decimal::Decimal;
use tracing::{info, warn};

use super::provider::{CurrencyConverter, FetchError, RiskFreeRateSource, SecurityData};
use super::retry::{retry_transient, RetryPolicy};
use crate::types::{Rate, BASE_CURRENCY};

/// Single resolution point for the risk-free rate: a configured value wins,
/// otherwise the source is queried once. `None` means unavailable.
pub fn resolve_risk_free_rate(
    configured: Option<Rate>,
    source: Option<&dyn RiskFreeRateSource>,
    policy: &RetryPolicy,
) -> Option<Rate> {
    if let Some(rate) = configured {
        return Some(rate);
    }
    let source = source?;
    match retry_transient(policy, "risk-free rate", || source.fetch_risk_free_rate()) {
        Ok(rate) => {
            let rate = rate.round_dp(5);
            info!(%rate, "resolved risk-free rate");
            Some(rate)
        }
        Err(e) => {
            warn!(error = %e, "risk-free rate unavailable");
            None
        }
    }
}

/// Restate closes and dividends in the base currency using the average
/// exchange rate over the span of the price history.
pub fn convert_to_base_currency(
    ticker: &str,
    mut data: SecurityData,
    converter: &dyn CurrencyConverter,
    policy: &RetryPolicy,
) -> Result<SecurityData, FetchError> {
    if data.traded_currency == BASE_CURRENCY {
        return Ok(data);
    }
    let start = data.prices.iter().map(|p| p.date).min();
    let end = data.prices.iter().map(|p| p.date).max();
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => return Ok(data),
    };

    let rate: Decimal = retry_transient(policy, ticker, || {
        converter.average_rate(&data.traded_currency, &BASE_CURRENCY, start, end)
    })?;

    for point in data.prices.iter_mut() {
        point.close = point.close.map(|c| c * rate);
    }
    for dividend in data.dividends.iter_mut() {
        dividend.amount *= rate;
    }
    info!(
        ticker,
        from = data.traded_currency.code(),
        %rate,
        "converted price history to base currency"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::FixedRates;
    use crate::time_series::PricePoint;
    use crate::types::Currency;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct FailingSource;

    impl RiskFreeRateSource for FailingSource {
        fn fetch_risk_free_rate(&self) -> Result<Rate, FetchError> {
            Err(FetchError::Transient {
                resource: "^IRX".into(),
                reason: "timeout".into(),
            })
        }
    }

    #[test]
    fn test_configured_rate_wins() {
        let source = dec!(0.05);
        let rate = resolve_risk_free_rate(Some(dec!(0.02)), Some(&source), &RetryPolicy::default());
        assert_eq!(rate, Some(dec!(0.02)));
    }

    #[test]
    fn test_fetched_rate_is_rounded() {
        let source = dec!(0.0512345678);
        let rate = resolve_risk_free_rate(None, Some(&source), &RetryPolicy::default());
        assert_eq!(rate, Some(dec!(0.05123)));
    }

    #[test]
    fn test_exhausted_fetch_is_unavailable() {
        let rate = resolve_risk_free_rate(None, Some(&FailingSource), &RetryPolicy::no_backoff(2));
        assert_eq!(rate, None);
    }

    #[test]
    fn test_convert_scales_closes() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let data = SecurityData {
            prices: vec![PricePoint::new(day, dec!(10))],
            traded_currency: Currency::EUR,
            ..Default::default()
        };
        let rates = FixedRates::new().with_rate(&Currency::EUR, dec!(1.1));
        let converted =
            convert_to_base_currency("EZU", data, &rates, &RetryPolicy::default()).unwrap();
        assert_eq!(converted.prices[0].close, Some(dec!(11.0)));
        assert_eq!(converted.traded_currency, Currency::EUR);
    }
}
