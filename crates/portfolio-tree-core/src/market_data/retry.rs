use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{FetchError, MarketDataProvider, SecurityData};

/// Bounded retry with a fixed backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn no_backoff(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms: 0,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
pub fn retry_transient<T, F>(
    policy: &RetryPolicy,
    resource: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Result<T, FetchError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(resource, attempt, error = %e, "transient fetch failure, retrying");
                if policy.backoff_ms > 0 {
                    thread::sleep(Duration::from_millis(policy.backoff_ms));
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Limits on how broken a fetched price history may be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Maximum share of observations with no close.
    pub max_missing_share: Decimal,
    /// Maximum share of closes repeating an earlier close.
    pub max_duplicate_share: Decimal,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_missing_share: dec!(0.1),
            max_duplicate_share: dec!(0.1),
        }
    }
}

/// Reject price histories with too many holes or repeated closes.
pub fn check_price_quality(
    ticker: &str,
    data: &SecurityData,
    thresholds: &QualityThresholds,
) -> Result<(), FetchError> {
    let total = data.prices.len();
    if total == 0 {
        return Ok(());
    }
    let total_dec = Decimal::from(total as i64);

    let missing = data.prices.iter().filter(|p| p.close.is_none()).count();
    if Decimal::from(missing as i64) / total_dec > thresholds.max_missing_share {
        return Err(FetchError::Permanent {
            resource: ticker.to_string(),
            reason: format!("too many missing closes: {missing} out of {total}"),
        });
    }

    let mut seen: HashSet<Option<Decimal>> = HashSet::with_capacity(total);
    let duplicated = data
        .prices
        .iter()
        .filter(|p| !seen.insert(p.close.map(|c| c.normalize())))
        .count();
    if Decimal::from(duplicated as i64) / total_dec > thresholds.max_duplicate_share {
        return Err(FetchError::Permanent {
            resource: ticker.to_string(),
            reason: format!("too many duplicated closes: {duplicated} out of {total}"),
        });
    }
    Ok(())
}

/// Fetch one ticker, retrying transient failures, then validate the data.
/// Validation failures are never retried.
pub fn load_security_data(
    provider: &dyn MarketDataProvider,
    ticker: &str,
    policy: &RetryPolicy,
    quality: Option<&QualityThresholds>,
) -> Result<SecurityData, FetchError> {
    let data = retry_transient(policy, ticker, || provider.fetch_security_data(ticker))?;
    if let Some(thresholds) = quality {
        check_price_quality(ticker, &data, thresholds)?;
    }
    debug!(ticker, observations = data.prices.len(), "loaded market data");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_series::PricePoint;
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn transient(resource: &str) -> FetchError {
        FetchError::Transient {
            resource: resource.into(),
            reason: "timeout".into(),
        }
    }

    #[test]
    fn test_retries_until_success() {
        let calls = Cell::new(0);
        let result = retry_transient(&RetryPolicy::no_backoff(3), "SPY", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(transient("SPY"))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_attempts_are_bounded() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_transient(&RetryPolicy::no_backoff(3), "SPY", || {
            calls.set(calls.get() + 1);
            Err(transient("SPY"))
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_permanent_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_transient(&RetryPolicy::no_backoff(5), "SPY", || {
            calls.set(calls.get() + 1);
            Err(FetchError::Permanent {
                resource: "SPY".into(),
                reason: "bad shape".into(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_quality_rejects_holes() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let prices = (0..10)
            .map(|i| PricePoint {
                date: start + chrono::Duration::days(i),
                close: if i < 3 { None } else { Some(Decimal::from(100 + i)) },
            })
            .collect();
        let data = SecurityData {
            prices,
            ..Default::default()
        };
        let err = check_price_quality("X", &data, &QualityThresholds::default()).unwrap_err();
        assert!(!err.is_transient());
    }
}
