use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::time_series::PricePoint;
use crate::types::{Currency, Money, Rate};

/// Failure reported by an external data collaborator.
///
/// Only `Transient` failures are retried; `Permanent` covers unknown
/// tickers and data that fails validation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FetchError {
    #[error("transient failure fetching {resource}: {reason}")]
    Transient { resource: String, reason: String },

    #[error("unusable data for {resource}: {reason}")]
    Permanent { resource: String, reason: String },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Descriptive fields carried through to reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_name: Option<String>,
    /// Fund category as labelled by the data vendor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_ratio: Option<Rate>,
}

/// A cash dividend paid on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub date: NaiveDate,
    pub amount: Money,
}

/// Everything fetched for one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityData {
    /// Daily closes, any order, may contain holes.
    pub prices: Vec<PricePoint>,
    /// Current trailing dividend yield.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dividend_yield: Option<Rate>,
    #[serde(default)]
    pub dividends: Vec<DividendEvent>,
    #[serde(default)]
    pub traded_currency: Currency,
    #[serde(default)]
    pub profile: SecurityProfile,
}

/// Per-security market data source.
pub trait MarketDataProvider {
    fn fetch_security_data(&self, ticker: &str) -> Result<SecurityData, FetchError>;
}

/// Source of the annual risk-free rate, e.g. a 3-month bill proxy.
pub trait RiskFreeRateSource {
    fn fetch_risk_free_rate(&self) -> Result<Rate, FetchError>;
}

/// Average exchange rate between two currencies over a date range.
pub trait CurrencyConverter {
    fn average_rate(
        &self,
        from: &Currency,
        to: &Currency,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, FetchError>;
}

/// Provider backed by data already held in memory (files, fixtures).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryMarketData {
    securities: HashMap<String, SecurityData>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ticker: impl Into<String>, data: SecurityData) {
        self.securities.insert(ticker.into(), data);
    }

    pub fn with(mut self, ticker: impl Into<String>, data: SecurityData) -> Self {
        self.insert(ticker, data);
        self
    }
}

impl MarketDataProvider for InMemoryMarketData {
    fn fetch_security_data(&self, ticker: &str) -> Result<SecurityData, FetchError> {
        self.securities
            .get(ticker)
            .cloned()
            .ok_or_else(|| FetchError::Permanent {
                resource: ticker.to_string(),
                reason: "ticker not found".into(),
            })
    }
}

/// Constant exchange rates into the base currency, keyed by currency code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedRates {
    to_base: HashMap<String, Decimal>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &Currency, rate: Decimal) -> Self {
        self.to_base.insert(from.code().to_string(), rate);
        self
    }
}

impl CurrencyConverter for FixedRates {
    fn average_rate(
        &self,
        from: &Currency,
        to: &Currency,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Decimal, FetchError> {
        if from == to {
            return Ok(Decimal::ONE);
        }
        let from_rate = self.to_base.get(from.code());
        let to_rate = if *to == crate::types::BASE_CURRENCY {
            Some(&Decimal::ONE)
        } else {
            self.to_base.get(to.code())
        };
        match (from_rate, to_rate) {
            (Some(f), Some(t)) if !t.is_zero() => Ok(*f / *t),
            _ => Err(FetchError::Permanent {
                resource: format!("{}/{}", from.code(), to.code()),
                reason: "no exchange rate configured".into(),
            }),
        }
    }
}

impl RiskFreeRateSource for Rate {
    fn fetch_risk_free_rate(&self) -> Result<Rate, FetchError> {
        Ok(*self)
    }
}
