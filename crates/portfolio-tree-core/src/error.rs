use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market_data::FetchError;

/// Why a statistic could not be produced for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingInputReason {
    /// No market data was attached, or the price history is empty.
    EmptyHistory,
    /// The history does not span two calendar year-ends.
    NoYearlyReturns,
    /// Sample statistics need at least two yearly returns.
    InsufficientYearlyReturns,
    /// Fewer than two daily observations.
    NoDailyReturns,
    MissingDividendYield,
    MissingRiskFreeRate,
    /// Standard deviation is zero, so ratios over it are undefined.
    ZeroVolatility,
}

impl std::fmt::Display for MissingInputReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            MissingInputReason::EmptyHistory => "historical data is missing or empty",
            MissingInputReason::NoYearlyReturns => "no yearly returns available",
            MissingInputReason::InsufficientYearlyReturns => {
                "at least two yearly returns are required"
            }
            MissingInputReason::NoDailyReturns => "no daily returns available",
            MissingInputReason::MissingDividendYield => "dividend yield is missing",
            MissingInputReason::MissingRiskFreeRate => "risk-free rate is missing",
            MissingInputReason::ZeroVolatility => "standard deviation is zero",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum PortfolioTreeError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Weight out of range for {entity}: {weight} is not within [0, 1]")]
    WeightOutOfRange { entity: String, weight: Decimal },

    #[error("Weights of {entity} sum to {sum}, expected 1 ± {tolerance}")]
    WeightSumMismatch {
        entity: String,
        sum: Decimal,
        tolerance: Decimal,
    },

    #[error("Total inverse risk is zero in {entity}: every security has zero standard deviation")]
    ZeroTotalInverseRisk { entity: String },

    #[error("No usable data: column '{column}' is entirely missing")]
    NoUsableData { column: String },

    #[error("No optimized weight found for '{entity}'")]
    MissingWeight { entity: String },

    #[error("Optimizer returned a weight for unknown entity '{entity}'")]
    UnexpectedWeight { entity: String },

    #[error("Missing required input for {entity}: {reason}")]
    MissingInput {
        entity: String,
        reason: MissingInputReason,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Financial impossibility: {0}")]
    FinancialImpossibility(String),

    #[error("Market data error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PortfolioTreeError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioTreeError::SerializationError(e.to_string())
    }
}

impl PortfolioTreeError {
    pub(crate) fn missing(entity: &str, reason: MissingInputReason) -> Self {
        PortfolioTreeError::MissingInput {
            entity: entity.to_string(),
            reason,
        }
    }
}
