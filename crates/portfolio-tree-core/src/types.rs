use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PortfolioTreeError;
use crate::PortfolioTreeResult;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Capital weights in [0, 1].
pub type Weight = Decimal;

/// Base currency every price series is converted into.
pub const BASE_CURRENCY: Currency = Currency::USD;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    GBP,
    #[default]
    USD,
    EUR,
    CHF,
    JPY,
    CAD,
    AUD,
    HKD,
    SGD,
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::GBP => "GBP",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::CHF => "CHF",
            Currency::JPY => "JPY",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::HKD => "HKD",
            Currency::SGD => "SGD",
            Currency::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "GBP" => Currency::GBP,
            "USD" => Currency::USD,
            "EUR" => Currency::EUR,
            "CHF" => Currency::CHF,
            "JPY" => Currency::JPY,
            "CAD" => Currency::CAD,
            "AUD" => Currency::AUD,
            "HKD" => Currency::HKD,
            "SGD" => Currency::SGD,
            other => Currency::Other(other.to_string()),
        }
    }
}

/// Broad asset class a security is bucketed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    #[default]
    Equity,
    Bond,
    Reit,
    Metal,
    Commodity,
    Currency,
    Alternative,
    Other(String),
}

impl AssetClass {
    /// Map a category label from the import feed onto an asset class.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "equity" | "equities" => AssetClass::Equity,
            "bond" | "bonds" | "fixed income" => AssetClass::Bond,
            "reit" | "real estate" => AssetClass::Reit,
            "metal" | "metals" => AssetClass::Metal,
            "commodity" | "commodities" => AssetClass::Commodity,
            "currency" | "currencies" => AssetClass::Currency,
            "alternative" | "alternatives" => AssetClass::Alternative,
            _ => AssetClass::Other(label.trim().to_string()),
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

/// Reject any weight outside [0, 1].
pub fn ensure_unit_interval(entity: &str, weight: Weight) -> PortfolioTreeResult<Weight> {
    if weight < Decimal::ZERO || weight > Decimal::ONE {
        return Err(PortfolioTreeError::WeightOutOfRange {
            entity: entity.to_string(),
            weight,
        });
    }
    Ok(weight)
}
