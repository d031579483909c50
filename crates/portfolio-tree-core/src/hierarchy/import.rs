use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::market_data::{
    convert_to_base_currency, load_security_data, CurrencyConverter, MarketDataProvider,
    SecurityData,
};
use crate::security::Security;
use crate::types::Weight;
use crate::PortfolioTreeResult;

/// One row of an imported holdings list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub ticker: String,
    pub sub_category: String,
    pub category: String,
    /// Within-subcategory weight, used by the imported weight policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_weight: Option<Weight>,
}

impl HoldingRecord {
    pub fn new(
        ticker: impl Into<String>,
        sub_category: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            sub_category: sub_category.into(),
            category: category.into(),
            risk_weight: None,
        }
    }

    pub fn with_risk_weight(mut self, weight: Weight) -> Self {
        self.risk_weight = Some(weight);
        self
    }
}

/// A ticker whose market data could not be loaded. The security is still
/// added; its statistics report the data as unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFetch {
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<FailedFetch>,
}

/// Build a security from `record`, fetching its market data and restating
/// it in the base currency when a converter is supplied.
pub(crate) fn load_holding(
    record: &HoldingRecord,
    provider: &dyn MarketDataProvider,
    converter: Option<&dyn CurrencyConverter>,
    config: &PipelineConfig,
    summary: &mut ImportSummary,
) -> PortfolioTreeResult<Security> {
    let mut security = Security::new(&record.ticker, &record.sub_category, &record.category)
        .with_settings(config.statistics_settings());
    if let Some(weight) = record.risk_weight {
        security = security.with_imported_risk_weight(weight)?;
    }

    match fetch(record, provider, converter, config) {
        Ok(data) => security.set_market_data(Some(data)),
        Err(reason) => {
            warn!(ticker = %record.ticker, %reason, "market data unavailable");
            summary.failed.push(FailedFetch {
                ticker: record.ticker.clone(),
                reason,
            });
        }
    }
    Ok(security)
}

fn fetch(
    record: &HoldingRecord,
    provider: &dyn MarketDataProvider,
    converter: Option<&dyn CurrencyConverter>,
    config: &PipelineConfig,
) -> Result<SecurityData, String> {
    let data = load_security_data(
        provider,
        &record.ticker,
        &config.retry,
        config.price_quality.as_ref(),
    )
    .map_err(|e| e.to_string())?;
    match converter {
        Some(fx) => convert_to_base_currency(&record.ticker, data, fx, &config.retry)
            .map_err(|e| e.to_string()),
        None => Ok(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_json_with_optional_weight() {
        let rec: HoldingRecord = serde_json::from_str(
            r#"{"ticker": "VTI", "sub_category": "Traditional Equity", "category": "Equity"}"#,
        )
        .unwrap();
        assert_eq!(rec, HoldingRecord::new("VTI", "Traditional Equity", "Equity"));

        let rec: HoldingRecord = serde_json::from_str(
            r#"{"ticker": "GLD", "sub_category": "Metal", "category": "Alternative", "risk_weight": "0.4"}"#,
        )
        .unwrap();
        assert_eq!(rec.risk_weight, Some(dec!(0.4)));
    }

    #[test]
    fn test_unknown_ticker_is_recorded_not_fatal() {
        let provider = crate::market_data::InMemoryMarketData::new();
        let mut summary = ImportSummary::default();
        let mut config = PipelineConfig::default();
        config.retry = crate::market_data::RetryPolicy::no_backoff(1);
        let sec = load_holding(
            &HoldingRecord::new("NOPE", "Core", "Equity"),
            &provider,
            None,
            &config,
            &mut summary,
        )
        .unwrap();
        assert!(sec.market_data().is_none());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].ticker, "NOPE");
    }
}
