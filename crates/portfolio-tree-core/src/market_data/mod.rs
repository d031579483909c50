pub mod provider;
pub mod rates;
pub mod retry;

pub use provider::{
    CurrencyConverter, DividendEvent, FetchError, FixedRates, InMemoryMarketData,
    MarketDataProvider, RiskFreeRateSource, SecurityData, SecurityProfile,
};
pub use rates::{convert_to_base_currency, resolve_risk_free_rate};
pub use retry::{check_price_quality, load_security_data, retry_transient, QualityThresholds, RetryPolicy};
