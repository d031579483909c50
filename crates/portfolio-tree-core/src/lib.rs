pub mod aggregation;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod market_data;
pub mod math;
pub mod optimization;
pub mod security;
pub mod time_series;
pub mod types;

pub use config::PipelineConfig;
pub use error::PortfolioTreeError;
pub use hierarchy::{Category, PipelineStage, Portfolio, PortfolioReport, SubCategory};
pub use security::Security;
pub use types::*;

/// Standard result type for all portfolio-tree operations
pub type PortfolioTreeResult<T> = Result<T, PortfolioTreeError>;
