pub mod interpolation;
pub mod series;

pub use interpolation::{business_days, is_business_day, resample_business_days, PricePoint};
pub use series::TimeSeries;
