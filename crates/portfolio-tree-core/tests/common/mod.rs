#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};
use portfolio_tree_core::market_data::{InMemoryMarketData, SecurityData};
use portfolio_tree_core::time_series::{business_days, PricePoint};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const PATTERN: [Decimal; 7] = [
    dec!(0.6),
    dec!(-0.4),
    dec!(0.9),
    dec!(-0.8),
    dec!(0.2),
    dec!(-0.3),
    dec!(0.1),
];

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Three years of business-day closes. Each year has its own drift so
/// yearly returns differ; `step` shuffles the daily shock pattern so
/// different securities are not perfectly correlated.
pub fn synthetic_data(step: usize, amplitude: Decimal, drifts: [Decimal; 3]) -> SecurityData {
    let mut price = dec!(100);
    let prices = business_days(date(2021, 1, 1), date(2023, 12, 29))
        .into_iter()
        .enumerate()
        .map(|(i, day)| {
            let drift = drifts[(day.year() - 2021) as usize];
            price = (price * (Decimal::ONE + drift + amplitude * PATTERN[(i * step) % 7])).round_dp(4);
            PricePoint::new(day, price)
        })
        .collect();
    SecurityData {
        prices,
        dividend_yield: Some(dec!(0.015)),
        ..Default::default()
    }
}

pub fn equity_like(step: usize) -> SecurityData {
    synthetic_data(step, dec!(0.01), [dec!(0.0006), dec!(-0.0002), dec!(0.0008)])
}

pub fn bond_like(step: usize) -> SecurityData {
    synthetic_data(step, dec!(0.002), [dec!(0.0002), dec!(0.0001), dec!(0.00015)])
}

pub fn market() -> InMemoryMarketData {
    InMemoryMarketData::new()
        .with("VTI", equity_like(1))
        .with("VXUS", equity_like(2))
        .with("QQQ", equity_like(3))
        .with("BND", bond_like(4))
        .with("TLT", bond_like(5))
}
