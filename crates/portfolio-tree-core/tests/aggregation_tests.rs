mod common;

use portfolio_tree_core::aggregation::{aggregate_return_series, AggregationInput, NamedSeries};
use portfolio_tree_core::config::PipelineConfig;
use portfolio_tree_core::market_data::SecurityData;
use portfolio_tree_core::security::Security;
use portfolio_tree_core::time_series::{PricePoint, TimeSeries};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{date, equity_like};

fn series(points: &[(u32, Decimal)]) -> TimeSeries {
    points.iter().map(|(d, v)| (date(2024, 1, *d), *v)).collect()
}

#[test]
fn test_disjoint_gaps_are_filled_from_neighbours() {
    // A misses the 4th, B misses the 8th
    let a = series(&[
        (1, dec!(0.010)),
        (2, dec!(0.020)),
        (3, dec!(-0.010)),
        (5, dec!(0.005)),
        (8, dec!(0.000)),
    ]);
    let b = series(&[
        (1, dec!(0.011)),
        (2, dec!(0.019)),
        (3, dec!(-0.012)),
        (4, dec!(0.018)),
        (5, dec!(0.004)),
    ]);
    let input = AggregationInput {
        series: vec![
            NamedSeries { name: "A".into(), returns: a },
            NamedSeries { name: "B".into(), returns: b },
        ],
        weights: Some(vec![dec!(0.5), dec!(0.5)]),
        n_neighbors: 1,
        rounding_dp: 5,
    };
    let out = aggregate_return_series(&input).unwrap().result;

    assert_eq!(out.imputed_cells, 2);
    assert!(out.filled.is_complete());
    assert_eq!(out.filled.n_rows(), 6);

    // On the 4th B = 0.018 is closest to B on the 2nd (0.019), so A takes 0.020
    let a_col = out.filled.column("A").unwrap();
    assert_eq!(a_col.get(&date(2024, 1, 4)), Some(dec!(0.020)));
    assert_eq!(out.blended.get(&date(2024, 1, 4)), Some(dec!(0.019)));
}

/// Ten days of a straight line `slope × day`, without `gap_day`.
fn linear_with_gap(slope: Decimal, gap_day: u32) -> TimeSeries {
    (1..=10u32)
        .filter(|d| *d != gap_day)
        .map(|d| (date(2024, 1, d), slope * Decimal::from(d)))
        .collect()
}

#[test]
fn test_three_series_gaps_take_mean_of_five_nearest_rows() {
    let input = AggregationInput {
        series: vec![
            NamedSeries { name: "A".into(), returns: linear_with_gap(dec!(0.001), 3) },
            NamedSeries { name: "B".into(), returns: linear_with_gap(dec!(0.002), 6) },
            NamedSeries { name: "C".into(), returns: linear_with_gap(dec!(0.003), 9) },
        ],
        weights: None,
        n_neighbors: 5,
        rounding_dp: 5,
    };
    let out = aggregate_return_series(&input).unwrap().result;
    assert!(out.filled.is_complete());
    assert_eq!(out.imputed_cells, 3);

    // A on the 3rd: rows 2, 4, 1, 5 and 6 are nearest
    let a = out.filled.column("A").unwrap();
    assert_eq!(a.get(&date(2024, 1, 3)), Some(dec!(0.0036)));
    // B on the 6th: rows 5, 7, 9, 4 and 8
    let b = out.filled.column("B").unwrap();
    assert_eq!(b.get(&date(2024, 1, 6)), Some(dec!(0.0132)));
    // C on the 9th: rows 8, 10, 6, 7 and 5
    let c = out.filled.column("C").unwrap();
    assert_eq!(c.get(&date(2024, 1, 9)), Some(dec!(0.0216)));
    // observed cells are untouched
    assert_eq!(a.get(&date(2024, 1, 4)), Some(dec!(0.004)));
}

#[test]
fn test_all_missing_column_is_rejected() {
    let input = AggregationInput {
        series: vec![
            NamedSeries {
                name: "A".into(),
                returns: series(&[(1, dec!(0.01)), (2, dec!(0.02))]),
            },
            NamedSeries {
                name: "EMPTY".into(),
                returns: TimeSeries::new(),
            },
        ],
        weights: None,
        n_neighbors: 5,
        rounding_dp: 5,
    };
    assert!(aggregate_return_series(&input).is_err());
}

#[test]
fn test_rounding_is_idempotent() {
    let s = series(&[(1, dec!(0.1234567)), (2, dec!(-0.0000049))]);
    let once = s.round_dp(5);
    assert_eq!(once.round_dp(5), once);
    assert_eq!(once.get(&date(2024, 1, 2)), Some(Decimal::ZERO));
}

#[test]
fn test_security_statistics_from_synthetic_history() {
    let sec = Security::new("VTI", "Traditional Equity", "Equity")
        .with_market_data(equity_like(1))
        .with_settings(PipelineConfig::default().statistics_settings());
    let stats = sec.statistics();
    assert!(stats.geometric_mean_5y.is_some());
    assert!(stats.adjusted_geometric_mean_5y.unwrap() > stats.geometric_mean_5y.unwrap());
    assert!(stats.var_95.is_some());
    assert!(stats.sharpe_ratio.is_some());
    let returns = sec.adjusted_returns_in_series_5y().unwrap();
    assert_eq!(returns.len() + 1, sec.historical_data().unwrap().len());
}

#[test]
fn test_interior_price_gap_is_interpolated() {
    let data = SecurityData {
        prices: vec![
            PricePoint::new(date(2024, 1, 2), dec!(100)),
            PricePoint::new(date(2024, 1, 5), dec!(106)),
        ],
        ..Default::default()
    };
    let sec = Security::new("X", "Core", "Equity").with_market_data(data);
    let history = sec.historical_data().unwrap();
    assert_eq!(history.len(), 4);
    let mid = history.get(&date(2024, 1, 3)).unwrap();
    assert!(mid > dec!(100) && mid < dec!(106));
}
