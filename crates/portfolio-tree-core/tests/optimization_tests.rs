use std::collections::BTreeMap;

use portfolio_tree_core::config::SolverSettings;
use portfolio_tree_core::optimization::{
    clean_weights, estimate, optimize_weights, ConstraintSpec, Objective, OptimizationRequest,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn capped_request(objective: Objective) -> OptimizationRequest {
    // X has by far the best return, so every objective wants more of it
    OptimizationRequest {
        entity_names: vec!["X".into(), "Y".into(), "Z".into()],
        expected_returns: vec![dec!(0.25), dec!(0.05), dec!(0.04)],
        covariance_matrix: vec![
            vec![dec!(0.0100), dec!(0.0010), dec!(0.0005)],
            vec![dec!(0.0010), dec!(0.0200), dec!(0.0010)],
            vec![dec!(0.0005), dec!(0.0010), dec!(0.0150)],
        ],
        downside_deviations: Some(vec![dec!(0.05), dec!(0.10), dec!(0.08)]),
        risk_free_rate: dec!(0.02),
        constraints: ConstraintSpec::Legacy(BTreeMap::from([("X_max".to_string(), dec!(0.2))])),
        objective,
    }
}

#[test]
fn test_upper_bound_holds_across_repeated_runs() {
    for objective in [
        Objective::MaxSharpe,
        Objective::MaxGeometricMean,
        Objective::MaxSortino,
    ] {
        for seed in 0..5u64 {
            let settings = SolverSettings {
                num_portfolios: 1_000,
                seed: Some(seed),
                ..SolverSettings::default()
            };
            let out = optimize_weights(&capped_request(objective), &settings).unwrap();
            let x = out.result.weight_of("X").unwrap();
            assert!(x <= dec!(0.2), "{objective:?} seed {seed}: X = {x}");
            let total: Decimal = out.result.weights.iter().map(|w| w.weight).sum();
            assert_eq!(total, Decimal::ONE);
        }
    }
}

#[test]
fn test_max_sharpe_is_deterministic() {
    let settings = SolverSettings::default();
    let a = optimize_weights(&capped_request(Objective::MaxSharpe), &settings).unwrap();
    let b = optimize_weights(&capped_request(Objective::MaxSharpe), &settings).unwrap();
    assert_eq!(a.result, b.result);
    // the cap binds
    assert!(a.result.weight_of("X").unwrap() >= dec!(0.199));
}

#[test]
fn test_infeasible_bounds_are_rejected() {
    let mut req = capped_request(Objective::MaxSharpe);
    req.constraints = ConstraintSpec::Legacy(BTreeMap::from([
        ("X_min".to_string(), dec!(0.6)),
        ("Y_min".to_string(), dec!(0.6)),
    ]));
    assert!(optimize_weights(&req, &SolverSettings::default()).is_err());
}

#[test]
fn test_cleaned_weights_are_stable_under_recleaning() {
    let bounds = vec![(Decimal::ZERO, Decimal::ONE); 3];
    let once = clean_weights(&[dec!(0.333333), dec!(0.333333), dec!(0.333334)], &bounds, 5);
    assert_eq!(clean_weights(&once, &bounds, 5), once);
    assert_eq!(once.iter().sum::<Decimal>(), Decimal::ONE);
}

#[test]
fn test_estimates_feed_the_optimizer() {
    let rows: Vec<Vec<Decimal>> = (0..60)
        .map(|i| {
            let shock = Decimal::from((i % 5) as i64 - 2) / dec!(1000);
            let bond_shock = Decimal::from(((i * 3) % 7) as i64 - 3) / dec!(2000);
            vec![dec!(0.0008) + shock, dec!(0.0002) + bond_shock]
        })
        .collect();
    let est = estimate(&rows, dec!(0.02)).unwrap();
    let req = OptimizationRequest {
        entity_names: vec!["Equity".into(), "Bond".into()],
        expected_returns: est.expected_returns,
        covariance_matrix: est.covariance_matrix,
        downside_deviations: Some(est.downside_deviations),
        risk_free_rate: dec!(0.02),
        constraints: ConstraintSpec::Legacy(BTreeMap::from([(
            "Equity_min".to_string(),
            dec!(0.6),
        )])),
        objective: Objective::MaxSharpe,
    };
    let out = optimize_weights(&req, &SolverSettings::default()).unwrap();
    assert!(out.result.weight_of("Equity").unwrap() >= dec!(0.6));
    assert!(out.result.sortino_ratio.is_some());
}
