mod common;

use std::collections::BTreeMap;

use portfolio_tree_core::config::{PipelineConfig, SubAssetWeightPolicy};
use portfolio_tree_core::hierarchy::{allocate_portfolio, AllocationInput, HoldingRecord};
use portfolio_tree_core::market_data::InMemoryMarketData;
use portfolio_tree_core::optimization::{
    ConstraintSet, ConstraintSpec, EntityWeight, OptimizationRequest, OptimizationResult,
    WeightOptimizer,
};
use portfolio_tree_core::{PipelineStage, Portfolio, PortfolioTreeError, PortfolioTreeResult};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

use common::{bond_like, equity_like, market};

fn holdings() -> Vec<HoldingRecord> {
    vec![
        HoldingRecord::new("VTI", "Traditional Equity", "Equity"),
        HoldingRecord::new("VXUS", "Traditional Equity", "Equity"),
        HoldingRecord::new("QQQ", "Growth", "Equity"),
        HoldingRecord::new("BND", "Aggregate", "Bond"),
        HoldingRecord::new("TLT", "Treasury", "Bond"),
    ]
}

fn equity_min_config() -> PipelineConfig {
    PipelineConfig {
        constraints: ConstraintSet {
            category: ConstraintSpec::Legacy(BTreeMap::from([(
                "Equity_min".to_string(),
                dec!(0.6),
            )])),
            sub_category: BTreeMap::new(),
        },
        total_portfolio_value: Some(dec!(100000)),
        ..PipelineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// End-to-end pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_equity_bond_pipeline_respects_equity_minimum() {
    let mut portfolio = Portfolio::new(equity_min_config()).unwrap();
    let summary = portfolio.add_holdings(&holdings(), &market(), None).unwrap();
    assert_eq!(summary.added.len(), 5);
    assert!(summary.failed.is_empty());

    let report = portfolio.run().unwrap();
    assert_eq!(report.stage, PipelineStage::WeightsFinalized);

    let equity = report.category("Equity").unwrap().weight.unwrap();
    assert!(equity >= dec!(0.6) - dec!(0.00001), "equity weight {equity}");

    let total: Decimal = report
        .securities
        .iter()
        .map(|s| s.portfolio_asset_weight.unwrap())
        .sum();
    assert!((total - Decimal::ONE).abs() <= dec!(0.01), "total {total}");
    assert_eq!(report.total_weight, total);

    for s in &report.securities {
        let w = s.portfolio_asset_weight.unwrap();
        assert!(w >= Decimal::ZERO && w <= Decimal::ONE);
        assert!(s.allocation.is_some());
        assert!(s.standard_deviation_5y.unwrap() > Decimal::ZERO);
    }

    // weight = sub-asset × subcategory × category
    let vti = portfolio.security("VTI").unwrap();
    let sub = portfolio
        .category("Equity")
        .unwrap()
        .sub_category("Traditional Equity")
        .unwrap();
    assert_eq!(
        vti.portfolio_asset_weight().unwrap(),
        vti.sub_asset_weight().unwrap() * (sub.sub_category_weight().unwrap() * equity)
    );

    assert!(report.categories.iter().all(|c| c.returns.is_some()));
    assert!(report.sub_categories.iter().all(|c| c.returns.is_some()));

    for category in portfolio.categories() {
        let sub_total: Decimal = category
            .sub_categories()
            .iter()
            .map(|s| s.sub_category_weight().unwrap())
            .sum();
        assert!(
            (sub_total - Decimal::ONE).abs() <= dec!(0.00001),
            "{}: subcategory weights sum to {sub_total}",
            category.name()
        );
    }
}

#[test]
fn test_geometric_mean_matches_year_end_cagr() {
    let mut portfolio = Portfolio::new(equity_min_config()).unwrap();
    portfolio.add_holdings(&holdings(), &market(), None).unwrap();
    for security in portfolio.securities() {
        let year_ends = security.historical_data().unwrap().year_end().values();
        let years = Decimal::from(year_ends.len() as i64 - 1);
        let growth = *year_ends.last().unwrap() / year_ends[0];
        let expected = growth.powd(Decimal::ONE / years) - Decimal::ONE;
        let actual = security.geometric_mean_5y().unwrap();
        assert!(
            (actual - expected).abs() <= dec!(0.00001),
            "{}: {actual} vs {expected}",
            security.ticker()
        );
    }
}

#[test]
fn test_allocate_portfolio_wraps_report() {
    let input = AllocationInput {
        holdings: holdings(),
        market_data: market(),
        fx_rates: None,
        config: equity_min_config(),
    };
    let out = allocate_portfolio(&input).unwrap();
    assert_eq!(out.result.report.securities.len(), 5);
    assert!(out.methodology.contains("Hierarchical"));
}

#[test]
fn test_removing_a_security_resets_the_pipeline() {
    let mut portfolio = Portfolio::new(equity_min_config()).unwrap();
    portfolio.add_holdings(&holdings(), &market(), None).unwrap();
    portfolio.run().unwrap();

    let removed = portfolio.remove_securities(&["QQQ"]);
    assert_eq!(removed.len(), 1);
    assert_eq!(portfolio.stage(), PipelineStage::TreeBuilt);
    assert!(portfolio
        .category("Equity")
        .unwrap()
        .sub_category("Growth")
        .is_none());
    assert!(portfolio.securities().all(|s| s.portfolio_asset_weight().is_none()));

    let report = portfolio.run().unwrap();
    assert_eq!(report.securities.len(), 4);
}

#[test]
fn test_sync_holdings_adds_and_drops() {
    let mut portfolio = Portfolio::new(equity_min_config()).unwrap();
    portfolio.add_holdings(&holdings(), &market(), None).unwrap();

    let mut wanted = holdings();
    wanted.retain(|h| h.ticker != "TLT");
    wanted.push(HoldingRecord::new("IEF", "Treasury", "Bond"));
    let provider = market().with("IEF", bond_like(6));

    let summary = portfolio.sync_holdings(&wanted, &provider, None).unwrap();
    assert_eq!(summary.removed, vec!["TLT".to_string()]);
    assert_eq!(summary.added, vec!["IEF".to_string()]);
    assert_eq!(summary.unchanged.len(), 4);
    assert!(portfolio.security("TLT").is_none());
    assert!(portfolio.security("IEF").is_some());
}

#[test]
fn test_unknown_ticker_without_weight_does_not_abort() {
    let mut portfolio = Portfolio::new(equity_min_config()).unwrap();
    let mut records = holdings();
    records.push(HoldingRecord::new("GHOST", "Growth", "Equity"));
    let summary = portfolio.add_holdings(&records, &market(), None).unwrap();
    assert_eq!(summary.failed.len(), 1);

    let report = portfolio.run().unwrap();
    let ghost = report.security("GHOST").unwrap();
    assert_eq!(ghost.portfolio_asset_weight, Some(Decimal::ZERO));
    assert!(!ghost.unavailable.is_empty());
}

// ---------------------------------------------------------------------------
// Weight composition with a fixed optimizer
// ---------------------------------------------------------------------------

struct FixedWeights(BTreeMap<&'static str, Decimal>);

impl WeightOptimizer for FixedWeights {
    fn optimize(&self, request: &OptimizationRequest) -> PortfolioTreeResult<OptimizationResult> {
        Ok(OptimizationResult {
            weights: request
                .entity_names
                .iter()
                .map(|name| EntityWeight {
                    name: name.clone(),
                    weight: self.0.get(name.as_str()).copied().unwrap_or(Decimal::ONE),
                })
                .collect(),
            expected_return: Decimal::ZERO,
            volatility: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            sortino_ratio: None,
        })
    }
}

fn imported_portfolio() -> Portfolio {
    let config = PipelineConfig {
        weight_policy: SubAssetWeightPolicy::Imported,
        ..PipelineConfig::default()
    };
    let mut portfolio = Portfolio::new(config).unwrap();
    let provider = InMemoryMarketData::new()
        .with("A", equity_like(1))
        .with("B", equity_like(2))
        .with("C", equity_like(3))
        .with("D", bond_like(4));
    let records = vec![
        HoldingRecord::new("A", "Core", "Equity").with_risk_weight(dec!(0.4)),
        HoldingRecord::new("B", "Core", "Equity").with_risk_weight(dec!(0.6)),
        HoldingRecord::new("C", "Growth", "Equity").with_risk_weight(Decimal::ONE),
        HoldingRecord::new("D", "Aggregate", "Bond").with_risk_weight(Decimal::ONE),
    ];
    portfolio.add_holdings(&records, &provider, None).unwrap();
    portfolio
}

#[test]
fn test_portfolio_weight_is_product_of_levels() {
    let optimizer = FixedWeights(BTreeMap::from([
        ("Core", dec!(0.5)),
        ("Growth", dec!(0.5)),
        ("Equity", dec!(0.6)),
        ("Bond", dec!(0.4)),
    ]));
    let mut portfolio = imported_portfolio();
    let report = portfolio.run_with(&optimizer).unwrap();

    assert_eq!(report.security("A").unwrap().portfolio_asset_weight, Some(dec!(0.12)));
    assert_eq!(report.security("B").unwrap().portfolio_asset_weight, Some(dec!(0.18)));
    assert_eq!(report.security("C").unwrap().portfolio_asset_weight, Some(dec!(0.30)));
    assert_eq!(report.security("D").unwrap().portfolio_asset_weight, Some(dec!(0.4)));
    assert_eq!(report.total_weight, Decimal::ONE);
}

#[test]
fn test_category_weights_off_by_more_than_tolerance_fail_finalization() {
    let optimizer = FixedWeights(BTreeMap::from([
        ("Core", dec!(0.5)),
        ("Growth", dec!(0.5)),
        ("Equity", dec!(0.6)),
        ("Bond", dec!(0.3)),
    ]));
    let mut portfolio = imported_portfolio();
    let err = portfolio.run_with(&optimizer).unwrap_err();
    assert!(matches!(
        err,
        PortfolioTreeError::WeightSumMismatch { ref entity, .. } if entity == "portfolio"
    ));
    assert_eq!(portfolio.stage(), PipelineStage::CategoryOptimized);
    assert!(portfolio.securities().all(|s| s.portfolio_asset_weight().is_none()));
    assert_eq!(portfolio.report().total_weight, Decimal::ZERO);
}

#[test]
fn test_optimizer_omitting_an_entity_is_rejected() {
    struct DropsLast;
    impl WeightOptimizer for DropsLast {
        fn optimize(&self, request: &OptimizationRequest) -> PortfolioTreeResult<OptimizationResult> {
            let n = request.entity_names.len();
            Ok(OptimizationResult {
                weights: request
                    .entity_names
                    .iter()
                    .take(n.saturating_sub(1).max(1))
                    .map(|name| EntityWeight {
                        name: name.clone(),
                        weight: Decimal::ONE,
                    })
                    .collect(),
                expected_return: Decimal::ZERO,
                volatility: Decimal::ZERO,
                sharpe_ratio: Decimal::ZERO,
                sortino_ratio: None,
            })
        }
    }
    let mut portfolio = imported_portfolio();
    let err = portfolio.run_with(&DropsLast).unwrap_err();
    assert!(matches!(err, PortfolioTreeError::MissingWeight { ref entity } if entity == "Growth"));
}
