pub mod constraints;
pub mod estimators;
pub mod mean_variance;
pub mod random_search;

pub use constraints::{resolve_bounds, BoundKind, ConstraintSet, ConstraintSpec, WeightConstraint};
pub use estimators::{estimate, ledoit_wolf_covariance, mean_historical_return, ReturnEstimates};
pub use mean_variance::{clean_weights, project_onto_bounds};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::config::SolverSettings;
use crate::error::PortfolioTreeError;
use crate::types::{with_metadata, ComputationOutput, Rate, Weight};
use crate::PortfolioTreeResult;
use mean_variance::{
    compute_sharpe, max_sharpe_weights, portfolio_std, validate_covariance_matrix, vec_dot,
};
use random_search::{dot, quadratic_form, random_search};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the optimizer maximizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Tangency portfolio against the covariance matrix.
    #[default]
    MaxSharpe,
    /// Approximate long-run growth `w·μ − ½w'Σw`, by random search.
    MaxGeometricMean,
    /// `(w·μ − rf) / w·d` against downside deviations, by random search.
    MaxSortino,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub entity_names: Vec<String>,
    /// Annualized, in `entity_names` order.
    pub expected_returns: Vec<Rate>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
    /// Required by [`Objective::MaxSortino`]; also enables the Sortino
    /// ratio in the result.
    #[serde(default)]
    pub downside_deviations: Option<Vec<Decimal>>,
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub constraints: ConstraintSpec,
    #[serde(default)]
    pub objective: Objective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWeight {
    pub name: String,
    pub weight: Weight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: Vec<EntityWeight>,
    pub expected_return: Rate,
    pub volatility: Decimal,
    pub sharpe_ratio: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortino_ratio: Option<Decimal>,
}

impl OptimizationResult {
    pub fn weight_of(&self, name: &str) -> Option<Weight> {
        self.weights.iter().find(|w| w.name == name).map(|w| w.weight)
    }

    /// The result must name exactly the requested entities.
    pub fn verify_against(&self, names: &[String]) -> PortfolioTreeResult<()> {
        if let Some(missing) = names.iter().find(|n| self.weight_of(n).is_none()) {
            return Err(PortfolioTreeError::MissingWeight {
                entity: missing.clone(),
            });
        }
        if let Some(extra) = self.weights.iter().find(|w| !names.contains(&w.name)) {
            return Err(PortfolioTreeError::UnexpectedWeight {
                entity: extra.name.clone(),
            });
        }
        Ok(())
    }
}

/// Weight-assignment strategy applied at one level of the tree.
pub trait WeightOptimizer {
    fn optimize(&self, request: &OptimizationRequest) -> PortfolioTreeResult<OptimizationResult>;
}

/// Built-in optimizer: analytic / projected-gradient Sharpe maximization and
/// seeded random search for the other objectives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstrainedOptimizer {
    pub settings: SolverSettings,
}

impl ConstrainedOptimizer {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }
}

impl WeightOptimizer for ConstrainedOptimizer {
    fn optimize(&self, request: &OptimizationRequest) -> PortfolioTreeResult<OptimizationResult> {
        let n = request.entity_names.len();
        validate_request(request)?;
        let constraints = request.constraints.resolve()?;
        let bounds = resolve_bounds(&request.entity_names, &constraints)?;

        let mu = &request.expected_returns;
        let sigma = &request.covariance_matrix;
        let rf = request.risk_free_rate;

        let raw = if n == 1 {
            vec![Decimal::ONE]
        } else {
            match request.objective {
                Objective::MaxSharpe => {
                    max_sharpe_weights(mu, sigma, rf, &bounds, self.settings.max_iterations)
                }
                Objective::MaxGeometricMean => {
                    let mu_f = to_f64_vec(mu)?;
                    let sigma_f = sigma
                        .iter()
                        .map(|r| to_f64_vec(r))
                        .collect::<PortfolioTreeResult<Vec<_>>>()?;
                    let bounds_f = to_f64_bounds(&bounds)?;
                    let (w, _) = random_search(&bounds_f, &self.settings, |w| {
                        Some(dot(w, &mu_f) - 0.5 * quadratic_form(w, &sigma_f))
                    })
                    .ok_or_else(|| {
                        PortfolioTreeError::InsufficientData("no random portfolio was drawn".into())
                    })?;
                    from_f64_vec(&w)?
                }
                Objective::MaxSortino => {
                    let downside = request.downside_deviations.as_ref().ok_or_else(|| {
                        PortfolioTreeError::InvalidInput {
                            field: "downside_deviations".into(),
                            reason: "required for the max_sortino objective".into(),
                        }
                    })?;
                    let mu_f = to_f64_vec(mu)?;
                    let d_f = to_f64_vec(downside)?;
                    let rf_f = to_f64(rf)?;
                    let target = to_f64(self.settings.target_return)?;
                    let bounds_f = to_f64_bounds(&bounds)?;
                    let (w, _) = random_search(&bounds_f, &self.settings, |w| {
                        let ret = dot(w, &mu_f);
                        let dd = dot(w, &d_f);
                        if ret < target || dd <= 0.0 {
                            None
                        } else {
                            Some((ret - rf_f) / dd)
                        }
                    })
                    .ok_or_else(|| {
                        PortfolioTreeError::FinancialImpossibility(format!(
                            "no portfolio reaches the target return {}",
                            self.settings.target_return
                        ))
                    })?;
                    from_f64_vec(&w)?
                }
            }
        };

        let projected = project_onto_bounds(&raw, &bounds);
        let weights = clean_weights(&projected, &bounds, 5);

        let expected_return = vec_dot(&weights, mu);
        let volatility = portfolio_std(&weights, sigma);
        let sharpe_ratio = compute_sharpe(expected_return, rf, volatility);
        let sortino_ratio = request.downside_deviations.as_ref().and_then(|d| {
            let dd = vec_dot(&weights, d);
            if dd.is_zero() {
                None
            } else {
                Some((expected_return - rf) / dd)
            }
        });

        debug!(
            objective = ?request.objective,
            n_entities = n,
            %expected_return,
            %volatility,
            "optimized weights"
        );

        Ok(OptimizationResult {
            weights: request
                .entity_names
                .iter()
                .zip(weights)
                .map(|(name, weight)| EntityWeight {
                    name: name.clone(),
                    weight,
                })
                .collect(),
            expected_return,
            volatility,
            sharpe_ratio,
            sortino_ratio,
        })
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Optimize one level's weights and wrap the result with metadata.
pub fn optimize_weights(
    request: &OptimizationRequest,
    settings: &SolverSettings,
) -> PortfolioTreeResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    let result = ConstrainedOptimizer::new(*settings).optimize(request)?;
    result.verify_against(&request.entity_names)?;

    let mut warnings: Vec<String> = Vec::new();
    for ew in &result.weights {
        if ew.weight > dec!(0.40) {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                ew.name, ew.weight
            ));
        }
    }
    let hhi: Decimal = result.weights.iter().map(|w| w.weight * w.weight).sum();
    if hhi > dec!(0.5) {
        warnings.push(format!("High concentration: HHI = {:.4}", hhi));
    }
    if result.volatility > dec!(0.30) {
        warnings.push(format!("High portfolio volatility: {:.4}", result.volatility));
    }

    let methodology = match request.objective {
        Objective::MaxSharpe => "Constrained mean-variance optimization (max Sharpe)",
        Objective::MaxGeometricMean => "Random portfolio search (max geometric mean)",
        Objective::MaxSortino => "Random portfolio search (max Sortino)",
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "n_entities": request.entity_names.len(),
            "risk_free_rate": request.risk_free_rate.to_string(),
            "long_only": true,
            "num_portfolios": settings.num_portfolios,
            "seed": settings.seed,
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Validation and conversion
// ---------------------------------------------------------------------------

fn validate_request(request: &OptimizationRequest) -> PortfolioTreeResult<()> {
    let n = request.entity_names.len();
    if n == 0 {
        return Err(PortfolioTreeError::InsufficientData(
            "At least one entity required".into(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    if let Some(dup) = request.entity_names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(PortfolioTreeError::InvalidInput {
            field: "entity_names".into(),
            reason: format!("duplicate entity '{dup}'"),
        });
    }
    if request.expected_returns.len() != n {
        return Err(PortfolioTreeError::InvalidInput {
            field: "expected_returns".into(),
            reason: format!(
                "Expected {} returns but got {}",
                n,
                request.expected_returns.len()
            ),
        });
    }
    if let Some(ref d) = request.downside_deviations {
        if d.len() != n {
            return Err(PortfolioTreeError::InvalidInput {
                field: "downside_deviations".into(),
                reason: format!("Expected {} values but got {}", n, d.len()),
            });
        }
    }
    validate_covariance_matrix(&request.covariance_matrix, n)
}

fn to_f64(value: Decimal) -> PortfolioTreeResult<f64> {
    value.to_f64().ok_or_else(|| PortfolioTreeError::InvalidInput {
        field: "optimizer input".into(),
        reason: format!("{value} is not representable as f64"),
    })
}

fn to_f64_vec(values: &[Decimal]) -> PortfolioTreeResult<Vec<f64>> {
    values.iter().map(|v| to_f64(*v)).collect()
}

fn to_f64_bounds(bounds: &[(Decimal, Decimal)]) -> PortfolioTreeResult<Vec<(f64, f64)>> {
    bounds
        .iter()
        .map(|(lo, hi)| Ok((to_f64(*lo)?, to_f64(*hi)?)))
        .collect()
}

fn from_f64_vec(values: &[f64]) -> PortfolioTreeResult<Vec<Decimal>> {
    values
        .iter()
        .map(|v| {
            Decimal::from_f64(*v).ok_or_else(|| {
                PortfolioTreeError::FinancialImpossibility(format!("weight {v} is not finite"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn request(objective: Objective) -> OptimizationRequest {
        OptimizationRequest {
            entity_names: vec!["Equity".into(), "Bond".into(), "Alternative".into()],
            expected_returns: vec![dec!(0.09), dec!(0.04), dec!(0.06)],
            covariance_matrix: vec![
                vec![dec!(0.0400), dec!(0.0020), dec!(0.0060)],
                vec![dec!(0.0020), dec!(0.0036), dec!(0.0010)],
                vec![dec!(0.0060), dec!(0.0010), dec!(0.0225)],
            ],
            downside_deviations: Some(vec![dec!(0.12), dec!(0.03), dec!(0.09)]),
            risk_free_rate: dec!(0.02),
            constraints: ConstraintSpec::Legacy(BTreeMap::from([
                ("Equity_min".to_string(), dec!(0.3)),
                ("Alternative_max".to_string(), dec!(0.2)),
            ])),
            objective,
        }
    }

    fn seeded() -> SolverSettings {
        SolverSettings {
            num_portfolios: 2_000,
            seed: Some(17),
            ..SolverSettings::default()
        }
    }

    fn check_feasible(result: &OptimizationResult) {
        let total: Decimal = result.weights.iter().map(|w| w.weight).sum();
        assert_eq!(total, Decimal::ONE);
        assert!(result.weight_of("Equity").unwrap() >= dec!(0.3));
        assert!(result.weight_of("Alternative").unwrap() <= dec!(0.2));
        assert!(result.weights.iter().all(|w| w.weight >= Decimal::ZERO));
    }

    #[test]
    fn test_every_objective_respects_constraints() {
        for objective in [
            Objective::MaxSharpe,
            Objective::MaxGeometricMean,
            Objective::MaxSortino,
        ] {
            let out = optimize_weights(&request(objective), &seeded()).unwrap();
            check_feasible(&out.result);
            assert!(out.result.sortino_ratio.is_some());
        }
    }

    #[test]
    fn test_single_entity_gets_everything() {
        let req = OptimizationRequest {
            entity_names: vec!["Only".into()],
            expected_returns: vec![dec!(0.05)],
            covariance_matrix: vec![vec![dec!(0.01)]],
            downside_deviations: None,
            risk_free_rate: dec!(0.02),
            constraints: ConstraintSpec::default(),
            objective: Objective::MaxSharpe,
        };
        let out = ConstrainedOptimizer::default().optimize(&req).unwrap();
        assert_eq!(out.weight_of("Only"), Some(Decimal::ONE));
        assert_eq!(out.sortino_ratio, None);
    }

    #[test]
    fn test_sortino_requires_downside() {
        let mut req = request(Objective::MaxSortino);
        req.downside_deviations = None;
        assert!(ConstrainedOptimizer::new(seeded()).optimize(&req).is_err());
    }

    #[test]
    fn test_unknown_constraint_entity_rejected() {
        let mut req = request(Objective::MaxSharpe);
        req.constraints = ConstraintSpec::Structured(vec![WeightConstraint::max("Crypto", dec!(0.1))]);
        assert!(ConstrainedOptimizer::default().optimize(&req).is_err());
    }

    #[test]
    fn test_verify_against_detects_mismatch() {
        let result = OptimizationResult {
            weights: vec![EntityWeight {
                name: "A".into(),
                weight: Decimal::ONE,
            }],
            expected_return: Decimal::ZERO,
            volatility: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            sortino_ratio: None,
        };
        assert!(matches!(
            result.verify_against(&["A".to_string(), "B".to_string()]),
            Err(PortfolioTreeError::MissingWeight { .. })
        ));
        assert!(matches!(
            result.verify_against(&[]),
            Err(PortfolioTreeError::UnexpectedWeight { .. })
        ));
    }

    #[test]
    fn test_request_accepts_legacy_constraint_json() {
        let req: OptimizationRequest = serde_json::from_str(
            r#"{
                "entity_names": ["A", "B"],
                "expected_returns": ["0.08", "0.03"],
                "covariance_matrix": [["0.04", "0"], ["0", "0.01"]],
                "risk_free_rate": "0.02",
                "constraints": {"A_max": "0.5"},
                "objective": "max_sharpe"
            }"#,
        )
        .unwrap();
        let out = ConstrainedOptimizer::default().optimize(&req).unwrap();
        assert!(out.weight_of("A").unwrap() <= dec!(0.5));
    }
}
