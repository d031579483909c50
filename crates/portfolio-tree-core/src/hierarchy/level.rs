use tracing::{debug, warn};

use crate::aggregation::fill_return_series;
use crate::optimization::{
    estimate, ConstraintSpec, Objective, OptimizationRequest, OptimizationResult,
    WeightConstraint, WeightOptimizer,
};
use crate::time_series::TimeSeries;
use crate::types::Rate;
use crate::PortfolioTreeResult;

/// Inputs shared by every optimized level of one pipeline run.
#[derive(Clone, Copy)]
pub struct LevelSettings<'a> {
    pub optimizer: &'a dyn WeightOptimizer,
    pub objective: Objective,
    pub risk_free_rate: Rate,
    pub n_neighbors: usize,
    pub rounding_dp: u32,
}

/// Optimize the weights of `children` from their blended return series.
///
/// Constraints naming an entity that is not present at this level are
/// dropped with a warning, so a shared constraint set can describe
/// portfolios that do not hold every category.
pub(crate) fn optimize_level(
    level: &str,
    children: &[(&str, &TimeSeries)],
    constraints: Vec<WeightConstraint>,
    settings: &LevelSettings<'_>,
) -> PortfolioTreeResult<OptimizationResult> {
    let names: Vec<String> = children.iter().map(|(n, _)| n.to_string()).collect();

    let (kept, dropped): (Vec<_>, Vec<_>) = constraints
        .into_iter()
        .partition(|c| names.contains(&c.entity));
    for c in &dropped {
        warn!(level, constraint = %c.key(), "constraint names an entity absent from this level");
    }

    let frame = fill_return_series(children.iter().copied(), settings.n_neighbors, settings.rounding_dp)?;
    let rows = frame.to_matrix()?;
    let estimates = estimate(&rows, settings.risk_free_rate)?;
    debug!(
        level,
        entities = names.len(),
        observations = rows.len(),
        shrinkage = %estimates.shrinkage,
        "estimated level returns"
    );

    let request = OptimizationRequest {
        entity_names: names.clone(),
        expected_returns: estimates.expected_returns,
        covariance_matrix: estimates.covariance_matrix,
        downside_deviations: Some(estimates.downside_deviations),
        risk_free_rate: settings.risk_free_rate,
        constraints: ConstraintSpec::Structured(kept),
        objective: settings.objective,
    };
    let result = settings.optimizer.optimize(&request)?;
    result.verify_against(&names)?;
    Ok(result)
}
