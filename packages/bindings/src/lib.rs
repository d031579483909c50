use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Securities
// ---------------------------------------------------------------------------

#[napi]
pub fn security_statistics(input_json: String) -> NapiResult<String> {
    let input: portfolio_tree_core::security::StatisticsInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = portfolio_tree_core::security::compute_security_statistics(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[napi]
pub fn aggregate_returns(input_json: String) -> NapiResult<String> {
    let input: portfolio_tree_core::aggregation::AggregationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = portfolio_tree_core::aggregation::aggregate_return_series(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_weights(input_json: String, solver_json: Option<String>) -> NapiResult<String> {
    let request: portfolio_tree_core::optimization::OptimizationRequest =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let solver: portfolio_tree_core::config::SolverSettings = match solver_json {
        Some(json) => serde_json::from_str(&json).map_err(to_napi_error)?,
        None => Default::default(),
    };
    let output = portfolio_tree_core::optimization::optimize_weights(&request, &solver)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Full pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn allocate_portfolio(input_json: String) -> NapiResult<String> {
    let input: portfolio_tree_core::hierarchy::AllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        portfolio_tree_core::hierarchy::allocate_portfolio(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
