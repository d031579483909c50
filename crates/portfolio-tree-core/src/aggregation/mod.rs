pub mod frame;
pub mod knn;

pub use frame::ReturnFrame;
pub use knn::KnnImputer;

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::time_series::TimeSeries;
use crate::types::{with_metadata, ComputationOutput, Weight};
use crate::PortfolioTreeResult;

/// Outer-join, impute and round a set of named return series.
pub fn fill_return_series<'a, I, S>(
    series: I,
    n_neighbors: usize,
    rounding_dp: u32,
) -> PortfolioTreeResult<ReturnFrame>
where
    I: IntoIterator<Item = (S, &'a TimeSeries)>,
    S: Into<String>,
{
    let joined = ReturnFrame::outer_join(series);
    let filled = KnnImputer::new(n_neighbors).fill(&joined)?;
    Ok(filled.round_dp(rounding_dp))
}

// ---------------------------------------------------------------------------
// Standalone aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedSeries {
    pub name: String,
    pub returns: TimeSeries,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationInput {
    pub series: Vec<NamedSeries>,
    /// Blend weights in `series` order; equal weights when omitted.
    #[serde(default)]
    pub weights: Option<Vec<Weight>>,
    #[serde(default = "default_neighbors")]
    pub n_neighbors: usize,
    #[serde(default = "default_rounding")]
    pub rounding_dp: u32,
}

fn default_neighbors() -> usize {
    5
}

fn default_rounding() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationOutput {
    pub filled: ReturnFrame,
    pub blended: TimeSeries,
    pub imputed_cells: usize,
}

/// Fill gaps across the input series and blend them into one series.
pub fn aggregate_return_series(
    input: &AggregationInput,
) -> PortfolioTreeResult<ComputationOutput<AggregationOutput>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let joined = ReturnFrame::outer_join(input.series.iter().map(|s| (s.name.as_str(), &s.returns)));
    let imputed_cells = joined.missing_count();
    if joined.n_rows() > 0 && imputed_cells * 5 > joined.n_rows() * joined.n_cols() {
        warnings.push(format!(
            "{imputed_cells} of {} cells were imputed",
            joined.n_rows() * joined.n_cols()
        ));
    }

    let filled = KnnImputer::new(input.n_neighbors)
        .fill(&joined)?
        .round_dp(input.rounding_dp);
    let blended = filled.blend(input.weights.as_deref())?;

    if let Some(w) = &input.weights {
        let total: Weight = w.iter().sum();
        if (total - Weight::ONE).abs() > dec!(0.01) {
            warnings.push(format!("blend weights sum to {total}, not 1"));
        }
    }

    let output = AggregationOutput {
        filled,
        blended,
        imputed_cells,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Outer join, KNN imputation (NaN-Euclidean, uniform weights), weighted blend",
        &serde_json::json!({
            "n_series": input.series.len(),
            "n_neighbors": input.n_neighbors,
            "rounding_dp": input.rounding_dp,
            "equal_weights": input.weights.is_none(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_aggregate_fills_then_blends() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let input = AggregationInput {
            series: vec![
                NamedSeries {
                    name: "A".into(),
                    returns: TimeSeries::from_points(vec![
                        (d(2), dec!(0.01)),
                        (d(3), dec!(0.02)),
                    ]),
                },
                NamedSeries {
                    name: "B".into(),
                    returns: TimeSeries::from_points(vec![(d(2), dec!(0.03))]),
                },
            ],
            weights: None,
            n_neighbors: 5,
            rounding_dp: 5,
        };
        let out = aggregate_return_series(&input).unwrap();
        assert_eq!(out.result.imputed_cells, 1);
        assert!(out.result.filled.is_complete());
        assert_eq!(out.result.blended.get(&d(3)), Some(dec!(0.025)));
    }
}
