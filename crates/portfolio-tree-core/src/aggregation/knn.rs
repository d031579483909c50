use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::frame::ReturnFrame;
use crate::math::mean;
use crate::PortfolioTreeResult;

/// K-nearest-neighbour gap filler over the rows of a [`ReturnFrame`].
///
/// For a missing cell `(row, col)` the donors are the rows observed in
/// `col` that share at least one observed coordinate with `row`. Distance is
/// the NaN-Euclidean distance
///
/// ```text
/// d(x, y) = sqrt( n_cols / n_shared * Σ_shared (xᵢ − yᵢ)² )
/// ```
///
/// and the filled value is the plain mean of the `k` closest donors' values
/// in `col`, ties going to the earlier row. A cell with no donor takes the
/// column mean. Only originally observed values are ever read, so the fill
/// order does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnImputer {
    pub n_neighbors: usize,
}

impl Default for KnnImputer {
    fn default() -> Self {
        Self { n_neighbors: 5 }
    }
}

impl KnnImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
        }
    }

    pub fn fill(&self, frame: &ReturnFrame) -> PortfolioTreeResult<ReturnFrame> {
        frame.ensure_columns_present()?;

        let mut filled = frame.clone();
        let n_cols = frame.n_cols();
        let mut imputed = 0usize;

        for col in 0..n_cols {
            let donors: Vec<usize> = (0..frame.n_rows())
                .filter(|r| frame.value(*r, col).is_some())
                .collect();
            let column_mean = mean(
                &donors
                    .iter()
                    .filter_map(|r| frame.value(*r, col))
                    .collect::<Vec<_>>(),
            );

            for row in 0..frame.n_rows() {
                if frame.value(row, col).is_some() {
                    continue;
                }

                let mut ranked: Vec<(Decimal, usize)> = donors
                    .iter()
                    .filter_map(|donor| {
                        nan_euclidean_sq(frame, row, *donor, n_cols).map(|dist| (dist, *donor))
                    })
                    .collect();

                let value = if ranked.is_empty() {
                    column_mean
                } else {
                    ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
                    let nearest: Vec<Decimal> = ranked
                        .iter()
                        .take(self.n_neighbors)
                        .filter_map(|(_, donor)| frame.value(*donor, col))
                        .collect();
                    mean(&nearest)
                };

                filled.set(row, col, value);
                imputed += 1;
            }
        }

        debug!(
            rows = frame.n_rows(),
            columns = n_cols,
            imputed,
            k = self.n_neighbors,
            "filled return gaps"
        );
        Ok(filled)
    }
}

/// Squared NaN-Euclidean distance between two rows; `None` when the rows
/// share no observed coordinate. The square root is monotone, so ranking on
/// the squared value gives the same neighbours.
fn nan_euclidean_sq(frame: &ReturnFrame, a: usize, b: usize, n_cols: usize) -> Option<Decimal> {
    let mut shared = 0i64;
    let mut sum_sq = Decimal::ZERO;
    for col in 0..n_cols {
        if let (Some(x), Some(y)) = (frame.value(a, col), frame.value(b, col)) {
            shared += 1;
            sum_sq += (x - y) * (x - y);
        }
    }
    if shared == 0 {
        return None;
    }
    Some(sum_sq * Decimal::from(n_cols as i64) / Decimal::from(shared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_neighbour_picks_closest_row() {
        let frame = ReturnFrame::from_rows(
            dates(3),
            cols(&["A", "B"]),
            vec![
                vec![Some(dec!(0.10)), Some(dec!(1))],
                vec![Some(dec!(0.11)), None],
                vec![Some(dec!(0.50)), Some(dec!(9))],
            ],
        )
        .unwrap();
        let filled = KnnImputer::new(1).fill(&frame).unwrap();
        assert_eq!(filled.value(1, 1), Some(dec!(1)));
    }

    #[test]
    fn test_k_neighbours_are_averaged() {
        let frame = ReturnFrame::from_rows(
            dates(3),
            cols(&["A", "B"]),
            vec![
                vec![Some(dec!(0.10)), Some(dec!(1))],
                vec![Some(dec!(0.11)), None],
                vec![Some(dec!(0.50)), Some(dec!(9))],
            ],
        )
        .unwrap();
        let filled = KnnImputer::new(5).fill(&frame).unwrap();
        assert_eq!(filled.value(1, 1), Some(dec!(5)));
    }

    #[test]
    fn test_ties_go_to_earlier_row() {
        let frame = ReturnFrame::from_rows(
            dates(3),
            cols(&["A", "B"]),
            vec![
                vec![Some(dec!(0.1)), Some(dec!(2))],
                vec![Some(dec!(0.2)), None],
                vec![Some(dec!(0.3)), Some(dec!(4))],
            ],
        )
        .unwrap();
        let filled = KnnImputer::new(1).fill(&frame).unwrap();
        assert_eq!(filled.value(1, 1), Some(dec!(2)));
    }

    #[test]
    fn test_no_shared_coordinate_uses_column_mean() {
        let frame = ReturnFrame::from_rows(
            dates(3),
            cols(&["A", "B"]),
            vec![
                vec![None, Some(dec!(2))],
                vec![Some(dec!(0.2)), None],
                vec![None, Some(dec!(4))],
            ],
        )
        .unwrap();
        let filled = KnnImputer::default().fill(&frame).unwrap();
        assert_eq!(filled.value(1, 1), Some(dec!(3)));
        assert_eq!(filled.value(0, 0), Some(dec!(0.2)));
        assert!(filled.is_complete());
    }
}
