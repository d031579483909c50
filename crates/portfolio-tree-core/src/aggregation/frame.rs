use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::PortfolioTreeError;
use crate::time_series::TimeSeries;
use crate::types::Weight;
use crate::PortfolioTreeResult;

/// Date-aligned table of return series, one column per child entity.
/// `None` marks a date on which that child had no observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    rows: Vec<Vec<Option<Decimal>>>,
}

impl ReturnFrame {
    /// Outer join on date: the row set is the union of all dates.
    pub fn outer_join<'a, I, S>(series: I) -> Self
    where
        I: IntoIterator<Item = (S, &'a TimeSeries)>,
        S: Into<String>,
    {
        let named: Vec<(String, &TimeSeries)> =
            series.into_iter().map(|(n, s)| (n.into(), s)).collect();

        let dates: Vec<NaiveDate> = named
            .iter()
            .flat_map(|(_, s)| s.dates())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = dates
            .iter()
            .map(|date| named.iter().map(|(_, s)| s.get(date)).collect())
            .collect();

        Self {
            dates,
            columns: named.into_iter().map(|(n, _)| n).collect(),
            rows,
        }
    }

    pub fn from_rows(
        dates: Vec<NaiveDate>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<Decimal>>>,
    ) -> PortfolioTreeResult<Self> {
        if rows.len() != dates.len() || rows.iter().any(|r| r.len() != columns.len()) {
            return Err(PortfolioTreeError::InvalidInput {
                field: "rows".into(),
                reason: format!(
                    "expected {} rows of {} values",
                    dates.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self {
            dates,
            columns,
            rows,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Decimal>>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<Decimal> {
        self.rows.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: Decimal) {
        self.rows[row][col] = Some(value);
    }

    pub fn missing_count(&self) -> usize {
        self.rows.iter().flatten().filter(|v| v.is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_count() == 0
    }

    /// Fail on the first column with no observation at all; such a column
    /// cannot be imputed from anything.
    pub fn ensure_columns_present(&self) -> PortfolioTreeResult<()> {
        for (col, name) in self.columns.iter().enumerate() {
            if self.rows.iter().all(|r| r[col].is_none()) {
                return Err(PortfolioTreeError::NoUsableData {
                    column: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn round_dp(&self, dp: u32) -> Self {
        Self {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| r.iter().map(|v| v.map(|x| x.round_dp(dp))).collect())
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<TimeSeries> {
        let col = self.columns.iter().position(|c| c == name)?;
        Some(
            self.dates
                .iter()
                .zip(self.rows.iter())
                .filter_map(|(d, r)| r[col].map(|v| (*d, v)))
                .collect(),
        )
    }

    /// Dense `rows × columns` matrix; fails if any cell is still missing.
    pub fn to_matrix(&self) -> PortfolioTreeResult<Vec<Vec<Decimal>>> {
        self.rows
            .iter()
            .zip(self.dates.iter())
            .map(|(row, date)| {
                row.iter()
                    .zip(self.columns.iter())
                    .map(|(v, name)| {
                        v.ok_or_else(|| PortfolioTreeError::InsufficientData(format!(
                            "'{name}' has no value on {date} after imputation"
                        )))
                    })
                    .collect()
            })
            .collect()
    }

    /// Weighted sum across columns at every date. Equal weights when
    /// `weights` is `None`.
    pub fn blend(&self, weights: Option<&[Weight]>) -> PortfolioTreeResult<TimeSeries> {
        let n = self.n_cols();
        if n == 0 {
            return Err(PortfolioTreeError::InsufficientData(
                "no series to blend".into(),
            ));
        }
        let weights: Vec<Weight> = match weights {
            Some(w) if w.len() != n => {
                return Err(PortfolioTreeError::InvalidInput {
                    field: "weights".into(),
                    reason: format!("{} weights for {} series", w.len(), n),
                })
            }
            Some(w) => w.to_vec(),
            None => vec![Decimal::ONE / Decimal::from(n as i64); n],
        };

        let matrix = self.to_matrix()?;
        Ok(self
            .dates
            .iter()
            .zip(matrix.iter())
            .map(|(date, row)| {
                let value: Decimal = row.iter().zip(weights.iter()).map(|(v, w)| *v * *w).sum();
                (*date, value)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_outer_join_unions_dates() {
        let a = TimeSeries::from_points(vec![(d(2), dec!(0.1)), (d(3), dec!(0.2))]);
        let b = TimeSeries::from_points(vec![(d(3), dec!(0.3)), (d(4), dec!(0.4))]);
        let frame = ReturnFrame::outer_join([("A", &a), ("B", &b)]);
        assert_eq!(frame.dates(), &[d(2), d(3), d(4)]);
        assert_eq!(frame.value(0, 1), None);
        assert_eq!(frame.value(1, 1), Some(dec!(0.3)));
        assert_eq!(frame.missing_count(), 2);
        assert!(frame.blend(None).is_err());
    }

    #[test]
    fn test_entirely_absent_column_is_named() {
        let a = TimeSeries::from_points(vec![(d(2), dec!(0.1))]);
        let empty = TimeSeries::new();
        let frame = ReturnFrame::outer_join([("A", &a), ("GHOST", &empty)]);
        match frame.ensure_columns_present() {
            Err(PortfolioTreeError::NoUsableData { column }) => assert_eq!(column, "GHOST"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_blend_weighted_and_equal() {
        let a = TimeSeries::from_points(vec![(d(2), dec!(0.10))]);
        let b = TimeSeries::from_points(vec![(d(2), dec!(0.20))]);
        let frame = ReturnFrame::outer_join([("A", &a), ("B", &b)]);
        let weighted = frame.blend(Some(&[dec!(0.75), dec!(0.25)])).unwrap();
        assert_eq!(weighted.get(&d(2)), Some(dec!(0.125)));
        let equal = frame.blend(None).unwrap();
        assert_eq!(equal.get(&d(2)), Some(dec!(0.15)));
    }
}
