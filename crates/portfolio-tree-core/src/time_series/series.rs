use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A date-indexed series of decimal values (prices or returns).
///
/// Dates are unique and kept in ascending order. A date that is not present
/// is *absent*, which is never the same thing as a zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries {
    points: BTreeMap<NaiveDate, Decimal>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Decimal)>,
    {
        Self {
            points: points.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, date: NaiveDate, value: Decimal) {
        self.points.insert(date, value);
    }

    pub fn get(&self, date: &NaiveDate) -> Option<Decimal> {
        self.points.get(date).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<(NaiveDate, Decimal)> {
        self.points.iter().next().map(|(d, v)| (*d, *v))
    }

    pub fn last(&self) -> Option<(NaiveDate, Decimal)> {
        self.points.iter().next_back().map(|(d, v)| (*d, *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, Decimal)> + '_ {
        self.points.iter().map(|(d, v)| (*d, *v))
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.keys().copied().collect()
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.points.values().copied().collect()
    }

    /// Period-over-period percentage change. The first observation has no
    /// predecessor and is dropped; a zero predecessor yields no value.
    pub fn pct_change(&self) -> TimeSeries {
        let mut out = TimeSeries::new();
        let mut prev: Option<Decimal> = None;
        for (date, value) in self.iter() {
            if let Some(p) = prev {
                if !p.is_zero() {
                    out.insert(date, value / p - Decimal::ONE);
                }
            }
            prev = Some(value);
        }
        out
    }

    /// Last observation of every calendar year, keyed by its own date.
    pub fn year_end(&self) -> TimeSeries {
        let mut by_year: BTreeMap<i32, (NaiveDate, Decimal)> = BTreeMap::new();
        for (date, value) in self.iter() {
            by_year.insert(date.year(), (date, value));
        }
        TimeSeries::from_points(by_year.into_values())
    }

    /// Observations dated no earlier than `years` before the last one.
    pub fn trailing_years(&self, years: u32) -> TimeSeries {
        let Some((last, _)) = self.last() else {
            return TimeSeries::new();
        };
        match last.checked_sub_months(Months::new(years * 12)) {
            Some(start) => TimeSeries {
                points: self.points.range(start..).map(|(d, v)| (*d, *v)).collect(),
            },
            None => self.clone(),
        }
    }

    pub fn round_dp(&self, dp: u32) -> TimeSeries {
        self.map_values(|v| v.round_dp(dp))
    }

    pub fn scale(&self, factor: Decimal) -> TimeSeries {
        self.map_values(|v| v * factor)
    }

    pub fn map_values<F>(&self, f: F) -> TimeSeries
    where
        F: Fn(Decimal) -> Decimal,
    {
        TimeSeries::from_points(self.iter().map(|(d, v)| (d, f(v))))
    }
}

impl FromIterator<(NaiveDate, Decimal)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, Decimal)>>(iter: I) -> Self {
        TimeSeries::from_points(iter)
    }
}
