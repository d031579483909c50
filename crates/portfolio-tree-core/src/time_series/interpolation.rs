use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::TimeSeries;

/// A single raw close observation. `close` is `None` when the feed had a
/// hole at that date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: Option<Decimal>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            close: Some(close),
        }
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Every Monday-to-Friday date in `[start, end]`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| is_business_day(*d))
        .collect()
}

/// Resample raw closes onto a business-day grid spanning the first to the
/// last observed close. Grid dates without an observation are filled by
/// monotone cubic interpolation over all observed closes. Nothing is
/// extrapolated, so leading and trailing gaps never appear.
pub fn resample_business_days(points: &[PricePoint]) -> TimeSeries {
    let observed: BTreeMap<NaiveDate, Decimal> = points
        .iter()
        .filter_map(|p| p.close.map(|c| (p.date, c)))
        .collect();

    let (first, last) = match (observed.keys().next(), observed.keys().next_back()) {
        (Some(f), Some(l)) => (*f, *l),
        _ => return TimeSeries::new(),
    };

    let xs: Vec<Decimal> = observed
        .keys()
        .map(|d| Decimal::from((*d - first).num_days()))
        .collect();
    let ys: Vec<Decimal> = observed.values().copied().collect();
    let interpolator = MonotoneCubic::new(xs, ys);

    let mut out = TimeSeries::new();
    for date in business_days(first, last) {
        if let Some(v) = observed.get(&date) {
            out.insert(date, *v);
        } else if let Some(ref interp) = interpolator {
            let x = Decimal::from((date - first).num_days());
            out.insert(date, interp.evaluate(x).round_dp(6));
        }
    }
    out
}

/// Shape-preserving piecewise cubic Hermite interpolator (Fritsch–Carlson
/// slopes). Never overshoots the data between two knots.
#[derive(Debug, Clone)]
pub struct MonotoneCubic {
    xs: Vec<Decimal>,
    ys: Vec<Decimal>,
    slopes: Vec<Decimal>,
}

impl MonotoneCubic {
    /// Needs at least two knots with strictly increasing `xs`.
    pub fn new(xs: Vec<Decimal>, ys: Vec<Decimal>) -> Option<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n || xs.windows(2).any(|w| w[1] <= w[0]) {
            return None;
        }

        let h: Vec<Decimal> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<Decimal> = (0..n - 1).map(|k| (ys[k + 1] - ys[k]) / h[k]).collect();

        let mut slopes = vec![Decimal::ZERO; n];
        if n == 2 {
            slopes[0] = delta[0];
            slopes[1] = delta[0];
        } else {
            for k in 1..n - 1 {
                let (d0, d1) = (delta[k - 1], delta[k]);
                if d0.is_zero() || d1.is_zero() || d0.is_sign_negative() != d1.is_sign_negative() {
                    slopes[k] = Decimal::ZERO;
                } else {
                    let w1 = dec!(2) * h[k] + h[k - 1];
                    let w2 = h[k] + dec!(2) * h[k - 1];
                    slopes[k] = (w1 + w2) / (w1 / d0 + w2 / d1);
                }
            }
            slopes[0] = end_slope(h[0], h[1], delta[0], delta[1]);
            slopes[n - 1] = end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
        }

        Some(Self { xs, ys, slopes })
    }

    pub fn evaluate(&self, x: Decimal) -> Decimal {
        let n = self.xs.len();
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[n - 1] {
            return self.ys[n - 1];
        }
        // First knot strictly greater than x; the interval is [k, k + 1].
        let upper = self.xs.partition_point(|xi| *xi <= x);
        let k = upper - 1;

        let h = self.xs[k + 1] - self.xs[k];
        let t = (x - self.xs[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = dec!(2) * t3 - dec!(3) * t2 + Decimal::ONE;
        let h10 = t3 - dec!(2) * t2 + t;
        let h01 = dec!(-2) * t3 + dec!(3) * t2;
        let h11 = t3 - t2;

        h00 * self.ys[k]
            + h10 * h * self.slopes[k]
            + h01 * self.ys[k + 1]
            + h11 * h * self.slopes[k + 1]
    }
}

/// One-sided three-point slope estimate, clipped to keep monotonicity.
fn end_slope(h0: Decimal, h1: Decimal, d0: Decimal, d1: Decimal) -> Decimal {
    let d = ((dec!(2) * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if d.is_sign_negative() != d0.is_sign_negative() || d0.is_zero() {
        Decimal::ZERO
    } else if d0.is_sign_negative() != d1.is_sign_negative() && d.abs() > dec!(3) * d0.abs() {
        dec!(3) * d0
    } else {
        d
    }
}
