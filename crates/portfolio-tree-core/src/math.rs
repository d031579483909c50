use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::PortfolioTreeError;
use crate::PortfolioTreeResult;

/// Trading days used to annualize daily figures.
pub const TRADING_DAYS_PER_YEAR: i64 = 252;

/// Square root via Newton's method.
pub fn sqrt_decimal(val: Decimal) -> Decimal {
    if val <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if val == Decimal::ONE {
        return Decimal::ONE;
    }
    let two = dec!(2);
    let mut guess = if val > Decimal::ONE { val / two } else { val * two };
    if guess.is_zero() {
        guess = dec!(0.0000001);
    }
    for _ in 0..60 {
        let next = (guess + val / guess) / two;
        if (next - guess).abs() < dec!(0.0000000000000001) {
            return next;
        }
        guess = next;
    }
    guess
}

/// Arithmetic mean; zero for an empty slice.
pub fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = values.iter().sum();
    sum / Decimal::from(values.len() as i64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values);
    let sum_sq: Decimal = values.iter().map(|v| (*v - avg) * (*v - avg)).sum();
    Some(sqrt_decimal(sum_sq / Decimal::from((values.len() - 1) as i64)))
}

/// `base^exponent` for a positive base, failing instead of panicking.
pub fn checked_pow(base: Decimal, exponent: Decimal, context: &str) -> PortfolioTreeResult<Decimal> {
    if base <= Decimal::ZERO {
        return Err(PortfolioTreeError::FinancialImpossibility(format!(
            "{context}: cannot raise non-positive base {base} to a fractional power"
        )));
    }
    if exponent == Decimal::ONE {
        return Ok(base);
    }
    base.checked_powd(exponent).ok_or_else(|| {
        PortfolioTreeError::FinancialImpossibility(format!(
            "{context}: {base}^{exponent} overflowed"
        ))
    })
}

/// Percentile of a **sorted** slice using linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}
