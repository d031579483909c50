use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, warn};

use crate::error::PortfolioTreeError;
use crate::math::sqrt_decimal;
use crate::PortfolioTreeResult;

pub(crate) type Bounds = [(Decimal, Decimal)];

// ---------------------------------------------------------------------------
// Objectives
// ---------------------------------------------------------------------------

/// Tangency (max Sharpe) weights inside per-entity bounds.
///
/// The unconstrained analytic solution
/// `w* = Σ⁻¹(μ − rf) / 1'Σ⁻¹(μ − rf)` is used when it already respects the
/// bounds; otherwise projected gradient ascent on the Sharpe ratio starts
/// from its projection. With no entity beating the risk-free rate the
/// ratio has no meaningful maximum and the minimum-variance portfolio is
/// returned instead.
pub(crate) fn max_sharpe_weights(
    mu: &[Decimal],
    sigma: &[Vec<Decimal>],
    rf: Decimal,
    bounds: &Bounds,
    max_iterations: u32,
) -> Vec<Decimal> {
    let n = mu.len();
    if !mu.iter().any(|m| *m > rf) {
        warn!(
            n_entities = n,
            "no expected return exceeds the risk-free rate, using minimum variance"
        );
        return min_variance_weights(sigma, bounds, max_iterations);
    }

    let excess: Vec<Decimal> = mu.iter().map(|r| *r - rf).collect();
    let analytic = mat_inverse(sigma).ok().and_then(|inv| {
        let inv_excess = mat_vec_multiply(&inv, &excess);
        let denom: Decimal = inv_excess.iter().sum();
        if denom <= dec!(0.0000000001) {
            None
        } else {
            Some(inv_excess.iter().map(|v| *v / denom).collect::<Vec<_>>())
        }
    });

    if let Some(ref w) = analytic {
        if is_feasible(w, bounds) {
            debug!("unconstrained tangency portfolio is feasible");
            return project_onto_bounds(w, bounds);
        }
    }

    let init = analytic.unwrap_or_else(|| equal_weights(n));
    let sharpe = |w: &[Decimal]| -> Decimal {
        let ret = vec_dot(w, mu);
        compute_sharpe(ret, rf, portfolio_std(w, sigma))
    };
    let gradient = |w: &[Decimal]| -> Vec<Decimal> {
        let risk = portfolio_std(w, sigma);
        if risk.is_zero() {
            return vec![Decimal::ZERO; n];
        }
        let sigma_w = mat_vec_multiply(sigma, w);
        let excess_ret = vec_dot(w, mu) - rf;
        let risk_cubed = risk * risk * risk;
        (0..n)
            .map(|i| mu[i] / risk - excess_ret * sigma_w[i] / risk_cubed)
            .collect()
    };
    projected_ascent(sharpe, gradient, &init, bounds, max_iterations)
}

/// Minimum-variance weights inside per-entity bounds.
pub(crate) fn min_variance_weights(
    sigma: &[Vec<Decimal>],
    bounds: &Bounds,
    max_iterations: u32,
) -> Vec<Decimal> {
    let n = sigma.len();
    let analytic = mat_inverse(sigma).ok().and_then(|inv| {
        let inv_ones = mat_vec_multiply(&inv, &vec![Decimal::ONE; n]);
        let denom: Decimal = inv_ones.iter().sum();
        if denom.is_zero() {
            None
        } else {
            Some(inv_ones.iter().map(|v| *v / denom).collect::<Vec<_>>())
        }
    });

    if let Some(ref w) = analytic {
        if is_feasible(w, bounds) {
            return project_onto_bounds(w, bounds);
        }
    }

    let neg_variance = |w: &[Decimal]| -> Decimal { -vec_dot(w, &mat_vec_multiply(sigma, w)) };
    let gradient = |w: &[Decimal]| -> Vec<Decimal> {
        mat_vec_multiply(sigma, w)
            .into_iter()
            .map(|v| dec!(-2) * v)
            .collect()
    };
    let init = analytic.unwrap_or_else(|| equal_weights(n));
    projected_ascent(neg_variance, gradient, &init, bounds, max_iterations)
}

/// Gradient ascent with an adaptive step; every iterate is projected back
/// onto the bounded simplex, so the result is always feasible.
fn projected_ascent<F, G>(
    objective: F,
    gradient: G,
    init: &[Decimal],
    bounds: &Bounds,
    max_iterations: u32,
) -> Vec<Decimal>
where
    F: Fn(&[Decimal]) -> Decimal,
    G: Fn(&[Decimal]) -> Vec<Decimal>,
{
    let mut w = project_onto_bounds(init, bounds);
    let mut value = objective(&w);
    let mut step = dec!(0.1);
    let min_step = dec!(0.000000000001);

    let mut iterations = 0;
    while iterations < max_iterations {
        iterations += 1;
        let grad = gradient(&w);
        let stepped: Vec<Decimal> = w
            .iter()
            .zip(grad.iter())
            .map(|(wi, gi)| *wi + step * *gi)
            .collect();
        let candidate = project_onto_bounds(&stepped, bounds);
        let candidate_value = objective(&candidate);

        if candidate_value > value {
            let moved = w
                .iter()
                .zip(candidate.iter())
                .map(|(a, b)| (*a - *b).abs())
                .max()
                .unwrap_or(Decimal::ZERO);
            w = candidate;
            value = candidate_value;
            step = (step * dec!(1.5)).min(dec!(10));
            if moved < min_step {
                break;
            }
        } else {
            step /= dec!(2);
            if step < min_step {
                break;
            }
        }
    }
    debug!(iterations, objective = %value, "projected ascent finished");
    w
}

// ---------------------------------------------------------------------------
// Constraint helpers
// ---------------------------------------------------------------------------

fn is_feasible(w: &[Decimal], bounds: &Bounds) -> bool {
    let tol = dec!(0.0001);
    w.iter()
        .zip(bounds.iter())
        .all(|(wi, (lo, hi))| *wi >= *lo - tol && *wi <= *hi + tol)
}

/// Euclidean projection onto `{w : Σw = 1, lo ≤ w ≤ hi}`.
///
/// The projection has the form `wᵢ = clamp(vᵢ − τ, loᵢ, hiᵢ)`; `τ` is found
/// by bisection since the clamped sum is non-increasing in `τ`. Bounds must
/// be feasible (`Σlo ≤ 1 ≤ Σhi`).
pub fn project_onto_bounds(v: &[Decimal], bounds: &Bounds) -> Vec<Decimal> {
    let clamped_sum = |tau: Decimal| -> Decimal {
        v.iter()
            .zip(bounds.iter())
            .map(|(vi, (lo, hi))| (*vi - tau).max(*lo).min(*hi))
            .sum()
    };

    let mut low = v
        .iter()
        .zip(bounds.iter())
        .map(|(vi, (_, hi))| *vi - *hi)
        .min()
        .unwrap_or(Decimal::ZERO);
    let mut high = v
        .iter()
        .zip(bounds.iter())
        .map(|(vi, (lo, _))| *vi - *lo)
        .max()
        .unwrap_or(Decimal::ZERO);

    for _ in 0..200 {
        if high - low < dec!(0.0000000000000000001) {
            break;
        }
        let mid = (low + high) / dec!(2);
        if clamped_sum(mid) > Decimal::ONE {
            low = mid;
        } else {
            high = mid;
        }
    }
    let tau = (low + high) / dec!(2);
    let mut w: Vec<Decimal> = v
        .iter()
        .zip(bounds.iter())
        .map(|(vi, (lo, hi))| (*vi - tau).max(*lo).min(*hi))
        .collect();
    absorb_residual(&mut w, bounds);
    w
}

/// Round to `dp` places, then put whatever the rounding broke off the unit
/// sum onto the weights with the most room inside their bounds.
pub fn clean_weights(w: &[Decimal], bounds: &Bounds, dp: u32) -> Vec<Decimal> {
    let mut rounded: Vec<Decimal> = w.iter().map(|x| x.round_dp(dp)).collect();
    absorb_residual(&mut rounded, bounds);
    rounded
}

fn absorb_residual(w: &mut [Decimal], bounds: &Bounds) {
    let mut residual = Decimal::ONE - w.iter().sum::<Decimal>();
    if residual.is_zero() {
        return;
    }
    let raise = residual > Decimal::ZERO;
    let slack = move |i: usize, w: &[Decimal]| -> Decimal {
        if raise {
            bounds[i].1 - w[i]
        } else {
            w[i] - bounds[i].0
        }
    };
    let mut order: Vec<usize> = (0..w.len()).collect();
    order.sort_by(|a, b| slack(*b, w).cmp(&slack(*a, w)));

    for i in order {
        if residual.is_zero() {
            break;
        }
        let room = slack(i, w);
        if room <= Decimal::ZERO {
            continue;
        }
        let shift = residual.abs().min(room);
        if raise {
            w[i] += shift;
            residual -= shift;
        } else {
            w[i] -= shift;
            residual += shift;
        }
    }
}

pub(crate) fn equal_weights(n: usize) -> Vec<Decimal> {
    let w = Decimal::ONE / Decimal::from(n as i64);
    vec![w; n]
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[allow(clippy::needless_range_loop)]
pub(crate) fn validate_covariance_matrix(cov: &[Vec<Decimal>], n: usize) -> PortfolioTreeResult<()> {
    if cov.len() != n {
        return Err(PortfolioTreeError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(PortfolioTreeError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row[i] < Decimal::ZERO {
            return Err(PortfolioTreeError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance on diagonal [{i},{i}]"),
            });
        }
    }
    let tolerance = dec!(0.0000001);
    for i in 0..n {
        for j in (i + 1)..n {
            if (cov[i][j] - cov[j][i]).abs() > tolerance {
                return Err(PortfolioTreeError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Portfolio math helpers
// ---------------------------------------------------------------------------

pub(crate) fn compute_sharpe(ret: Decimal, rf: Decimal, risk: Decimal) -> Decimal {
    if risk.is_zero() {
        Decimal::ZERO
    } else {
        (ret - rf) / risk
    }
}

/// Portfolio standard deviation: sqrt(w' * Sigma * w).
pub(crate) fn portfolio_std(w: &[Decimal], sigma: &[Vec<Decimal>]) -> Decimal {
    let sigma_w = mat_vec_multiply(sigma, w);
    sqrt_decimal(vec_dot(w, &sigma_w))
}

// ---------------------------------------------------------------------------
// Matrix helpers
// ---------------------------------------------------------------------------

pub(crate) fn mat_vec_multiply(mat: &[Vec<Decimal>], v: &[Decimal]) -> Vec<Decimal> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

pub(crate) fn vec_dot(a: &[Decimal], b: &[Decimal]) -> Decimal {
    a.iter().zip(b.iter()).map(|(x, y)| *x * *y).sum()
}

/// Matrix inverse via Gauss-Jordan with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn mat_inverse(mat: &[Vec<Decimal>]) -> PortfolioTreeResult<Vec<Vec<Decimal>>> {
    let n = mat.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut aug: Vec<Vec<Decimal>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut row = Vec::with_capacity(2 * n);
        row.extend_from_slice(&mat[i]);
        for j in 0..n {
            row.push(if i == j { Decimal::ONE } else { Decimal::ZERO });
        }
        aug.push(row);
    }

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = aug[col][col].abs();
        for row in (col + 1)..n {
            let val = aug[row][col].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_val < dec!(0.0000000001) {
            return Err(PortfolioTreeError::FinancialImpossibility(
                "Singular matrix cannot be inverted".into(),
            ));
        }

        if max_row != col {
            aug.swap(col, max_row);
        }

        let pivot = aug[col][col];
        for cell in aug[col].iter_mut() {
            *cell /= pivot;
        }

        let pivot_row = aug[col].clone();
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            for (cell, &pv) in aug[row].iter_mut().zip(pivot_row.iter()) {
                *cell -= factor * pv;
            }
        }
    }

    Ok(aug.iter().map(|row| row[n..].to_vec()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
