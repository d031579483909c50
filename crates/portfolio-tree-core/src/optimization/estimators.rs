use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::PortfolioTreeError;
use crate::math::{checked_pow, sqrt_decimal, TRADING_DAYS_PER_YEAR};
use crate::PortfolioTreeResult;

/// Annualized estimates for a set of return columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnEstimates {
    pub expected_returns: Vec<Decimal>,
    pub covariance_matrix: Vec<Vec<Decimal>>,
    /// Ledoit-Wolf shrinkage intensity in [0, 1].
    pub shrinkage: Decimal,
    pub downside_deviations: Vec<Decimal>,
}

fn column(rows: &[Vec<Decimal>], j: usize) -> impl Iterator<Item = Decimal> + '_ {
    rows.iter().map(move |r| r[j])
}

fn check_shape(rows: &[Vec<Decimal>]) -> PortfolioTreeResult<usize> {
    let p = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.len() < 2 || p == 0 {
        return Err(PortfolioTreeError::InsufficientData(
            "at least two periods of at least one series are required".into(),
        ));
    }
    if rows.iter().any(|r| r.len() != p) {
        return Err(PortfolioTreeError::InvalidInput {
            field: "returns".into(),
            reason: "ragged return matrix".into(),
        });
    }
    Ok(p)
}

/// Compounded mean historical return per column, annualized:
/// `Π(1 + r)^(252 / n) − 1`.
pub fn mean_historical_return(rows: &[Vec<Decimal>]) -> PortfolioTreeResult<Vec<Decimal>> {
    let p = check_shape(rows)?;
    let exponent = Decimal::from(TRADING_DAYS_PER_YEAR) / Decimal::from(rows.len() as i64);
    (0..p)
        .map(|j| {
            let growth: Decimal = column(rows, j).map(|r| Decimal::ONE + r).product();
            Ok(checked_pow(growth, exponent, "mean_historical_return")? - Decimal::ONE)
        })
        .collect()
}

/// Ledoit-Wolf shrunk covariance, annualized.
///
/// Shrinks the biased sample covariance towards `μ·I`, where `μ` is the
/// average sample variance, with the intensity from Ledoit & Wolf (2004).
#[allow(clippy::needless_range_loop)]
pub fn ledoit_wolf_covariance(
    rows: &[Vec<Decimal>],
) -> PortfolioTreeResult<(Vec<Vec<Decimal>>, Decimal)> {
    let p = check_shape(rows)?;
    let n = rows.len();
    let n_dec = Decimal::from(n as i64);
    let p_dec = Decimal::from(p as i64);

    let means: Vec<Decimal> = (0..p)
        .map(|j| column(rows, j).sum::<Decimal>() / n_dec)
        .collect();
    let x: Vec<Vec<Decimal>> = rows
        .iter()
        .map(|r| r.iter().zip(means.iter()).map(|(v, m)| *v - *m).collect())
        .collect();

    let mut xtx = vec![vec![Decimal::ZERO; p]; p];
    let mut x2tx2 = vec![vec![Decimal::ZERO; p]; p];
    for row in &x {
        for i in 0..p {
            for j in i..p {
                let prod = row[i] * row[j];
                xtx[i][j] += prod;
                x2tx2[i][j] += prod * prod;
            }
        }
    }
    for i in 0..p {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
            x2tx2[i][j] = x2tx2[j][i];
        }
    }

    let emp_cov: Vec<Vec<Decimal>> = xtx
        .iter()
        .map(|r| r.iter().map(|v| *v / n_dec).collect())
        .collect();
    let trace: Decimal = (0..p).map(|i| emp_cov[i][i]).sum();
    let mu = trace / p_dec;

    let beta_sum: Decimal = x2tx2.iter().flatten().sum();
    let delta_sum: Decimal = xtx.iter().flatten().map(|v| *v * *v).sum::<Decimal>() / (n_dec * n_dec);

    let beta = (beta_sum / n_dec - delta_sum) / (p_dec * n_dec);
    let delta = (delta_sum - Decimal::TWO * mu * trace + p_dec * mu * mu) / p_dec;
    let beta = beta.min(delta);
    let shrinkage = if beta <= Decimal::ZERO || delta.is_zero() {
        Decimal::ZERO
    } else {
        beta / delta
    };

    let annual = Decimal::from(TRADING_DAYS_PER_YEAR);
    let shrunk = (0..p)
        .map(|i| {
            (0..p)
                .map(|j| {
                    let target = if i == j { mu } else { Decimal::ZERO };
                    ((Decimal::ONE - shrinkage) * emp_cov[i][j] + shrinkage * target) * annual
                })
                .collect()
        })
        .collect();
    Ok((shrunk, shrinkage))
}

/// Annualized semideviation of each column below a per-period benchmark.
pub fn semideviation(rows: &[Vec<Decimal>], benchmark: Decimal) -> PortfolioTreeResult<Vec<Decimal>> {
    let p = check_shape(rows)?;
    let n_dec = Decimal::from(rows.len() as i64);
    let annual_root = sqrt_decimal(Decimal::from(TRADING_DAYS_PER_YEAR));
    Ok((0..p)
        .map(|j| {
            let sum_sq: Decimal = column(rows, j)
                .map(|r| (r - benchmark).min(Decimal::ZERO))
                .map(|d| d * d)
                .sum();
            sqrt_decimal(sum_sq / n_dec) * annual_root
        })
        .collect())
}

/// Everything a level's optimization needs from its filled return matrix.
pub fn estimate(rows: &[Vec<Decimal>], risk_free_rate: Decimal) -> PortfolioTreeResult<ReturnEstimates> {
    let expected_returns = mean_historical_return(rows)?;
    let (covariance_matrix, shrinkage) = ledoit_wolf_covariance(rows)?;
    let daily_benchmark = risk_free_rate / Decimal::from(TRADING_DAYS_PER_YEAR);
    let downside_deviations = semideviation(rows, daily_benchmark)?;
    Ok(ReturnEstimates {
        expected_returns,
        covariance_matrix,
        shrinkage,
        downside_deviations,
    })
}
