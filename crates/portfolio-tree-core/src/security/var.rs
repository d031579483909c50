use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use statrs::distribution::Normal;

use crate::config::VarSettings;
use crate::error::PortfolioTreeError;
use crate::math::percentile_sorted;
use crate::types::Money;
use crate::PortfolioTreeResult;

fn to_f64(value: Decimal, field: &str) -> PortfolioTreeResult<f64> {
    value.to_f64().ok_or_else(|| PortfolioTreeError::InvalidInput {
        field: field.into(),
        reason: format!("{value} is not representable as f64"),
    })
}

/// Monte Carlo value-at-risk as a fraction of the last price.
///
/// Terminal one-year returns are drawn from `N(mean_return, std_return)` and
/// applied to `last_price`; the `(1 − confidence)` percentile of the simulated
/// prices is reported as `(percentile − last) / last`, rounded to 5 dp.
pub fn monte_carlo_var(
    ticker: &str,
    last_price: Money,
    mean_return: Decimal,
    std_return: Decimal,
    settings: &VarSettings,
) -> PortfolioTreeResult<Decimal> {
    if last_price <= Decimal::ZERO {
        return Err(PortfolioTreeError::FinancialImpossibility(format!(
            "{ticker}: last price {last_price} must be positive"
        )));
    }
    // A degenerate distribution puts every simulated price at the mean.
    if std_return.is_zero() {
        return Ok(mean_return.round_dp(5));
    }

    let last = to_f64(last_price, "last_price")?;
    let mu = to_f64(mean_return, "mean_return")?;
    let sigma = to_f64(std_return, "std_return")?;
    let confidence = to_f64(settings.confidence, "var.confidence")?;

    let normal = Normal::new(mu, sigma).map_err(|e| PortfolioTreeError::InvalidInput {
        field: "std_return".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let mut rng = match settings.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let n = settings.simulations.max(1) as usize;
    let mut simulated: Vec<f64> = (0..n)
        .map(|_| last * (1.0 + rng.sample(normal)))
        .collect();
    simulated.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let cutoff = percentile_sorted(&simulated, (1.0 - confidence) * 100.0);
    let var_fraction = (cutoff - last) / last;

    Decimal::from_f64(var_fraction)
        .map(|v| v.round_dp(5))
        .ok_or_else(|| {
            PortfolioTreeError::FinancialImpossibility(format!(
                "{ticker}: simulated VaR {var_fraction} is not finite"
            ))
        })
}
