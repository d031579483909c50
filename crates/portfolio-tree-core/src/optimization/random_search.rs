use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::SolverSettings;

/// Draw `settings.num_portfolios` random long-only portfolios, push each
/// onto the bounded simplex and keep the best-scoring one. `score` returns
/// `None` for candidates that must be skipped. `None` overall means no
/// candidate was admissible.
pub(crate) fn random_search<F>(
    bounds: &[(f64, f64)],
    settings: &SolverSettings,
    score: F,
) -> Option<(Vec<f64>, f64)>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let n = bounds.len();
    let mut rng = match settings.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut best: Option<(Vec<f64>, f64)> = None;
    let mut admissible = 0u32;
    for _ in 0..settings.num_portfolios {
        let mut raw: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter_mut().for_each(|w| *w /= total);
        }
        let candidate = project_bounded_simplex(&raw, bounds);
        if let Some(value) = score(&candidate) {
            if !value.is_finite() {
                continue;
            }
            admissible += 1;
            if best.as_ref().map_or(true, |(_, b)| value > *b) {
                best = Some((candidate, value));
            }
        }
    }

    debug!(
        drawn = settings.num_portfolios,
        admissible,
        best = best.as_ref().map(|(_, v)| *v),
        "random portfolio search finished"
    );
    best
}

/// Same projection as the decimal solver, in floating point for speed.
fn project_bounded_simplex(v: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    let clamped_sum = |tau: f64| -> f64 {
        v.iter()
            .zip(bounds.iter())
            .map(|(vi, (lo, hi))| (vi - tau).clamp(*lo, *hi))
            .sum()
    };
    let mut low = v
        .iter()
        .zip(bounds.iter())
        .map(|(vi, (_, hi))| vi - hi)
        .fold(f64::INFINITY, f64::min);
    let mut high = v
        .iter()
        .zip(bounds.iter())
        .map(|(vi, (lo, _))| vi - lo)
        .fold(f64::NEG_INFINITY, f64::max);
    for _ in 0..100 {
        let mid = 0.5 * (low + high);
        if clamped_sum(mid) > 1.0 {
            low = mid;
        } else {
            high = mid;
        }
    }
    let tau = 0.5 * (low + high);
    v.iter()
        .zip(bounds.iter())
        .map(|(vi, (lo, hi))| (vi - tau).clamp(*lo, *hi))
        .collect()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub(crate) fn quadratic_form(w: &[f64], sigma: &[Vec<f64>]) -> f64 {
    sigma
        .iter()
        .zip(w.iter())
        .map(|(row, wi)| wi * dot(row, w))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64, n: u32) -> SolverSettings {
        SolverSettings {
            num_portfolios: n,
            seed: Some(seed),
            ..SolverSettings::default()
        }
    }

    #[test]
    fn test_candidates_respect_bounds() {
        let bounds = vec![(0.0, 0.2), (0.3, 1.0), (0.0, 1.0)];
        let (w, _) = random_search(&bounds, &settings(3, 500), |w| {
            assert!(w[0] <= 0.2 + 1e-9);
            assert!(w[1] >= 0.3 - 1e-9);
            assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            Some(w[0])
        })
        .unwrap();
        assert!(w[0] > 0.19);
    }

    #[test]
    fn test_seeded_search_is_reproducible() {
        let bounds = vec![(0.0, 1.0); 4];
        let mu = [0.05, 0.07, 0.02, 0.04];
        let run = || random_search(&bounds, &settings(9, 1_000), |w| Some(dot(w, &mu)));
        assert_eq!(run(), run());
    }

    #[test]
    fn test_no_admissible_candidate() {
        let bounds = vec![(0.0, 1.0); 2];
        assert!(random_search(&bounds, &settings(1, 100), |_| None).is_none());
    }
}
