//! Gaussian-process surrogate for Bayesian search.
//!
//! Inputs live on the unit hypercube. Targets are standardized before fitting,
//! so the signal variance is fixed at 1 and predictions are in standardized
//! units. The kernel is Matérn 5/2 with per-dimension lengthscales taken from
//! the spread of the observed inputs.

use nalgebra::{DMatrix, DVector, Dyn};

const SQRT_5: f64 = 2.236_067_977_499_79;
const MIN_LENGTHSCALE: f64 = 0.05;
const MAX_LENGTHSCALE: f64 = 1.0;

/// Fitted GP posterior.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    cholesky: nalgebra::linalg::Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    best: f64,
}

impl GaussianProcess {
    /// Fit to `(x, y)` observations. Returns `None` for an empty training set
    /// or when the kernel matrix is not positive definite.
    pub fn fit(x_train: &[Vec<f64>], y_train: &[f64], noise_variance: f64) -> Option<Self> {
        let n = y_train.len();
        if n == 0 || x_train.len() != n {
            return None;
        }

        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y_train.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y_standardized: Vec<f64> = y_train.iter().map(|y| (y - y_mean) / y_std).collect();
        let best = y_standardized
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        let dims = x_train[0].len();
        let lengthscales: Vec<f64> = (0..dims)
            .map(|j| {
                let mean = x_train.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                let var = x_train.iter().map(|x| (x[j] - mean).powi(2)).sum::<f64>() / n as f64;
                var.sqrt().clamp(MIN_LENGTHSCALE, MAX_LENGTHSCALE)
            })
            .collect();

        // Jitter keeps near-duplicate observations from breaking the factorization.
        let noise = noise_variance.max(1e-10);
        let k = DMatrix::from_fn(n, n, |i, j| {
            let kij = matern52(&x_train[i], &x_train[j], &lengthscales);
            if i == j {
                kij + noise
            } else {
                kij
            }
        });
        let cholesky = nalgebra::linalg::Cholesky::new(k)?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y_standardized));

        Some(Self {
            cholesky,
            alpha,
            x_train: x_train.to_vec(),
            lengthscales,
            best,
        })
    }

    /// Posterior mean and standard deviation at `x`, in standardized units.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales)
        });
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        let var = (1.0 - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }

    /// Best observed target, standardized.
    pub fn best_observed(&self) -> f64 {
        self.best
    }
}

/// `k(r) = (1 + √5 r + 5/3 r²) exp(-√5 r)` with unit signal variance.
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64]) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let r = r_sq.sqrt();
    (1.0 + SQRT_5 * r + 5.0 / 3.0 * r_sq) * (-SQRT_5 * r).exp()
}

/// Expected Improvement for maximization:
/// `EI = (μ - f* - ξ) Φ(z) + σ φ(z)`, `z = (μ - f* - ξ) / σ`.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = mean - best - xi;
    if std < 1e-12 {
        return improvement.max(0.0);
    }
    let z = improvement / std;
    (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 erf approximation.
fn norm_cdf(x: f64) -> f64 {
    if x >= 8.0 {
        return 1.0;
    }
    if x <= -8.0 {
        return 0.0;
    }

    let a1 = 0.254829592_f64;
    let a2 = -0.284496736_f64;
    let a3 = 1.421413741_f64;
    let a4 = -1.453152027_f64;
    let a5 = 1.061405429_f64;
    let p = 0.3275911_f64;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x_abs = x.abs() / std::f64::consts::SQRT_2;
    let t = 1.0 / (1.0 + p * x_abs);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x_abs * x_abs).exp();

    0.5 * (1.0 + sign * y)
}

fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}
