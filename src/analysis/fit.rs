//! Least-squares quadratic fit of latency against concurrency.

use super::ErrorKind;
use crate::model::{LatencyPercentile, Sample};
use serde::{Deserialize, Serialize};

/// Relative pivot size below which the normal equations are treated as singular.
const SINGULAR_PIVOT_TOLERANCE: f64 = 1e-10;

/// Coefficients of `latency = a*x^2 + b*x + c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl FitCoefficients {
    pub fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }

    pub fn equation(&self) -> String {
        format!(
            "Latency (ms) = {:.4}x^2 + {:.4}x + {:.4}",
            self.a, self.b, self.c
        )
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("insufficient data points for quadratic regression: got {got}, need at least 3")]
    InsufficientData { got: usize },
    #[error("normal equations are singular; need at least 3 distinct concurrency levels")]
    SingularMatrix,
}

impl FitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FitError::InsufficientData { .. } => ErrorKind::InsufficientData,
            FitError::SingularMatrix => ErrorKind::SingularMatrix,
        }
    }
}

/// Fit a quadratic through `(concurrency, latency)` pairs by solving the normal equations.
///
/// Concurrency is mapped onto `[-1, 1]` before the system is built so the power sums stay
/// well conditioned even for tightly clustered levels; the coefficients are mapped back
/// afterwards.
///
/// `SingularMatrix` also covers systems that are merely ill-conditioned: levels such as
/// `[1, 2, 1_000_000]` are distinct, but the two low levels collapse onto `u = -1` and the
/// relative pivot test rejects the matrix.
pub fn fit(samples: &[Sample], percentile: LatencyPercentile) -> Result<FitCoefficients, FitError> {
    if samples.len() < 3 {
        return Err(FitError::InsufficientData { got: samples.len() });
    }

    for s in samples.iter().filter(|s| s.has_errors()) {
        tracing::warn!(
            concurrency = s.concurrency,
            errors = s.errors,
            completed = s.completed,
            "{} out of {} requests returned errors; fit may be inaccurate",
            s.errors,
            s.completed
        );
    }

    let (lo, hi) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        let x = f64::from(s.concurrency);
        (lo.min(x), hi.max(x))
    });
    let mid = (lo + hi) / 2.0;
    let half = (hi - lo) / 2.0;
    if half <= 0.0 {
        return Err(FitError::SingularMatrix);
    }

    // XᵀX is built from power sums Σu^k, Xᵀy from Σu^k·y.
    let mut pow_sums = [0.0_f64; 5];
    let mut rhs = [0.0_f64; 3];
    for s in samples {
        let u = (f64::from(s.concurrency) - mid) / half;
        let y = s.latency(percentile);
        let mut uk = 1.0;
        for (k, sum) in pow_sums.iter_mut().enumerate() {
            *sum += uk;
            if k < 3 {
                rhs[k] += uk * y;
            }
            uk *= u;
        }
    }

    let normal = [
        [pow_sums[0], pow_sums[1], pow_sums[2]],
        [pow_sums[1], pow_sums[2], pow_sums[3]],
        [pow_sums[2], pow_sums[3], pow_sums[4]],
    ];
    let [c_u, b_u, a_u] = solve_3x3(normal, rhs).ok_or(FitError::SingularMatrix)?;

    // y = A·u² + B·u + C with u = (x - mid) / half
    let a = a_u / (half * half);
    let b = b_u / half - 2.0 * a * mid;
    let c = c_u - b_u * mid / half + a * mid * mid;
    let coefficients = FitCoefficients { a, b, c };

    tracing::debug!(a, b, c, points = samples.len(), "quadratic fit");
    Ok(coefficients)
}

/// Gaussian elimination with partial pivoting. `None` when the system is singular.
fn solve_3x3(mut m: [[f64; 3]; 3], mut rhs: [f64; 3]) -> Option<[f64; 3]> {
    let magnitude = m
        .iter()
        .flatten()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if magnitude == 0.0 || !magnitude.is_finite() {
        return None;
    }
    let tolerance = magnitude * SINGULAR_PIVOT_TOLERANCE;

    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))?;
        if m[pivot][col].abs() <= tolerance {
            return None;
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut out = [0.0_f64; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * out[k]).sum();
        out[row] = (rhs[row] - tail) / m[row][row];
    }
    Some(out)
}
