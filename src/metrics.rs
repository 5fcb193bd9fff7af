use crate::analysis::FitCoefficients;
use crate::model::{LatencyPercentile, Sample};
use serde::{Deserialize, Serialize};

/// How well the fitted curve tracks the observed latencies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    pub r_squared: f64,
    pub rmse_ms: f64,
    pub max_abs_residual_ms: f64,
}

/// Compute goodness-of-fit for `coefficients` over `samples` (needs at least 2 samples).
pub fn compute_fit_metrics(
    samples: &[Sample],
    percentile: LatencyPercentile,
    coefficients: &FitCoefficients,
) -> Option<FitMetrics> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let observed: Vec<f64> = samples.iter().map(|s| s.latency(percentile)).collect();
    let mean = observed.iter().sum::<f64>() / n;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut max_abs = 0.0_f64;
    for (s, y) in samples.iter().zip(&observed) {
        let residual = y - coefficients.eval(f64::from(s.concurrency));
        ss_res += residual * residual;
        ss_tot += (y - mean) * (y - mean);
        max_abs = max_abs.max(residual.abs());
    }

    // A flat series is explained perfectly by any curve that matches it.
    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    Some(FitMetrics {
        r_squared,
        rmse_ms: (ss_res / n).sqrt(),
        max_abs_residual_ms: max_abs,
    })
}
