//! Latency/concurrency analysis.
//!
//! A sweep of samples is fitted with a quadratic, the fit is inverted at the target
//! latency, the root is checked against the measured envelope and throughput is
//! interpolated at the predicted concurrency. Everything here is pure: no I/O, no shared
//! state, safe to call from any thread over the same samples.

mod fit;
mod interpolate;
mod solve;
mod validate;

pub use fit::{fit, FitCoefficients, FitError};
pub use interpolate::{interpolate_throughput, InterpolationError};
pub use solve::{predict_concurrency, roots, RootError};
pub use validate::{validate, ValidationError};

use crate::model::{LatencyPercentile, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flat classification of every analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InsufficientData,
    SingularMatrix,
    DegenerateFit,
    NoRealSolution,
    RootsOutOfRange,
    TargetUnreachable,
    OutOfBounds,
    InsufficientSamples,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Fit,
    Solve,
    Validate,
    Interpolate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fit => "fit",
            Stage::Solve => "solve",
            Stage::Validate => "validate",
            Stage::Interpolate => "interpolate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("failed to perform quadratic regression: {0}")]
    Fit(#[from] FitError),
    #[error("failed to predict concurrency: {0}")]
    Solve(#[from] RootError),
    #[error("prediction rejected: {0}")]
    Validate(#[from] ValidationError),
    #[error("failed to interpolate throughput: {0}")]
    Interpolate(#[from] InterpolationError),
}

impl AnalysisError {
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::Fit(_) => Stage::Fit,
            AnalysisError::Solve(_) => Stage::Solve,
            AnalysisError::Validate(_) => Stage::Validate,
            AnalysisError::Interpolate(_) => Stage::Interpolate,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Fit(e) => e.kind(),
            AnalysisError::Solve(e) => e.kind(),
            AnalysisError::Validate(e) => e.kind(),
            AnalysisError::Interpolate(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_concurrency: f64,
    pub predicted_throughput: f64,
}

/// Full output of one analysis: the fit it was derived from plus the prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Analysis {
    pub coefficients: FitCoefficients,
    pub prediction: PredictionResult,
}

/// Fit, solve, validate and interpolate. `samples` must be sorted by concurrency.
///
/// The first failing stage ends the analysis; there is no partial result.
pub fn analyze(
    samples: &[Sample],
    percentile: LatencyPercentile,
    target_ms: u32,
) -> Result<PredictionResult, AnalysisError> {
    analyze_detailed(samples, percentile, target_ms).map(|a| a.prediction)
}

/// Same as [`analyze`] but also hands back the fitted coefficients.
pub fn analyze_detailed(
    samples: &[Sample],
    percentile: LatencyPercentile,
    target_ms: u32,
) -> Result<Analysis, AnalysisError> {
    let coefficients = fit(samples, percentile)?;
    let predicted_concurrency = predict_concurrency(&coefficients, target_ms)?;
    validate(&coefficients, target_ms, percentile, samples)?;
    let predicted_throughput = interpolate_throughput(samples, predicted_concurrency)?;

    tracing::debug!(
        target_ms,
        %percentile,
        predicted_concurrency,
        predicted_throughput,
        "analysis complete"
    );

    Ok(Analysis {
        coefficients,
        prediction: PredictionResult {
            predicted_concurrency,
            predicted_throughput,
        },
    })
}
