use super::fit::FitCoefficients;
use super::solve::{roots, RootError};
use super::ErrorKind;
use crate::model::{LatencyPercentile, Sample};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("all observed latencies are above the target latency of {target_ms}ms")]
    TargetUnreachable { target_ms: u32 },
    #[error(
        "predicted roots ({root1:.2}, {root2:.2}) are outside the observed concurrency range [{min}, {max}]"
    )]
    RootsOutOfRange {
        root1: f64,
        root2: f64,
        min: u32,
        max: u32,
    },
    #[error("target latency cannot be achieved based on the quadratic fit: {0}")]
    Roots(#[from] RootError),
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::TargetUnreachable { .. } => ErrorKind::TargetUnreachable,
            ValidationError::RootsOutOfRange { .. } => ErrorKind::RootsOutOfRange,
            ValidationError::Roots(e) => e.kind(),
        }
    }
}

/// Gate on the solved prediction. `samples` must be sorted by concurrency.
///
/// Rejects targets below every measured latency first, then fits whose roots both fall
/// outside the measured concurrency envelope.
pub fn validate(
    coefficients: &FitCoefficients,
    target_ms: u32,
    percentile: LatencyPercentile,
    samples: &[Sample],
) -> Result<(), ValidationError> {
    let target = f64::from(target_ms);
    if samples.iter().all(|s| s.latency(percentile) > target) {
        return Err(ValidationError::TargetUnreachable { target_ms });
    }

    let (root1, root2) = roots(coefficients, target_ms)?;

    // Non-empty: the check above fails on an empty slice.
    let (min, max) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first.concurrency, last.concurrency),
        _ => return Err(ValidationError::TargetUnreachable { target_ms }),
    };
    let in_range = |r: f64| r >= f64::from(min) && r <= f64::from(max);
    if !in_range(root1) && !in_range(root2) {
        return Err(ValidationError::RootsOutOfRange {
            root1,
            root2,
            min,
            max,
        });
    }

    Ok(())
}
