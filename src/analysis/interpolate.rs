use super::ErrorKind;
use crate::model::Sample;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("not enough test results to interpolate: got {got}, need at least 2")]
    InsufficientSamples { got: usize },
    #[error("predicted concurrency {concurrency:.2} is out of bounds for the test results [{min}, {max}]")]
    OutOfBounds { concurrency: f64, min: u32, max: u32 },
}

impl InterpolationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InterpolationError::InsufficientSamples { .. } => ErrorKind::InsufficientSamples,
            InterpolationError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
        }
    }
}

/// Linearly interpolate throughput at a fractional concurrency.
///
/// `samples` must be sorted by concurrency. No extrapolation past either end.
pub fn interpolate_throughput(samples: &[Sample], concurrency: f64) -> Result<f64, InterpolationError> {
    let (first, last) = match samples {
        [first, .., last] => (first, last),
        _ => {
            return Err(InterpolationError::InsufficientSamples {
                got: samples.len(),
            })
        }
    };
    let out_of_bounds = || InterpolationError::OutOfBounds {
        concurrency,
        min: first.concurrency,
        max: last.concurrency,
    };

    // NaN fails both comparisons and lands here too.
    if !(concurrency >= f64::from(first.concurrency) && concurrency <= f64::from(last.concurrency))
    {
        return Err(out_of_bounds());
    }

    let (low, high) = samples
        .windows(2)
        .map(|w| (&w[0], &w[1]))
        .find(|(low, high)| {
            f64::from(low.concurrency) <= concurrency && concurrency <= f64::from(high.concurrency)
        })
        .ok_or_else(out_of_bounds)?;

    let (x1, y1) = (f64::from(low.concurrency), low.throughput);
    let (x2, y2) = (f64::from(high.concurrency), high.throughput);
    if x2 == x1 {
        return Ok(y1);
    }
    Ok(y1 + (y2 - y1) * (concurrency - x1) / (x2 - x1))
}
