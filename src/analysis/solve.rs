//! Inverting the fitted curve: concurrency at a target latency.

use super::fit::FitCoefficients;
use super::ErrorKind;

/// `|a|` at or below this is treated as a straight line.
const DEGENERATE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RootError {
    #[error("no real solutions for concurrency at target latency {target_ms}ms")]
    NoRealSolution { target_ms: u32 },
    #[error("quadratic term is ~0 ({a:e}); the fit is degenerate")]
    DegenerateFit { a: f64 },
}

impl RootError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RootError::NoRealSolution { .. } => ErrorKind::NoRealSolution,
            RootError::DegenerateFit { .. } => ErrorKind::DegenerateFit,
        }
    }
}

/// Both roots of `a*x^2 + b*x + (c - target) = 0` as `(larger-branch, smaller-branch)`,
/// i.e. `(-b + √Δ) / 2a` first.
pub fn roots(coefficients: &FitCoefficients, target_ms: u32) -> Result<(f64, f64), RootError> {
    let FitCoefficients { a, b, c } = *coefficients;
    if approx::abs_diff_eq!(a, 0.0, epsilon = DEGENERATE_EPSILON) {
        return Err(RootError::DegenerateFit { a });
    }

    let discriminant = b * b - 4.0 * a * (c - f64::from(target_ms));
    if discriminant < 0.0 {
        return Err(RootError::NoRealSolution { target_ms });
    }

    let sqrt_d = discriminant.sqrt();
    Ok(((-b + sqrt_d) / (2.0 * a), (-b - sqrt_d) / (2.0 * a)))
}

/// Concurrency at which the fitted curve reaches `target_ms`.
///
/// Always returns `(-b + √Δ) / 2a`. For an upward-opening fit that is the root on the
/// increasing side. A downward-opening fit (`a < 0`) makes this the smaller root, which
/// may not be the branch inside the measured range; validation catches the worst cases.
pub fn predict_concurrency(coefficients: &FitCoefficients, target_ms: u32) -> Result<f64, RootError> {
    roots(coefficients, target_ms).map(|(x, _)| x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn predicted_concurrency_hits_target() {
        let coef = FitCoefficients {
            a: 0.009813766567493339,
            b: 0.9246637667025318,
            c: 9.366465260977206,
        };
        let x = predict_concurrency(&coef, 100).unwrap();
        assert_relative_eq!(coef.eval(x), 100.0, max_relative = 1e-9);
        assert_relative_eq!(x, 59.9163, max_relative = 1e-5);
    }

    #[test]
    fn returns_larger_root_for_upward_fit() {
        // (x - 2)(x - 8) = x^2 - 10x + 16, target 0 shifted into c.
        let coef = FitCoefficients {
            a: 1.0,
            b: -10.0,
            c: 26.0,
        };
        let (hi, lo) = roots(&coef, 10).unwrap();
        assert_relative_eq!(hi, 8.0);
        assert_relative_eq!(lo, 2.0);
        assert_relative_eq!(predict_concurrency(&coef, 10).unwrap(), 8.0);
    }

    #[test]
    fn downward_fit_keeps_plus_branch() {
        // -(x - 2)(x - 8) = -x^2 + 10x - 16
        let coef = FitCoefficients {
            a: -1.0,
            b: 10.0,
            c: -16.0,
        };
        let x = predict_concurrency(&coef, 0).unwrap();
        assert_relative_eq!(x, 2.0);
    }

    #[test]
    fn negative_discriminant_has_no_solution() {
        let coef = FitCoefficients {
            a: 1.0,
            b: 0.0,
            c: 100.0,
        };
        let err = predict_concurrency(&coef, 50).unwrap_err();
        assert_eq!(err, RootError::NoRealSolution { target_ms: 50 });
        assert_eq!(err.kind(), ErrorKind::NoRealSolution);
    }

    #[test]
    fn zero_quadratic_term_is_degenerate() {
        let coef = FitCoefficients {
            a: 1e-15,
            b: 2.0,
            c: 1.0,
        };
        let err = predict_concurrency(&coef, 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateFit);
    }

    #[test]
    fn tangent_target_gives_double_root() {
        let coef = FitCoefficients {
            a: 1.0,
            b: -4.0,
            c: 4.0,
        };
        let (hi, lo) = roots(&coef, 0).unwrap();
        assert_relative_eq!(hi, 2.0);
        assert_relative_eq!(lo, 2.0);
    }
}
