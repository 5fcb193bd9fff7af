use approx::assert_relative_eq;
use latency_sweep::analysis::{
    analyze, fit, interpolate_throughput, predict_concurrency, validate, ErrorKind,
    FitCoefficients, Stage,
};
use latency_sweep::model::{LatencyPercentile, Sample};
use proptest::prelude::*;

const P90: LatencyPercentile = LatencyPercentile::P90;

fn sweep(points: &[(u32, f64, f64)]) -> Vec<Sample> {
    points
        .iter()
        .map(|&(c, lat, rps)| Sample::new(c, rps).with_latency(P90, lat))
        .collect()
}

#[test]
fn end_to_end_prediction_lands_between_bracketing_levels() {
    let samples = sweep(&[
        (1, 10.0, 100.0),
        (10, 20.0, 900.0),
        (50, 80.0, 4000.0),
        (100, 200.0, 6000.0),
    ]);

    let result = analyze(&samples, P90, 100).unwrap();
    assert!(result.predicted_concurrency > 50.0);
    assert!(result.predicted_concurrency < 100.0);
    assert!(result.predicted_throughput > 4000.0);
    assert!(result.predicted_throughput < 6000.0);
}

#[test]
fn analysis_is_repeatable_for_what_if_targets() {
    let samples = sweep(&[
        (1, 10.0, 100.0),
        (10, 20.0, 900.0),
        (50, 80.0, 4000.0),
        (100, 200.0, 6000.0),
    ]);
    let first = analyze(&samples, P90, 100).unwrap();
    let lower = analyze(&samples, P90, 50).unwrap();
    let again = analyze(&samples, P90, 100).unwrap();

    assert_eq!(first, again);
    assert!(lower.predicted_concurrency < first.predicted_concurrency);
}

#[test]
fn fit_requires_three_samples() {
    for n in 0..3 {
        let samples: Vec<Sample> = (1..=n)
            .map(|c| Sample::new(c, 1.0).with_latency(P90, 1.0))
            .collect();
        assert_eq!(fit(&samples, P90).unwrap_err().kind(), ErrorKind::InsufficientData);
    }
}

#[test]
fn fit_is_singular_for_a_single_level() {
    let samples = sweep(&[(8, 10.0, 1.0), (8, 11.0, 1.0), (8, 9.0, 1.0)]);
    assert_eq!(fit(&samples, P90).unwrap_err().kind(), ErrorKind::SingularMatrix);
}

#[test]
fn no_real_solution_when_curve_never_reaches_target() {
    let coef = FitCoefficients {
        a: 1.0,
        b: 0.0,
        c: 100.0,
    };
    assert_eq!(
        predict_concurrency(&coef, 50).unwrap_err().kind(),
        ErrorKind::NoRealSolution
    );
}

#[test]
fn validate_rejects_target_below_measured_floor() {
    let samples = sweep(&[(1, 50.0, 1.0), (10, 70.0, 1.0), (50, 120.0, 1.0)]);
    let coef = fit(&samples, P90).unwrap();
    assert_eq!(
        validate(&coef, 10, P90, &samples).unwrap_err().kind(),
        ErrorKind::TargetUnreachable
    );

    let err = analyze(&samples, P90, 10).unwrap_err();
    assert_eq!(err.stage(), Stage::Validate);
    assert_eq!(err.kind(), ErrorKind::TargetUnreachable);
}

#[test]
fn interpolation_bounds() {
    let samples = sweep(&[(1, 1.0, 100.0), (10, 1.0, 900.0), (50, 1.0, 4000.0)]);
    assert_relative_eq!(interpolate_throughput(&samples, 10.0).unwrap(), 900.0);
    assert_eq!(
        interpolate_throughput(&samples, 0.99).unwrap_err().kind(),
        ErrorKind::OutOfBounds
    );
    assert_eq!(
        interpolate_throughput(&samples, 50.5).unwrap_err().kind(),
        ErrorKind::OutOfBounds
    );
}

proptest! {
    #[test]
    fn fit_recovers_known_quadratic(
        a in 0.0001f64..0.1,
        b in 0.0f64..5.0,
        c in 0.5f64..50.0,
        levels in proptest::collection::btree_set(1u32..500, 3..10),
    ) {
        let x_max = levels.iter().copied().max().map_or(1.0, f64::from);
        let samples: Vec<Sample> = levels
            .into_iter()
            .map(|x| {
                let xf = f64::from(x);
                Sample::new(x, xf * 10.0).with_latency(P90, a * xf * xf + b * xf + c)
            })
            .collect();

        let coef = fit(&samples, P90).unwrap();
        for s in &samples {
            let x = f64::from(s.concurrency);
            prop_assert!((coef.eval(x) - s.latency(P90)).abs() <= 1e-6 * s.latency(P90).max(1.0));
        }
        // Each coefficient's error, weighted by the x power it multiplies, stays small
        // relative to the largest latency in the sweep.
        let y_max = a * x_max * x_max + b * x_max + c;
        prop_assert!((coef.a - a).abs() <= 1e-6 * a.max(1e-3));
        prop_assert!((coef.b - b).abs() * x_max <= 1e-6 * y_max);
        prop_assert!((coef.c - c).abs() <= 1e-6 * y_max);
    }

    #[test]
    fn interpolation_is_exact_at_every_sample(
        levels in proptest::collection::btree_set(1u32..1000, 2..12),
    ) {
        let samples: Vec<Sample> = levels
            .iter()
            .map(|&x| Sample::new(x, f64::from(x) * 7.5 + 3.0))
            .collect();
        for s in &samples {
            let rps = interpolate_throughput(&samples, f64::from(s.concurrency)).unwrap();
            prop_assert!((rps - s.throughput).abs() <= 1e-9 * s.throughput);
        }
    }

    #[test]
    fn predicted_root_satisfies_the_quadratic(
        a in 0.001f64..1.0,
        b in -5.0f64..5.0,
        c in 0.0f64..50.0,
        target in 60u32..1000,
    ) {
        // c < target and a > 0 keep the discriminant positive.
        let coef = FitCoefficients { a, b, c };
        let x = predict_concurrency(&coef, target).unwrap();
        let t = f64::from(target);
        prop_assert!((coef.eval(x) - t).abs() <= 1e-6 * t);
    }
}
