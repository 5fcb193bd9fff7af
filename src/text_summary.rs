//! Text summary builder for CLI output.
//!
//! Formats the collected samples, the fitted curve and the prediction as plain lines.

use crate::model::SweepResult;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(result: &SweepResult) -> TextSummary {
    let mut lines = Vec::new();
    let pct = result.percentile;
    let target = result.target_latency_ms;

    lines.push(format!("URL: {}", result.url));
    lines.push(format!("Samples ({} latency):", pct));
    for sample in &result.samples {
        let mut line = format!("  {}", sample.summary_line(pct));
        if sample.has_errors() {
            line.push_str(&format!(
                " [{} of {} requests failed]",
                sample.errors, sample.completed
            ));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push("Analysis Results:".to_string());
    lines.push(format!(
        "Quadratic regression equation: {}",
        result.coefficients.equation()
    ));
    if let Some(m) = result.fit_metrics.as_ref() {
        lines.push(format!(
            "Fit quality: R² {:.4}, RMSE {:.2} ms, max residual {:.2} ms",
            m.r_squared, m.rmse_ms, m.max_abs_residual_ms
        ));
    }
    let p = &result.prediction;
    lines.push(format!(
        "Predicted Concurrency for {}ms Latency: {:.2}",
        target, p.predicted_concurrency
    ));
    lines.push(format!(
        "Predicted RPS for {}ms (Concurrency {:.2}): {:.2}",
        target, p.predicted_concurrency, p.predicted_throughput
    ));

    if let Some(check) = result.check.as_ref() {
        let observed = check.latency(pct);
        lines.push(format!(
            "Check run: {} (target {}ms, off by {:+.2}ms)",
            check.summary_line(pct),
            target,
            observed - f64::from(target)
        ));
    }

    TextSummary { lines }
}
