//! Persisting sweep results: auto-save history plus explicit JSON/CSV exports.

use crate::model::{Sample, SweepResult};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default auto-save directory under the per-user data dir.
pub fn runs_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine user data directory")?;
    Ok(base.join("latency-sweep").join("runs"))
}

/// Auto-save into [`runs_dir`].
pub fn save_run(result: &SweepResult) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, result)
}

pub fn save_run_in(dir: &Path, result: &SweepResult) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let stamp = result.timestamp_utc.replace(':', "-").replace('T', "_");
    let path = dir.join(format!("sweep-{stamp}.json"));
    export_json(&path, result)?;
    Ok(path)
}

pub fn export_json(path: &Path, result: &SweepResult) -> Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    kind: &'a str,
    concurrency: u32,
    throughput: f64,
    latency_ms: f64,
    percentile: &'a str,
    avg_latency_ms: f64,
    p50_ms: f64,
    p90_ms: f64,
    p98_ms: f64,
    p99_ms: f64,
    completed: u64,
    errors: u64,
}

impl<'a> CsvRow<'a> {
    fn new(kind: &'a str, sample: &Sample, result: &'a SweepResult) -> Self {
        Self {
            kind,
            concurrency: sample.concurrency,
            throughput: sample.throughput,
            latency_ms: sample.latency(result.percentile),
            percentile: result.percentile.label(),
            avg_latency_ms: sample.avg_latency_ms,
            p50_ms: sample.p50_ms,
            p90_ms: sample.p90_ms,
            p98_ms: sample.p98_ms,
            p99_ms: sample.p99_ms,
            completed: sample.completed,
            errors: sample.errors,
        }
    }
}

/// One row per sweep sample, with the check run (if any) last.
pub fn export_csv(path: &Path, result: &SweepResult) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for sample in &result.samples {
        writer.serialize(CsvRow::new("sweep", sample, result))?;
    }
    if let Some(check) = result.check.as_ref() {
        writer.serialize(CsvRow::new("check", check, result))?;
    }
    writer
        .flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::{FitCoefficients, PredictionResult};
    use crate::model::LatencyPercentile;

    pub(crate) fn result_fixture() -> SweepResult {
        let samples = [(1, 10.0, 100.0), (10, 20.0, 900.0), (50, 80.0, 4000.0)]
            .iter()
            .map(|&(c, lat, rps)| Sample::new(c, rps).with_latency(LatencyPercentile::P90, lat))
            .collect();
        SweepResult {
            timestamp_utc: "2024-05-01T12:30:00Z".into(),
            url: "http://localhost:8080/".into(),
            percentile: LatencyPercentile::P90,
            target_latency_ms: 60,
            samples,
            coefficients: FitCoefficients {
                a: 0.01,
                b: 1.0,
                c: 9.0,
            },
            prediction: PredictionResult {
                predicted_concurrency: 38.2,
                predicted_throughput: 3055.0,
            },
            fit_metrics: None,
            check: Some(Sample::new(38, 3000.0).with_latency(LatencyPercentile::P90, 61.0)),
        }
    }

    #[test]
    fn save_run_writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_run_in(dir.path(), &result_fixture()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "sweep-2024-05-01_12-30-00Z.json"
        );
        let back: SweepResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.samples.len(), 3);
        assert_eq!(back.percentile, LatencyPercentile::P90);
        assert_eq!(back.check.unwrap().concurrency, 38);
    }

    #[test]
    fn csv_has_one_row_per_sample_plus_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        export_csv(&path, &result_fixture()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "kind");
        assert_eq!(&headers[3], "latency_ms");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[2][1], "50");
        assert_eq!(&rows[2][3], "80.0");
        assert_eq!(&rows[3][0], "check");
        assert_eq!(&rows[3][4], "90%");
    }
}
