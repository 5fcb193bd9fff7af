use crate::analysis::{FitCoefficients, PredictionResult};
use crate::metrics::FitMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which latency statistic drives fitting, validation and reporting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LatencyPercentile {
    #[value(name = "p50")]
    P50,
    #[default]
    #[value(name = "p90")]
    P90,
    #[value(name = "p98")]
    P98,
    #[value(name = "p99")]
    P99,
    #[value(name = "avg")]
    Avg,
}

impl LatencyPercentile {
    /// Column label used by apib for this statistic.
    pub fn label(self) -> &'static str {
        match self {
            LatencyPercentile::P50 => "50%",
            LatencyPercentile::P90 => "90%",
            LatencyPercentile::P98 => "98%",
            LatencyPercentile::P99 => "99%",
            LatencyPercentile::Avg => "avg",
        }
    }
}

impl fmt::Display for LatencyPercentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One completed apib run at a fixed concurrency level.
///
/// Latencies are in milliseconds, throughput in requests per second.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub name: String,
    pub concurrency: u32,
    pub throughput: f64,
    pub avg_latency_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p98_ms: f64,
    pub p99_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub threads: u32,
    pub duration_secs: f64,
    pub completed: u64,
    pub successful: u64,
    pub errors: u64,
    pub sockets: u64,
}

impl Sample {
    pub fn new(concurrency: u32, throughput: f64) -> Self {
        Self {
            concurrency,
            throughput,
            ..Default::default()
        }
    }

    /// Set a single latency statistic.
    pub fn with_latency(mut self, percentile: LatencyPercentile, ms: f64) -> Self {
        match percentile {
            LatencyPercentile::P50 => self.p50_ms = ms,
            LatencyPercentile::P90 => self.p90_ms = ms,
            LatencyPercentile::P98 => self.p98_ms = ms,
            LatencyPercentile::P99 => self.p99_ms = ms,
            LatencyPercentile::Avg => self.avg_latency_ms = ms,
        }
        self
    }

    pub fn with_errors(mut self, errors: u64, completed: u64) -> Self {
        self.errors = errors;
        self.completed = completed;
        self.successful = completed.saturating_sub(errors);
        self
    }

    pub fn latency(&self, percentile: LatencyPercentile) -> f64 {
        match percentile {
            LatencyPercentile::P50 => self.p50_ms,
            LatencyPercentile::P90 => self.p90_ms,
            LatencyPercentile::P98 => self.p98_ms,
            LatencyPercentile::P99 => self.p99_ms,
            LatencyPercentile::Avg => self.avg_latency_ms,
        }
    }

    /// Samples with failed requests are still fitted but may skew the curve.
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// One-line rendering used while the sweep is running.
    pub fn summary_line(&self, percentile: LatencyPercentile) -> String {
        format!(
            "Concurrency: {}, Throughput: {:.2} RPS, Latency: {:.2}ms ({})",
            self.concurrency,
            self.throughput,
            self.latency(percentile),
            percentile
        )
    }
}

/// Settings for TIME_WAIT draining between levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainPolicy {
    pub threshold: usize,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            threshold: 100,
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub url: String,
    pub apib_path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target_latency_ms: u32,
    pub percentile: LatencyPercentile,
    pub concurrency_steps: Vec<u32>,
    pub check_prediction: bool,
    /// `None` disables draining.
    pub drain: Option<DrainPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SweepEvent {
    LevelStarted {
        concurrency: u32,
    },
    Draining {
        time_wait: usize,
    },
    SampleCollected {
        sample: Sample,
    },
    LevelFailed {
        concurrency: u32,
        error: String,
    },
    CheckStarted {
        predicted: f64,
        concurrency: u32,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Warmup { url: String },
    GeneratorStderr { concurrency: u32, stderr: String },
    Cancelled,
}

impl InfoEvent {
    /// Render a human-readable message for the CLI.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Warmup { url } => format!("Warming up {}", url),
            InfoEvent::GeneratorStderr {
                concurrency,
                stderr,
            } => format!(
                "Warning: load generator produced stderr output at concurrency {}:\n{}",
                concurrency,
                stderr.trim_end()
            ),
            InfoEvent::Cancelled => "Cancelling…".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    #[serde(default)]
    pub timestamp_utc: String,
    pub url: String,
    pub percentile: LatencyPercentile,
    pub target_latency_ms: u32,
    pub samples: Vec<Sample>,
    pub coefficients: FitCoefficients,
    pub prediction: PredictionResult,
    #[serde(default)]
    pub fit_metrics: Option<FitMetrics>,
    /// Extra run at the rounded predicted concurrency.
    #[serde(default)]
    pub check: Option<Sample>,
}
