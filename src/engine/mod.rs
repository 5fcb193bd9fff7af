mod apib;
mod csv_output;
mod drain;

pub use apib::ApibRunner;
pub use csv_output::parse_csv_output;

use crate::analysis;
use crate::metrics::compute_fit_metrics;
use crate::model::{InfoEvent, Sample, SweepConfig, SweepEvent, SweepResult};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop before the next level, drain poll or check run. The sweep then fails.
    Cancel,
}

/// Output of one load generator run.
#[derive(Debug, Clone)]
pub struct GeneratorRun {
    pub sample: Sample,
    /// Anything the generator wrote to stderr despite succeeding.
    pub stderr: String,
}

/// Produces one completed [`Sample`] per concurrency level.
#[async_trait]
pub trait LoadGenerator: Send + Sync {
    async fn warmup(&self, url: &str) -> Result<()>;

    async fn run(&self, concurrency: u32, duration: Duration, url: &str) -> Result<GeneratorRun>;
}

pub struct SweepEngine<G> {
    cfg: SweepConfig,
    generator: G,
}

impl SweepEngine<ApibRunner> {
    pub fn apib(cfg: SweepConfig) -> Self {
        let generator = ApibRunner::new(cfg.apib_path.clone());
        Self::new(cfg, generator)
    }
}

impl<G: LoadGenerator> SweepEngine<G> {
    pub fn new(cfg: SweepConfig, generator: G) -> Self {
        Self { cfg, generator }
    }

    /// Run every level one after another, analyze, and optionally re-run at the prediction.
    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<SweepEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<SweepResult> {
        let cfg = &self.cfg;
        let cancel = Arc::new(AtomicBool::new(false));

        let cancel2 = cancel.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Cancel => {
                        cancel2.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        });

        let result = self.sweep(&event_tx, &cancel).await;

        // Dropping a JoinHandle does not stop the task.
        control_handle.abort();

        let samples = result?;
        let analysis = analysis::analyze_detailed(&samples, cfg.percentile, cfg.target_latency_ms)
            .context("failed to analyze results")?;
        let fit_metrics = compute_fit_metrics(&samples, cfg.percentile, &analysis.coefficients);

        let check = if cfg.check_prediction {
            bail_if_cancelled(&cancel, &event_tx)?;
            Some(self.check_prediction(&event_tx, &analysis).await?)
        } else {
            None
        };

        Ok(SweepResult {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            url: cfg.url.clone(),
            percentile: cfg.percentile,
            target_latency_ms: cfg.target_latency_ms,
            samples,
            coefficients: analysis.coefficients,
            prediction: analysis.prediction,
            fit_metrics,
            check,
        })
    }

    /// Collect samples, returned in ascending concurrency order.
    async fn sweep(
        &self,
        event_tx: &mpsc::UnboundedSender<SweepEvent>,
        cancel: &AtomicBool,
    ) -> Result<Vec<Sample>> {
        let cfg = &self.cfg;

        let _ = event_tx.send(SweepEvent::Info(InfoEvent::Warmup {
            url: cfg.url.clone(),
        }));
        self.generator
            .warmup(&cfg.url)
            .await
            .context("warmup failed")?;

        let mut samples = Vec::with_capacity(cfg.concurrency_steps.len());
        for &concurrency in &cfg.concurrency_steps {
            if let Some(policy) = cfg.drain.as_ref() {
                drain::wait_for_connections_to_clear(policy, event_tx, cancel)
                    .await
                    .context("failed to check existing connections")?;
            }
            bail_if_cancelled(cancel, event_tx)?;

            let _ = event_tx.send(SweepEvent::LevelStarted { concurrency });
            match self
                .generator
                .run(concurrency, cfg.duration, &cfg.url)
                .await
            {
                Ok(run) => {
                    if !run.stderr.trim().is_empty() {
                        let _ = event_tx.send(SweepEvent::Info(InfoEvent::GeneratorStderr {
                            concurrency,
                            stderr: run.stderr,
                        }));
                    }
                    let _ = event_tx.send(SweepEvent::SampleCollected {
                        sample: run.sample.clone(),
                    });
                    samples.push(run.sample);
                }
                Err(e) => {
                    tracing::debug!(concurrency, error = %format!("{e:#}"), "level failed");
                    let _ = event_tx.send(SweepEvent::LevelFailed {
                        concurrency,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        // cancel may have landed during the last level
        bail_if_cancelled(cancel, event_tx)?;

        samples.sort_by_key(|s| s.concurrency);
        Ok(samples)
    }

    async fn check_prediction(
        &self,
        event_tx: &mpsc::UnboundedSender<SweepEvent>,
        analysis: &analysis::Analysis,
    ) -> Result<Sample> {
        let predicted = analysis.prediction.predicted_concurrency;
        let concurrency = (predicted.round() as u32).max(1);
        let _ = event_tx.send(SweepEvent::CheckStarted {
            predicted,
            concurrency,
        });

        let run = self
            .generator
            .run(concurrency, self.cfg.duration, &self.cfg.url)
            .await
            .with_context(|| format!("test failed for predicted concurrency {predicted:.2}"))?;
        let _ = event_tx.send(SweepEvent::SampleCollected {
            sample: run.sample.clone(),
        });
        Ok(run.sample)
    }
}

fn bail_if_cancelled(cancel: &AtomicBool, event_tx: &mpsc::UnboundedSender<SweepEvent>) -> Result<()> {
    if cancel.load(Ordering::Relaxed) {
        let _ = event_tx.send(SweepEvent::Info(InfoEvent::Cancelled));
        bail!("sweep cancelled");
    }
    Ok(())
}
