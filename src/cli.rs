use crate::engine::{EngineControl, SweepEngine};
use crate::model::{
    DrainPolicy, InfoEvent, LatencyPercentile, SweepConfig, SweepEvent, SweepResult,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "latency-sweep",
    version,
    about = "Run apib across concurrency levels and predict the concurrency for a target latency"
)]
pub struct Cli {
    /// The URL to test
    #[arg(long)]
    pub url: String,

    /// Duration of each apib run (whole seconds are passed to apib)
    #[arg(long, default_value = "10s")]
    pub duration: humantime::Duration,

    /// Target latency (ms) for prediction
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub target: u32,

    /// Comma-separated list of concurrency levels
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "1,2,10,50,100,200",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub concurrency: Vec<u32>,

    /// Latency statistic used for fitting and prediction
    #[arg(long, value_enum, default_value_t = LatencyPercentile::P90)]
    pub percentile: LatencyPercentile,

    /// Re-run apib at the predicted concurrency to check the prediction
    #[arg(long)]
    pub check: bool,

    /// Path to the apib executable
    #[arg(long, default_value = "apib")]
    pub apib: PathBuf,

    /// Wait until at most this many sockets are in TIME_WAIT before each level
    #[arg(long, default_value_t = 100)]
    pub drain_threshold: usize,

    /// Poll interval while waiting for TIME_WAIT sockets to clear
    #[arg(long, default_value = "5s")]
    pub drain_poll: humantime::Duration,

    /// Skip TIME_WAIT draining between levels
    #[arg(long)]
    pub no_drain: bool,

    /// Print JSON result and exit
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export results as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export results as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }
    if args.concurrency.is_empty() {
        return Err(anyhow::anyhow!("--concurrency needs at least one level"));
    }

    if args.json {
        return run_json(args).await;
    }
    run_text(args).await
}

/// Build a `SweepConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SweepConfig {
    SweepConfig {
        url: args.url.clone(),
        apib_path: args.apib.clone(),
        duration: Duration::from(args.duration),
        target_latency_ms: args.target,
        percentile: args.percentile,
        concurrency_steps: args.concurrency.clone(),
        check_prediction: args.check,
        drain: (!args.no_drain).then(|| DrainPolicy {
            threshold: args.drain_threshold,
            poll_interval: Duration::from(args.drain_poll),
        }),
    }
}

/// Forward Ctrl-C to the engine as a cancel request.
fn spawn_ctrl_c_forwarder() -> mpsc::UnboundedReceiver<EngineControl> {
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_tx.send(EngineControl::Cancel);
        }
    });
    ctrl_rx
}

/// Events still worth a stderr line when stdout carries JSON.
fn json_mode_warning(ev: &SweepEvent) -> Option<String> {
    match ev {
        SweepEvent::Info(info @ (InfoEvent::GeneratorStderr { .. } | InfoEvent::Cancelled)) => {
            Some(info.to_message())
        }
        SweepEvent::LevelFailed { concurrency, error } => Some(level_failed_line(*concurrency, error)),
        _ => None,
    }
}

fn level_failed_line(concurrency: u32, error: &str) -> String {
    format!("Test failed for concurrency {concurrency}: {error}")
}

async fn run_json(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SweepEvent>();
    let ctrl_rx = spawn_ctrl_c_forwarder();

    let silent = args.silent;
    let warnings = tokio::spawn(async move {
        while let Some(ev) = evt_rx.recv().await {
            if silent {
                continue;
            }
            if let Some(line) = json_mode_warning(&ev) {
                eprintln!("{line}");
            }
        }
    });

    let result = SweepEngine::apib(cfg).run(evt_tx, ctrl_rx).await;
    // the sender is gone once run returns, so this drains and ends
    let _ = warnings.await;
    let result = result.context("load test sweep failed")?;

    let processed = crate::orchestrator::process_sweep_completion(&args, &result);
    if !args.silent {
        println!("{}", serde_json::to_string_pretty(&result)?);
        for msg in processed.messages {
            eprintln!("{msg}");
        }
    }
    Ok(())
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let percentile = cfg.percentile;
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SweepEvent>();
    let ctrl_rx = spawn_ctrl_c_forwarder();

    let _ = out_tx.send(OutputLine::Stderr(format!(
        "Starting load tests for URL: {}",
        args.url
    )));

    let engine = SweepEngine::apib(cfg);
    let handle = tokio::spawn(async move { engine.run(evt_tx, ctrl_rx).await });

    while let Some(ev) = evt_rx.recv().await {
        let line = match ev {
            SweepEvent::LevelStarted { concurrency } => {
                format!("Running test with concurrency {concurrency}...")
            }
            SweepEvent::Draining { time_wait } => {
                format!("Waiting for connections to clear: {time_wait} TIME_WAIT")
            }
            SweepEvent::SampleCollected { sample } => sample.summary_line(percentile),
            SweepEvent::LevelFailed { concurrency, error } => {
                level_failed_line(concurrency, &error)
            }
            SweepEvent::CheckStarted {
                predicted,
                concurrency,
            } => format!(
                "Re-running tests to check predicted concurrency {predicted:.2} (rounded to {concurrency})"
            ),
            SweepEvent::Info(info) => info.to_message(),
        };
        let _ = out_tx.send(OutputLine::Stderr(line));
    }

    let result: Result<SweepResult> = handle
        .await
        .context("sweep task failed")?
        .context("load test sweep failed");
    let result = match result {
        Ok(r) => r,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    let summary = crate::text_summary::build_text_summary(&result);
    for line in summary.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    let processed = crate::orchestrator::process_sweep_completion(&args, &result);
    for msg in processed.messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_typical_sweep() {
        let args = Cli::parse_from(["latency-sweep", "--url", "http://localhost:8080/"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.concurrency_steps, vec![1, 2, 10, 50, 100, 200]);
        assert_eq!(cfg.duration, Duration::from_secs(10));
        assert_eq!(cfg.target_latency_ms, 100);
        assert_eq!(cfg.percentile, LatencyPercentile::P90);
        assert!(!cfg.check_prediction);
        let drain = cfg.drain.unwrap();
        assert_eq!(drain.threshold, 100);
        assert_eq!(drain.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn parses_sweep_options() {
        let args = Cli::parse_from([
            "latency-sweep",
            "--url",
            "http://localhost/",
            "--concurrency",
            "5,25,125",
            "--percentile",
            "p99",
            "--target",
            "250",
            "--duration",
            "30s",
            "--check",
            "--no-drain",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.concurrency_steps, vec![5, 25, 125]);
        assert_eq!(cfg.percentile, LatencyPercentile::P99);
        assert_eq!(cfg.target_latency_ms, 250);
        assert_eq!(cfg.duration, Duration::from_secs(30));
        assert!(cfg.check_prediction);
        assert!(cfg.drain.is_none());
    }

    #[test]
    fn rejects_zero_concurrency_and_target() {
        assert!(Cli::try_parse_from([
            "latency-sweep",
            "--url",
            "http://x/",
            "--concurrency",
            "1,0,5"
        ])
        .is_err());
        assert!(
            Cli::try_parse_from(["latency-sweep", "--url", "http://x/", "--target", "0"]).is_err()
        );
    }

    #[test]
    fn url_is_required() {
        assert!(Cli::try_parse_from(["latency-sweep"]).is_err());
    }

    #[tokio::test]
    async fn silent_requires_json() {
        let args = Cli::parse_from(["latency-sweep", "--url", "http://x/", "--silent"]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("--silent"));
    }

    #[test]
    fn json_mode_keeps_generator_warnings() {
        let stderr = SweepEvent::Info(InfoEvent::GeneratorStderr {
            concurrency: 50,
            stderr: "socket: too many open files\n".into(),
        });
        let line = json_mode_warning(&stderr).unwrap();
        assert!(line.contains("concurrency 50"));
        assert!(line.ends_with("socket: too many open files"));

        let failed = SweepEvent::LevelFailed {
            concurrency: 200,
            error: "apib exited with 1".into(),
        };
        assert_eq!(
            json_mode_warning(&failed).unwrap(),
            "Test failed for concurrency 200: apib exited with 1"
        );

        assert!(json_mode_warning(&SweepEvent::LevelStarted { concurrency: 1 }).is_none());
        assert!(json_mode_warning(&SweepEvent::Draining { time_wait: 500 }).is_none());
    }
}
