use crate::model::{DrainPolicy, SweepEvent};
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::sync::mpsc;

const TIME_WAIT_COMMAND: &str = "netstat -an | grep TIME_WAIT | wc -l";

/// Number of sockets currently in TIME_WAIT.
async fn count_time_wait() -> Result<usize> {
    let out = Command::new("sh")
        .arg("-c")
        .arg(TIME_WAIT_COMMAND)
        .output()
        .await
        .context("failed to execute netstat")?;
    if !out.status.success() {
        bail!(
            "netstat pipeline exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    parse_time_wait_count(&String::from_utf8_lossy(&out.stdout))
}

pub(crate) fn parse_time_wait_count(raw: &str) -> Result<usize> {
    let trimmed = raw.trim();
    trimmed
        .parse()
        .with_context(|| format!("failed to parse TIME_WAIT count {trimmed:?}"))
}

/// Block until TIME_WAIT sockets fall to the policy threshold, polling at its interval.
///
/// Returns early (Ok) when `cancel` is raised; the caller decides what cancellation means.
pub(crate) async fn wait_for_connections_to_clear(
    policy: &DrainPolicy,
    event_tx: &mpsc::UnboundedSender<SweepEvent>,
    cancel: &AtomicBool,
) -> Result<()> {
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
        let count = count_time_wait().await?;
        if count <= policy.threshold {
            return Ok(());
        }
        tracing::debug!(
            time_wait = count,
            threshold = policy.threshold,
            "waiting for connections to clear"
        );
        let _ = event_tx.send(SweepEvent::Draining { time_wait: count });
        tokio::time::sleep(policy.poll_interval).await;
    }
}
