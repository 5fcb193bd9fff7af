use crate::engine::csv_output::parse_csv_output;
use crate::engine::{GeneratorRun, LoadGenerator};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Drives the `apib` binary in CSV (`-S`) mode.
#[derive(Debug, Clone)]
pub struct ApibRunner {
    program: PathBuf,
}

impl ApibRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.kill_on_drop(true);
        cmd
    }
}

/// apib takes whole seconds; anything shorter still runs for one.
pub(crate) fn run_args(concurrency: u32, duration: Duration, url: &str) -> Vec<String> {
    vec![
        "-S".to_string(),
        "-c".to_string(),
        concurrency.to_string(),
        "-d".to_string(),
        duration.as_secs().max(1).to_string(),
        url.to_string(),
    ]
}

#[async_trait]
impl LoadGenerator for ApibRunner {
    async fn warmup(&self, url: &str) -> Result<()> {
        let out = self
            .command()
            .args(["-S", "-1", url])
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.program.display()))?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !out.status.success() {
            bail!("apib exited with {}\nOutput: {}", out.status, stdout);
        }
        if !stderr.trim().is_empty() {
            bail!("apib produced stderr output: {}", stderr.trim_end());
        }
        Ok(())
    }

    async fn run(&self, concurrency: u32, duration: Duration, url: &str) -> Result<GeneratorRun> {
        let out = self
            .command()
            .args(run_args(concurrency, duration, url))
            .output()
            .await
            .with_context(|| format!("failed to execute {}", self.program.display()))?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        if !out.status.success() {
            bail!(
                "apib exited with {}\nStdout: {}\nStderr: {}",
                out.status,
                stdout,
                stderr
            );
        }

        let sample = parse_csv_output(&stdout)
            .with_context(|| format!("unexpected apib output at concurrency {concurrency}"))?;
        Ok(GeneratorRun { sample, stderr })
    }
}
