//! Parsing of apib's `-S` CSV line.
//!
//! Columns: name, throughput, avg. latency, threads, connections, duration, completed,
//! successful, errors, sockets, min. latency, max. latency, 50%, 90%, 98%, 99%

use crate::model::Sample;
use anyhow::{bail, Context, Result};
use csv::StringRecord;
use std::str::FromStr;

const COLUMNS: usize = 16;

fn column<T>(record: &StringRecord, idx: usize, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    record
        .get(idx)
        .unwrap_or_default()
        .parse::<T>()
        .with_context(|| format!("failed to parse {name}"))
}

/// Parse the first record of apib's CSV output into a [`Sample`].
pub fn parse_csv_output(output: &str) -> Result<Sample> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(output.as_bytes());

    let record = match reader.records().next() {
        Some(r) => r.context("could not read CSV records")?,
        None => bail!("no records found in CSV output"),
    };
    if record.len() < COLUMNS {
        bail!(
            "invalid CSV format {:?}: expected {} columns, got {}",
            record.iter().collect::<Vec<_>>(),
            COLUMNS,
            record.len()
        );
    }

    Ok(Sample {
        name: record.get(0).unwrap_or_default().to_string(),
        throughput: column(&record, 1, "throughput")?,
        avg_latency_ms: column(&record, 2, "avg latency")?,
        threads: column(&record, 3, "threads")?,
        concurrency: column(&record, 4, "connections")?,
        duration_secs: column(&record, 5, "duration")?,
        completed: column(&record, 6, "completed")?,
        successful: column(&record, 7, "successful")?,
        errors: column(&record, 8, "errors")?,
        sockets: column(&record, 9, "sockets")?,
        min_latency_ms: column(&record, 10, "min latency")?,
        max_latency_ms: column(&record, 11, "max latency")?,
        p50_ms: column(&record, 12, "50% latency")?,
        p90_ms: column(&record, 13, "90% latency")?,
        p98_ms: column(&record, 14, "98% latency")?,
        p99_ms: column(&record, 15, "99% latency")?,
    })
}
