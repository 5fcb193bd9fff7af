//! Concurrency sweeps on top of apib with latency-curve prediction.
//!
//! [`engine::SweepEngine`] runs the load generator once per concurrency level and hands the
//! completed samples to [`analysis::analyze`], which fits latency against concurrency and
//! predicts the concurrency (and throughput) at a target latency.

pub mod analysis;
pub mod cli;
pub mod engine;
pub mod metrics;
pub mod model;
mod orchestrator;
pub mod storage;
mod text_summary;
