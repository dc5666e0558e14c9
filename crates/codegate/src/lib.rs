//! Submission evaluation pipeline: archive loading, rule evaluation, and the
//! queue-driven processor that renders a verdict for every uploaded archive.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
