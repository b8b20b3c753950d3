//! Metrics collection and export for git-archiver.
//!
//! Metrics are recorded through the `metrics` crate facade. When the
//! `prometheus` feature is enabled and metrics are turned on in config, they
//! are exported in Prometheus text format.
//!
//! ```rust,ignore
//! use archiver_metrics::{counter, jobs, labels};
//!
//! counter!(jobs::TOTAL, labels::OUTCOME => "success").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
