#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Derived metrics.
//!
//! All metrics are percentages computed per fiscal year from annual
//! statements. A ratio whose inputs are missing, or whose denominator is
//! zero, is stored as no-value rather than skipped, so every year carries a
//! full set of rows.

/// Ratio derivation.
pub mod derive;
/// Metric persistence.
pub mod engine;

pub use derive::{DerivedMetric, derive_metrics, percent};
pub use engine::{MetricsEngine, MetricsRunSummary, MetricsSummary};
