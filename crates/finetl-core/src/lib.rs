#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the financial statement pipeline.
//!
//! This crate provides the foundational abstractions shared by every stage:
//!
//! - [`StatementSource`](source::StatementSource) - Fetches raw statement payloads
//! - [`StatementStore`](store::StatementStore) - Idempotent persistence of companies,
//!   statements and metrics
//! - [`QuotaStateStore`](store::QuotaStateStore) - Durable API quota counters
//! - [`EtlError`](error::EtlError) - The error taxonomy

/// Error types for pipeline operations.
pub mod error;
/// Statement kinds and reporting periods.
pub mod period;
/// Source trait for fetching raw statement payloads.
pub mod source;
/// Cancellation and deadlines.
pub mod stop;
/// Store traits for statements, metrics and quota state.
pub mod store;
/// Core data types (Symbol, records, canonical fields, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use error::{EtlError, Result};
pub use period::{PeriodType, StatementKind};
pub use source::StatementSource;
pub use stop::{CancelFlag, StopSignal};
pub use store::{QuotaStateStore, StatementFilter, StatementStore};
pub use types::{
    CanonicalFields, CompanyRecord, MetricName, MetricRecord, QuotaSnapshot, RawPayload,
    StatementRecord, Symbol,
};
