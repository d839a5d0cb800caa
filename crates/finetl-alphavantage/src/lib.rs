#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Alpha Vantage statement source.
//!
//! This crate implements [`StatementSource`](finetl_core::StatementSource) for the
//! [Alpha Vantage](https://www.alphavantage.co/) fundamentals endpoints.
//!
//! # Usage
//!
//! ```rust,ignore
//! use finetl_alphavantage::{AlphaVantageClient, QuotaLimits, QuotaTracker};
//! use finetl_core::{StatementKind, StatementSource, Symbol};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let quota = Arc::new(QuotaTracker::new(QuotaLimits::default()));
//!     let client = AlphaVantageClient::new("your_api_key", quota);
//!
//!     let payload = client
//!         .fetch(&Symbol::new("TEL"), StatementKind::IncomeStatement)
//!         .await?;
//!     println!("{}", payload["annualReports"]);
//!
//!     Ok(())
//! }
//! ```

/// HTTP client.
pub mod client;
/// Call quota accounting.
pub mod quota;
/// Retry policy.
pub mod retry;

pub use client::{AlphaVantageClient, DEFAULT_BASE_URL};
pub use quota::{
    Clock, DEFAULT_QUOTA_KEY, MINUTE_WINDOW, Permit, QuotaLimits, QuotaTracker, Reservation,
};
pub use retry::RetryPolicy;
