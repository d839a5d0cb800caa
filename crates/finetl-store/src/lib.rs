#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage implementations for the statement pipeline.
//!
//! This crate provides implementations of the store traits from `finetl-core`:
//!
//! - [`SqliteStore`] - Persistent SQLite store for companies, statements,
//!   metrics and quota state (default, requires `sqlite` feature)
//! - [`InMemoryQuotaState`] - Volatile quota state for testing

/// In-memory quota state.
pub mod memory;

#[cfg(feature = "sqlite")]
mod report;
/// SQLite-based store implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the traits for convenience
pub use finetl_core::{QuotaStateStore, StatementStore};

pub use memory::InMemoryQuotaState;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
