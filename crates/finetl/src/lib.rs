#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial statement ETL.
//!
//! This crate ties the pipeline stages together. It re-exports the core
//! types and the stage crates, loads [`Config`] from the environment and
//! drives ingestion through [`Pipeline`].
//!
//! # Example
//!
//! ```rust,ignore
//! use finetl::{Config, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> finetl::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = finetl::open_store(&config)?;
//!     let pipeline = Pipeline::from_config(&config, store)?;
//!
//!     let summary = pipeline.run(&config.companies).await?;
//!     println!("{summary}");
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

// Core types and traits
pub use finetl_core::*;

// Stages
pub use finetl_alphavantage::{
    AlphaVantageClient, DEFAULT_QUOTA_KEY, QuotaLimits, QuotaTracker, Reservation, RetryPolicy,
};
pub use finetl_metrics::{MetricsEngine, MetricsRunSummary, MetricsSummary, derive_metrics};
pub use finetl_normalize::{normalize, parse_date, parse_number};
pub use finetl_store::{InMemoryQuotaState, SqliteStore};

/// Environment-driven configuration.
pub mod config;
/// Pipeline orchestration.
pub mod pipeline;
/// Raw payload snapshots.
pub mod snapshot;

pub use config::{CompanySpec, Config, DataPeriod};
pub use pipeline::{IngestSummary, Pipeline, RunSummary};
pub use snapshot::Snapshot;

/// Opens the SQLite store named by the configuration.
///
/// # Errors
/// Returns an error if the database cannot be opened or initialized.
pub fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    SqliteStore::new(&config.database_path).map(Arc::new)
}

/// Builds an Alpha Vantage client whose quota state lives in `store`.
///
/// # Errors
/// Returns [`EtlError::Config`] if no API key is configured or the HTTP
/// client cannot be built, or an error if the quota state cannot be read.
pub fn build_client(config: &Config, store: Arc<SqliteStore>) -> Result<AlphaVantageClient> {
    let api_key = config.require_api_key()?;
    let quota = QuotaTracker::load(config.quota, DEFAULT_QUOTA_KEY, store)?;
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .map_err(|e| EtlError::Config(e.to_string()))?;

    Ok(
        AlphaVantageClient::with_client(http, api_key, Arc::new(quota))
            .with_base_url(config.base_url.clone()),
    )
}

impl Pipeline {
    /// Builds a fetching pipeline from configuration.
    ///
    /// # Errors
    /// Fails under the same conditions as [`build_client`].
    pub fn from_config(config: &Config, store: Arc<SqliteStore>) -> Result<Self> {
        let client = build_client(config, Arc::clone(&store))?;
        Ok(Self::new(Arc::new(client), store).configured(config))
    }

    /// Builds a pipeline without a source from configuration.
    #[must_use]
    pub fn offline_from_config(config: &Config, store: Arc<SqliteStore>) -> Self {
        Self::offline(store).configured(config)
    }

    fn configured(self, config: &Config) -> Self {
        self.with_periods(config.data_period.periods())
            .with_report_limit(config.report_limit)
            .with_deadline(config.run_timeout)
    }
}
