//! Persisting derived metrics.

use finetl_core::{PeriodType, Result, StatementFilter, StatementStore};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::derive::derive_metrics;

/// Outcome of computing one company's metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    /// Metrics written.
    pub written: usize,
    /// Metrics that failed to persist.
    pub failed: usize,
}

/// Outcome of computing metrics for every company.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsRunSummary {
    /// Companies whose metrics were computed.
    pub companies: usize,
    /// Metrics written across all companies.
    pub written: usize,
    /// Metrics that failed to persist across all companies.
    pub failed: usize,
    /// Companies that could not be processed at all, with the reason.
    pub failed_companies: Vec<(i64, String)>,
}

/// Computes metrics from stored statements and writes them back.
#[derive(Debug)]
pub struct MetricsEngine<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for MetricsEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> MetricsEngine<S>
where
    S: StatementStore + ?Sized,
{
    /// Create an engine over `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Recomputes and upserts every metric for one company.
    ///
    /// A metric that fails to persist is logged and counted; the rest are
    /// still written.
    ///
    /// # Errors
    /// Returns an error if the company's statements cannot be read.
    #[instrument(skip(self))]
    pub async fn compute_and_persist(&self, company_id: i64) -> Result<MetricsSummary> {
        let statements = self
            .store
            .list_statements(
                StatementFilter::all()
                    .company(company_id)
                    .period(PeriodType::Annual),
            )
            .await?;

        let mut summary = MetricsSummary::default();
        for metric in derive_metrics(&statements) {
            match self
                .store
                .upsert_metric(company_id, metric.year, metric.name, metric.value)
                .await
            {
                Ok(_) => summary.written += 1,
                Err(e) => {
                    warn!(
                        year = metric.year,
                        metric = %metric.name,
                        error = %e,
                        "Failed to persist metric"
                    );
                    summary.failed += 1;
                }
            }
        }

        debug!(
            written = summary.written,
            failed = summary.failed,
            "Computed metrics"
        );
        Ok(summary)
    }

    /// Runs [`compute_and_persist`](Self::compute_and_persist) for every
    /// company, continuing past companies that fail.
    ///
    /// # Errors
    /// Returns an error only if the company list cannot be read.
    pub async fn compute_all(&self) -> Result<MetricsRunSummary> {
        let companies = self.store.list_companies().await?;
        let mut summary = MetricsRunSummary::default();

        for company in companies {
            match self.compute_and_persist(company.id).await {
                Ok(result) => {
                    summary.companies += 1;
                    summary.written += result.written;
                    summary.failed += result.failed;
                }
                Err(e) => {
                    warn!(company = %company.name, error = %e, "Failed to compute metrics");
                    summary.failed_companies.push((company.id, e.to_string()));
                }
            }
        }

        info!(
            companies = summary.companies,
            written = summary.written,
            failed = summary.failed,
            "Metrics computation complete"
        );
        Ok(summary)
    }
}
