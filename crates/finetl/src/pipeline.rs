//! Fetch, normalize, store and derive, one company at a time.

use finetl_core::{
    CancelFlag, CompanyRecord, EtlError, PeriodType, RawPayload, Result, StatementKind,
    StatementSource, StatementStore, StopSignal,
};
use finetl_metrics::{MetricsEngine, MetricsRunSummary};
use finetl_normalize::{extract_reports, prepare};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::CompanySpec;
use crate::snapshot::Snapshot;

/// Outcome of ingesting one payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Statements written.
    pub written: usize,
    /// Reports rejected by normalization.
    pub rejected: usize,
    /// Statements that failed to persist.
    pub failed: usize,
}

/// Outcome of a pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Companies processed.
    pub companies: usize,
    /// Payloads fetched (or read from a snapshot).
    pub fetched: usize,
    /// Statements written.
    pub statements_written: usize,
    /// Reports rejected by normalization.
    pub rejected: usize,
    /// Fetches that failed.
    pub fetch_failures: usize,
    /// Companies or statements that failed to persist.
    pub persistence_failures: usize,
    /// Snapshot entries matching no configured company.
    pub unmatched_companies: usize,
    /// Metrics written.
    pub metrics_written: usize,
    /// Metrics that failed to persist.
    pub metrics_failed: usize,
    /// True if the run stopped early on cancellation or deadline.
    pub cancelled: bool,
}

impl RunSummary {
    fn absorb(&mut self, ingest: IngestSummary) {
        self.statements_written += ingest.written;
        self.rejected += ingest.rejected;
        self.persistence_failures += ingest.failed;
    }

    fn absorb_metrics(&mut self, metrics: &MetricsRunSummary) {
        self.metrics_written += metrics.written;
        self.metrics_failed += metrics.failed;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} companies, {} payloads, {} statements written, {} rejected, \
             {} fetch failures, {} persistence failures, {} metrics written, {} metrics failed",
            self.companies,
            self.fetched,
            self.statements_written,
            self.rejected,
            self.fetch_failures,
            self.persistence_failures,
            self.metrics_written,
            self.metrics_failed,
        )?;
        if self.unmatched_companies > 0 {
            write!(f, ", {} unmatched companies", self.unmatched_companies)?;
        }
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// The ingestion pipeline.
///
/// Companies are processed sequentially; each statement kind is one fetch.
/// Failures are isolated per (company, kind) and per report, so one bad
/// payload never aborts the run. Re-running is safe: every write is an upsert.
pub struct Pipeline {
    source: Option<Arc<dyn StatementSource>>,
    store: Arc<dyn StatementStore>,
    periods: Vec<PeriodType>,
    report_limit: Option<usize>,
    deadline: Option<Duration>,
    cancel: CancelFlag,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.as_ref().map(|s| s.name()))
            .field("periods", &self.periods)
            .field("report_limit", &self.report_limit)
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline fetching from `source` into `store`.
    ///
    /// Defaults: annual reports only, the 3 most recent per statement kind,
    /// no deadline.
    #[must_use]
    pub fn new(source: Arc<dyn StatementSource>, store: Arc<dyn StatementStore>) -> Self {
        Self {
            source: Some(source),
            ..Self::offline(store)
        }
    }

    /// Create a pipeline without a source, for snapshot loads and metrics.
    #[must_use]
    pub fn offline(store: Arc<dyn StatementStore>) -> Self {
        Self {
            source: None,
            store,
            periods: vec![PeriodType::Annual],
            report_limit: Some(crate::config::DEFAULT_REPORT_LIMIT),
            deadline: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Set which report lists to ingest.
    #[must_use]
    pub fn with_periods(mut self, periods: Vec<PeriodType>) -> Self {
        self.periods = periods;
        self
    }

    /// Keep at most `limit` most recent reports per statement kind and period,
    /// `None` for all.
    #[must_use]
    pub fn with_report_limit(mut self, limit: Option<usize>) -> Self {
        self.report_limit = limit;
        self
    }

    /// Give up once a run has lasted this long. Checked before each fetch and
    /// while a fetch waits for quota.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Use an externally owned cancel flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The flag that stops this pipeline.
    #[must_use]
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// The store this pipeline writes to.
    #[must_use]
    pub const fn store(&self) -> &Arc<dyn StatementStore> {
        &self.store
    }

    fn require_source(&self) -> Result<&Arc<dyn StatementSource>> {
        self.source
            .as_ref()
            .ok_or_else(|| EtlError::Config("Pipeline has no statement source".to_string()))
    }

    /// Stop signal for a run starting now.
    fn stop_signal(&self) -> StopSignal {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        StopSignal::new(self.cancel.clone(), deadline)
    }

    /// Fetches, stores and derives metrics for `companies`.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] if the pipeline has no source. Every other
    /// failure is logged and counted in the summary.
    #[instrument(skip(self, companies), fields(companies = companies.len()))]
    pub async fn run(&self, companies: &[CompanySpec]) -> Result<RunSummary> {
        let source = self.require_source()?;
        let stop = self.stop_signal();
        let mut summary = RunSummary::default();

        'companies: for spec in companies {
            let Some(company) = self.register(spec, &mut summary).await else {
                continue;
            };

            for kind in StatementKind::ALL {
                match source.fetch_until(&company.ticker, kind, &stop).await {
                    Ok(payload) => {
                        summary.fetched += 1;
                        let ingest = self.ingest_payload(&company, kind, &payload).await;
                        summary.absorb(ingest);
                    }
                    Err(EtlError::Cancelled) => {
                        warn!(
                            company = %company.name,
                            kind = %kind,
                            "Run stopped before completion"
                        );
                        summary.cancelled = true;
                        break 'companies;
                    }
                    Err(e) => {
                        warn!(company = %company.name, kind = %kind, error = %e, "Fetch failed");
                        summary.fetch_failures += 1;
                    }
                }
            }
        }

        self.derive_metrics(&mut summary).await;
        info!(%summary, "Run complete");
        Ok(summary)
    }

    /// Fetches raw payloads for `companies` without touching the store.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] if the pipeline has no source.
    #[instrument(skip(self, companies), fields(companies = companies.len()))]
    pub async fn extract(&self, companies: &[CompanySpec]) -> Result<(Snapshot, RunSummary)> {
        let source = self.require_source()?;
        let stop = self.stop_signal();
        let mut snapshot = Snapshot::new();
        let mut summary = RunSummary::default();

        'companies: for spec in companies {
            summary.companies += 1;
            for kind in StatementKind::ALL {
                match source.fetch_until(&spec.ticker, kind, &stop).await {
                    Ok(payload) => {
                        summary.fetched += 1;
                        snapshot.insert(spec.name.clone(), kind, payload);
                    }
                    Err(EtlError::Cancelled) => {
                        warn!(
                            company = %spec.name,
                            kind = %kind,
                            "Extraction stopped before completion"
                        );
                        summary.cancelled = true;
                        break 'companies;
                    }
                    Err(e) => {
                        warn!(company = %spec.name, kind = %kind, error = %e, "Fetch failed");
                        summary.fetch_failures += 1;
                    }
                }
            }
        }

        info!(%summary, "Extraction complete");
        Ok((snapshot, summary))
    }

    /// Ingests a snapshot, then derives metrics. Snapshot entries are matched
    /// to `companies` by name or ticker; unmatched entries are skipped.
    #[instrument(skip(self, snapshot, companies), fields(entries = snapshot.len()))]
    pub async fn load_snapshot(&self, snapshot: &Snapshot, companies: &[CompanySpec]) -> RunSummary {
        let mut summary = RunSummary::default();

        for key in snapshot.companies() {
            let Some(spec) = companies
                .iter()
                .find(|c| c.name == key || c.ticker.as_str().eq_ignore_ascii_case(key))
            else {
                warn!(company = key, "No configured company matches snapshot entry");
                summary.unmatched_companies += 1;
                continue;
            };

            let Some(company) = self.register(spec, &mut summary).await else {
                continue;
            };

            for (kind, payload) in snapshot.payloads(key) {
                summary.fetched += 1;
                let ingest = self.ingest_payload(&company, kind, payload).await;
                summary.absorb(ingest);
            }
        }

        self.derive_metrics(&mut summary).await;
        info!(%summary, "Snapshot load complete");
        summary
    }

    /// Normalizes and stores every report in one raw payload.
    ///
    /// Shared by live fetches and snapshot loads. Reports without a usable
    /// fiscal date are rejected and counted; the rest are upserted, keeping
    /// only the most recent ones when a report limit is set.
    pub async fn ingest_payload(
        &self,
        company: &CompanyRecord,
        kind: StatementKind,
        payload: &RawPayload,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for &period in &self.periods {
            let mut prepared = Vec::new();
            for report in extract_reports(payload, period) {
                match prepare(report, kind, period) {
                    Ok(report) => prepared.push(report),
                    Err(rejection) => {
                        warn!(
                            company = %company.name,
                            kind = %kind,
                            %rejection,
                            "Rejected report"
                        );
                        summary.rejected += 1;
                    }
                }
            }

            prepared.sort_by(|a, b| b.fiscal_date.cmp(&a.fiscal_date));
            if let Some(limit) = self.report_limit {
                prepared.truncate(limit);
            }

            for report in prepared {
                match self
                    .store
                    .upsert_statement(
                        company.id,
                        kind,
                        report.period,
                        report.fiscal_date,
                        &report.raw,
                        &report.fields,
                    )
                    .await
                {
                    Ok(_) => summary.written += 1,
                    Err(e) => {
                        warn!(
                            company = %company.name,
                            kind = %kind,
                            fiscal_date = %report.fiscal_date,
                            error = %e,
                            "Failed to store statement"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        debug!(
            company = %company.name,
            kind = %kind,
            written = summary.written,
            rejected = summary.rejected,
            "Ingested payload"
        );
        summary
    }

    /// Recomputes metrics for every stored company.
    ///
    /// # Errors
    /// Returns an error if the company list cannot be read.
    pub async fn compute_metrics(&self) -> Result<MetricsRunSummary> {
        MetricsEngine::new(Arc::clone(&self.store)).compute_all().await
    }

    async fn register(&self, spec: &CompanySpec, summary: &mut RunSummary) -> Option<CompanyRecord> {
        match self
            .store
            .upsert_company(&spec.name, spec.ticker.as_str(), None)
            .await
        {
            Ok(company) => {
                summary.companies += 1;
                Some(company)
            }
            Err(e) => {
                warn!(company = %spec.name, error = %e, "Failed to store company");
                summary.persistence_failures += 1;
                None
            }
        }
    }

    async fn derive_metrics(&self, summary: &mut RunSummary) {
        match self.compute_metrics().await {
            Ok(metrics) => summary.absorb_metrics(&metrics),
            Err(e) => warn!(error = %e, "Metrics computation failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use finetl_alphavantage::{AlphaVantageClient, QuotaLimits, QuotaTracker};
    use finetl_core::{MetricName, StatementFilter, Symbol};
    use finetl_store::SqliteStore;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned payloads and fails for anything else.
    #[derive(Debug, Default)]
    struct CannedSource {
        payloads: HashMap<(String, StatementKind), Value>,
        calls: AtomicUsize,
    }

    impl CannedSource {
        fn with(mut self, ticker: &str, kind: StatementKind, payload: Value) -> Self {
            self.payloads.insert((ticker.to_string(), kind), payload);
            self
        }
    }

    #[async_trait]
    impl StatementSource for CannedSource {
        fn name(&self) -> &str {
            "canned"
        }

        async fn fetch(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawPayload> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.payloads
                .get(&(symbol.to_string(), kind))
                .cloned()
                .ok_or_else(|| EtlError::RemoteData {
                    symbol: symbol.to_string(),
                    kind,
                    message: "Invalid API call.".to_string(),
                })
        }
    }

    fn income_payload() -> Value {
        json!({
            "symbol": "TEL",
            "annualReports": [
                {"fiscalDateEnding": "2023-12-31", "totalRevenue": "160", "grossProfit": "56", "netIncome": "32"},
                {"fiscalDateEnding": "2022-12-31", "totalRevenue": "150", "grossProfit": "50", "netIncome": "30"},
                {"fiscalDateEnding": "2021-12-31", "totalRevenue": "140", "grossProfit": "45", "netIncome": "28"},
                {"fiscalDateEnding": "2020-12-31", "totalRevenue": "130", "grossProfit": "40", "netIncome": "26"},
                {"fiscalDateEnding": "None", "totalRevenue": "1"}
            ],
            "quarterlyReports": [
                {"fiscalDateEnding": "2023-09-30", "totalRevenue": "40"}
            ]
        })
    }

    fn tel() -> Vec<CompanySpec> {
        vec![CompanySpec::new("TE Connectivity", "TEL")]
    }

    #[tokio::test]
    async fn test_run_ingests_most_recent_reports() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(
            CannedSource::default()
                .with("TEL", StatementKind::IncomeStatement, income_payload())
                .with("TEL", StatementKind::BalanceSheet, json!({"annualReports": []})),
        );
        let pipeline = Pipeline::new(source.clone(), store.clone());

        let summary = pipeline.run(&tel()).await.unwrap();

        assert_eq!(source.calls.load(Ordering::Relaxed), 3);
        assert_eq!(summary.companies, 1);
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.fetch_failures, 1);
        assert_eq!(summary.statements_written, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.metrics_written, 3 * MetricName::ALL.len());
        assert!(!summary.cancelled);

        let statements = store.list_statements(StatementFilter::all()).await.unwrap();
        let dates: Vec<String> = statements.iter().map(|s| s.fiscal_date.to_string()).collect();
        assert_eq!(dates, vec!["2021-12-31", "2022-12-31", "2023-12-31"]);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(
            CannedSource::default().with("TEL", StatementKind::IncomeStatement, income_payload()),
        );
        let pipeline = Pipeline::new(source, store.clone())
            .with_report_limit(None)
            .with_periods(vec![PeriodType::Annual, PeriodType::Quarterly]);

        pipeline.run(&tel()).await.unwrap();
        let first = store.list_statements(StatementFilter::all()).await.unwrap();
        let metrics = store.list_metrics(None).await.unwrap();
        pipeline.run(&tel()).await.unwrap();
        let second = store.list_statements(StatementFilter::all()).await.unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(
            first.iter().map(|s| s.id).collect::<Vec<_>>(),
            second.iter().map(|s| s.id).collect::<Vec<_>>()
        );
        assert_eq!(store.list_metrics(None).await.unwrap().len(), metrics.len());
        assert_eq!(store.list_companies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_fetching() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(CannedSource::default());
        let cancel = CancelFlag::new();
        let pipeline = Pipeline::new(source.clone(), store).with_cancel_flag(cancel.clone());

        cancel.cancel();
        let summary = pipeline.run(&tel()).await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(source.calls.load(Ordering::Relaxed), 0);
        assert!(summary.to_string().ends_with("(cancelled)"));
    }

    #[tokio::test]
    async fn test_deadline_stops_run() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(CannedSource::default());
        let pipeline = Pipeline::new(source.clone(), store).with_deadline(Some(Duration::ZERO));

        let summary = pipeline.run(&tel()).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(source.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_offline_pipeline_cannot_fetch() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = Pipeline::offline(store);
        assert!(matches!(pipeline.run(&tel()).await, Err(EtlError::Config(_))));
        assert!(pipeline.extract(&tel()).await.is_err());
    }

    #[tokio::test]
    async fn test_extract_then_load_snapshot() {
        let source = Arc::new(
            CannedSource::default().with("TEL", StatementKind::IncomeStatement, income_payload()),
        );
        let scratch = Arc::new(SqliteStore::in_memory().unwrap());
        let (snapshot, extracted) = Pipeline::new(source, scratch.clone())
            .extract(&tel())
            .await
            .unwrap();
        assert_eq!(extracted.fetched, 1);
        assert_eq!(extracted.fetch_failures, 2);
        assert!(scratch.list_companies().await.unwrap().is_empty());

        let mut snapshot = snapshot;
        snapshot.insert("Unknown Corp", StatementKind::IncomeStatement, json!({}));

        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let summary = Pipeline::offline(store.clone()).load_snapshot(&snapshot, &tel()).await;

        assert_eq!(summary.unmatched_companies, 1);
        assert_eq!(summary.statements_written, 3);
        assert!(summary.metrics_written > 0);
        assert!(store.company_by_ticker("TEL").await.unwrap().is_some());
    }

    /// A client whose daily quota is already spent, so any fetch waits
    /// until UTC midnight. Its endpoint is never reached.
    async fn exhausted_client() -> Arc<AlphaVantageClient> {
        let quota = Arc::new(QuotaTracker::new(QuotaLimits::default()));
        quota.mark_day_exhausted(quota.now()).await.unwrap();
        Arc::new(AlphaVantageClient::new("demo", quota).with_base_url("http://127.0.0.1:9/query"))
    }

    #[tokio::test]
    async fn test_deadline_interrupts_quota_wait() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = Pipeline::new(exhausted_client().await, store)
            .with_deadline(Some(Duration::from_secs(1)));

        let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&tel()))
            .await
            .expect("run returns before the quota frees up")
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.fetch_failures, 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_quota_wait() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let pipeline = Pipeline::new(exhausted_client().await, store);
        let cancel = pipeline.cancel_flag().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let (_, summary) = tokio::time::timeout(Duration::from_secs(5), pipeline.extract(&tel()))
            .await
            .expect("extraction returns once cancelled")
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.fetched, 0);
    }
}
