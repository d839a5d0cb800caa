//! Store traits for statements, metrics and quota state.
//!
//! This module defines the [`StatementStore`] trait, the persistence contract
//! the pipeline and the metrics engine write through, and the
//! [`QuotaStateStore`] trait that keeps API quota counters across restarts.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::Result,
    period::{PeriodType, StatementKind},
    types::{
        CanonicalFields, CompanyRecord, MetricName, MetricRecord, QuotaSnapshot, RawPayload,
        StatementRecord,
    },
};

/// Optional filters for [`StatementStore::list_statements`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatementFilter {
    /// Restrict to one company.
    pub company_id: Option<i64>,
    /// Restrict to one statement kind.
    pub statement_type: Option<StatementKind>,
    /// Restrict to one period type.
    pub period: Option<PeriodType>,
}

impl StatementFilter {
    /// Matches every statement.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            company_id: None,
            statement_type: None,
            period: None,
        }
    }

    /// Restricts to one company.
    #[must_use]
    pub const fn company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }

    /// Restricts to one statement kind.
    #[must_use]
    pub const fn kind(mut self, kind: StatementKind) -> Self {
        self.statement_type = Some(kind);
        self
    }

    /// Restricts to one period type.
    #[must_use]
    pub const fn period(mut self, period: PeriodType) -> Self {
        self.period = Some(period);
        self
    }
}

/// Idempotent persistence of companies, statements and metrics.
///
/// Uniqueness of statements per (company, kind, fiscal date) and of metrics
/// per (company, year, name) must be enforced by the backing storage itself.
#[async_trait]
pub trait StatementStore: Send + Sync {
    /// Inserts a company or updates the one matching by name or ticker.
    ///
    /// When name and ticker match two different rows the name match wins.
    async fn upsert_company(
        &self,
        name: &str,
        ticker: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<CompanyRecord>;

    /// Returns all companies ordered by id.
    async fn list_companies(&self) -> Result<Vec<CompanyRecord>>;

    /// Returns the company with the given ticker, if any.
    async fn company_by_ticker(&self, ticker: &str) -> Result<Option<CompanyRecord>>;

    /// Inserts a statement or replaces the mutable fields of the existing row
    /// for the same (company, kind, fiscal date). The identity is stable.
    async fn upsert_statement(
        &self,
        company_id: i64,
        statement_type: StatementKind,
        period: PeriodType,
        fiscal_date: NaiveDate,
        raw_payload: &RawPayload,
        fields: &CanonicalFields,
    ) -> Result<StatementRecord>;

    /// Lists statements matching `filter`, ascending by fiscal date.
    async fn list_statements(&self, filter: StatementFilter) -> Result<Vec<StatementRecord>>;

    /// Inserts or overwrites the metric for (company, year, name).
    async fn upsert_metric(
        &self,
        company_id: i64,
        year: i32,
        metric_name: MetricName,
        value: Option<f64>,
    ) -> Result<MetricRecord>;

    /// Lists metrics ordered by company, year and name.
    async fn list_metrics(&self, company_id: Option<i64>) -> Result<Vec<MetricRecord>>;
}

/// Durable storage for API quota counters.
///
/// Calls are synchronous; they happen once per outbound request.
pub trait QuotaStateStore: Send + Sync + std::fmt::Debug {
    /// Loads the snapshot stored under `key`, if any.
    fn load_quota(&self, key: &str) -> Result<Option<QuotaSnapshot>>;

    /// Replaces the snapshot stored under `key`.
    fn save_quota(&self, key: &str, snapshot: &QuotaSnapshot) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = StatementFilter::all()
            .company(7)
            .kind(StatementKind::IncomeStatement)
            .period(PeriodType::Annual);
        assert_eq!(filter.company_id, Some(7));
        assert_eq!(filter.statement_type, Some(StatementKind::IncomeStatement));
        assert_eq!(filter.period, Some(PeriodType::Annual));
        assert_eq!(StatementFilter::default(), StatementFilter::all());
    }
}
