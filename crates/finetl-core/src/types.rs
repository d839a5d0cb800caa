//! Core data types for the pipeline.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`CanonicalFields`] - Normalized numeric statement fields
//! - [`CompanyRecord`] - A stored company
//! - [`StatementRecord`] - A stored financial statement
//! - [`MetricRecord`] - A stored derived metric
//! - [`QuotaSnapshot`] - Persisted API quota counters

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EtlError;
use crate::period::{PeriodType, StatementKind};

/// Raw JSON document as returned by the external API.
pub type RawPayload = serde_json::Value;

/// Currency assumed when a report does not declare one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Normalized numeric fields of a statement, independent of source naming.
///
/// Each statement kind fills only its own fields; the rest stay `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFields {
    /// Total revenue.
    pub revenue: Option<f64>,
    /// Gross profit.
    pub gross_profit: Option<f64>,
    /// Net income.
    pub net_income: Option<f64>,
    /// Total assets.
    pub total_assets: Option<f64>,
    /// Total liabilities.
    pub total_liabilities: Option<f64>,
    /// Operating cash flow.
    pub operating_cashflow: Option<f64>,
    /// Reporting currency.
    pub currency: String,
}

impl Default for CanonicalFields {
    fn default() -> Self {
        Self {
            revenue: None,
            gross_profit: None,
            net_income: None,
            total_assets: None,
            total_liabilities: None,
            operating_cashflow: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// A company as stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Store-assigned identity.
    pub id: i64,
    /// Unique company name.
    pub name: String,
    /// Unique ticker.
    pub ticker: Symbol,
    /// Opaque metadata bag.
    pub metadata: serde_json::Value,
    /// When the row was first inserted.
    pub created_at: DateTime<Utc>,
}

/// A financial statement as stored.
///
/// Unique per (`company_id`, `statement_type`, `fiscal_date`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    /// Store-assigned identity, stable across re-ingestion.
    pub id: i64,
    /// Owning company.
    pub company_id: i64,
    /// Statement kind.
    pub statement_type: StatementKind,
    /// Annual or quarterly.
    pub period: PeriodType,
    /// Period-end date the statement reports on.
    pub fiscal_date: NaiveDate,
    /// Source report, kept for auditability.
    pub raw_data: RawPayload,
    /// Normalized numeric fields.
    pub fields: CanonicalFields,
    /// When the row was first inserted.
    pub created_at: DateTime<Utc>,
}

/// Name of a derived metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    /// Gross profit as a percentage of revenue.
    GrossMargin,
    /// Net income as a percentage of revenue.
    NetMargin,
    /// Revenue growth over the prior fiscal year, in percent.
    RevenueYoy,
    /// Operating cash flow as a percentage of revenue.
    OperatingCashMargin,
    /// Total liabilities as a percentage of total assets.
    DebtRatio,
    /// Net income as a percentage of total assets.
    ReturnOnAssets,
}

impl MetricName {
    /// All metrics, in computation order.
    pub const ALL: [Self; 6] = [
        Self::GrossMargin,
        Self::NetMargin,
        Self::RevenueYoy,
        Self::OperatingCashMargin,
        Self::DebtRatio,
        Self::ReturnOnAssets,
    ];

    /// Name stored in the `metric_name` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GrossMargin => "gross_margin",
            Self::NetMargin => "net_margin",
            Self::RevenueYoy => "revenue_yoy",
            Self::OperatingCashMargin => "operating_cash_margin",
            Self::DebtRatio => "debt_ratio",
            Self::ReturnOnAssets => "return_on_assets",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| EtlError::Parse(format!("Invalid metric name: {s}")))
    }
}

/// A derived metric as stored.
///
/// Unique per (`company_id`, `year`, `metric_name`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Store-assigned identity.
    pub id: i64,
    /// Owning company.
    pub company_id: i64,
    /// Fiscal year.
    pub year: i32,
    /// Metric name.
    pub metric_name: MetricName,
    /// Ratio value, `None` when it cannot be computed.
    pub value: Option<f64>,
    /// When the row was first inserted.
    pub created_at: DateTime<Utc>,
}

/// Persisted state of the API quota counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// UTC day the daily counter belongs to.
    pub day: NaiveDate,
    /// Calls made during `day`.
    pub day_count: u32,
    /// Timestamps of calls inside the trailing minute window.
    pub minute_calls: Vec<DateTime<Utc>>,
    /// Last time the snapshot was written.
    pub updated_at: DateTime<Utc>,
}

impl QuotaSnapshot {
    /// Creates an empty snapshot for the day containing `now`.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            day_count: 0,
            minute_calls: Vec::new(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercases() {
        let symbol = Symbol::new(" tel ");
        assert_eq!(symbol.as_str(), "TEL");
        assert_eq!(symbol.to_string(), "TEL");
    }

    #[test]
    fn test_canonical_default_currency() {
        assert_eq!(CanonicalFields::default().currency, "USD");
    }

    #[test]
    fn test_metric_name_round_trip() {
        for metric in MetricName::ALL {
            assert_eq!(metric.as_str().parse::<MetricName>().unwrap(), metric);
        }
        assert!("ebitda_margin".parse::<MetricName>().is_err());
    }
}
