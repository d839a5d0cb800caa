#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/finetl/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Normalization of raw statement reports.
//!
//! A raw API payload holds lists of reports (`annualReports`,
//! `quarterlyReports`). Each report is a flat JSON object whose keys vary by
//! statement kind and API version. [`normalize`] resolves the keys through the
//! static tables in [`mapping`] and parses the values with [`parse_number`].
//!
//! ```
//! use finetl_core::StatementKind;
//! use finetl_normalize::normalize;
//! use serde_json::json;
//!
//! let report = json!({"fiscalDateEnding": "2022-12-31", "totalRevenue": "150000000"});
//! let fields = normalize(&report, StatementKind::IncomeStatement);
//! assert_eq!(fields.revenue, Some(150_000_000.0));
//! assert_eq!(fields.currency, "USD");
//! ```

use chrono::NaiveDate;
use finetl_core::{CanonicalFields, PeriodType, RawPayload, StatementKind};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Alias tables per statement kind.
pub mod mapping;
mod parse;

pub use mapping::{CanonicalField, FieldMapping, mapping_for};
pub use parse::{number_from_value, parse_date, parse_number};

/// Returns the value of the first alias that is present and non-empty.
#[must_use]
pub fn resolve_alias<'a>(report: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| report.get(*alias))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

/// Maps one raw report onto the canonical fields for its statement kind.
///
/// Never fails: missing or unreadable values become `None`, and the currency
/// falls back to USD.
#[must_use]
pub fn normalize(report: &Value, kind: StatementKind) -> CanonicalFields {
    let mut fields = CanonicalFields::default();

    for mapping in mapping_for(kind) {
        let value = resolve_alias(report, mapping.aliases).and_then(number_from_value);
        mapping.field.assign(&mut fields, value);
    }

    if let Some(currency) =
        resolve_alias(report, mapping::CURRENCY_ALIASES).and_then(Value::as_str)
    {
        fields.currency = currency.trim().to_string();
    }

    fields
}

/// Reads the fiscal date of a report.
#[must_use]
pub fn fiscal_date(report: &Value) -> Option<NaiveDate> {
    match resolve_alias(report, mapping::FISCAL_DATE_ALIASES)? {
        Value::String(s) => parse_date(s),
        Value::Number(n) => parse_date(&n.to_string()),
        _ => None,
    }
}

/// Returns the reports of one period type from a raw payload, in API order.
///
/// Entries that are not JSON objects are skipped.
#[must_use]
pub fn extract_reports(payload: &RawPayload, period: PeriodType) -> Vec<RawPayload> {
    payload
        .get(period.reports_key())
        .and_then(Value::as_array)
        .map(|reports| reports.iter().filter(|r| r.is_object()).cloned().collect())
        .unwrap_or_default()
}

/// A report ready to be stored.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedReport {
    /// Period-end date.
    pub fiscal_date: NaiveDate,
    /// Annual or quarterly.
    pub period: PeriodType,
    /// Canonical fields.
    pub fields: CanonicalFields,
    /// The source report, unchanged.
    pub raw: RawPayload,
}

/// Why a report cannot be stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The report has no parseable fiscal date, which the store keys on.
    MissingFiscalDate {
        /// The date text found, if any.
        raw: Option<String>,
    },
    /// The report is not a JSON object.
    NotAnObject,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFiscalDate { raw: Some(raw) } => {
                write!(f, "unparseable fiscal date {raw:?}")
            }
            Self::MissingFiscalDate { raw: None } => f.write_str("missing fiscal date"),
            Self::NotAnObject => f.write_str("report is not an object"),
        }
    }
}

/// Normalizes a report and attaches its fiscal date.
///
/// # Errors
///
/// Returns a [`Rejection`] when the report cannot be keyed by fiscal date.
pub fn prepare(
    report: RawPayload,
    kind: StatementKind,
    period: PeriodType,
) -> Result<NormalizedReport, Rejection> {
    if !report.is_object() {
        return Err(Rejection::NotAnObject);
    }

    let Some(fiscal_date) = fiscal_date(&report) else {
        let raw = resolve_alias(&report, mapping::FISCAL_DATE_ALIASES).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        debug!(kind = %kind, raw = ?raw, "Rejecting report without fiscal date");
        return Err(Rejection::MissingFiscalDate { raw });
    };

    Ok(NormalizedReport {
        fiscal_date,
        period,
        fields: normalize(&report, kind),
        raw: report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_income_statement_camel_case() {
        let report = json!({
            "fiscalDateEnding": "2022-12-31",
            "reportedCurrency": "EUR",
            "totalRevenue": "150000000",
            "grossProfit": "50000000",
            "netIncome": "(30000000)"
        });
        let fields = normalize(&report, StatementKind::IncomeStatement);
        assert_eq!(fields.revenue, Some(150_000_000.0));
        assert_eq!(fields.gross_profit, Some(50_000_000.0));
        assert_eq!(fields.net_income, Some(-30_000_000.0));
        assert_eq!(fields.currency, "EUR");
        assert_eq!(fields.total_assets, None);
    }

    #[test]
    fn test_legacy_snake_case_aliases() {
        let report = json!({"revenues": "10", "gross_profit": "4", "netIncomeLoss": 2});
        let fields = normalize(&report, StatementKind::IncomeStatement);
        assert_eq!(fields.revenue, Some(10.0));
        assert_eq!(fields.gross_profit, Some(4.0));
        assert_eq!(fields.net_income, Some(2.0));
    }

    #[test]
    fn test_first_non_empty_alias_wins() {
        let report = json!({"totalRevenue": "", "revenues": null, "Revenue": "7"});
        let fields = normalize(&report, StatementKind::IncomeStatement);
        assert_eq!(fields.revenue, Some(7.0));

        let report = json!({"totalRevenue": "None", "revenues": "9"});
        let fields = normalize(&report, StatementKind::IncomeStatement);
        assert_eq!(fields.revenue, None);
    }

    #[test]
    fn test_balance_sheet_and_cash_flow() {
        let balance = json!({"totalAssets": "1,000", "total_liabilities": "400"});
        let fields = normalize(&balance, StatementKind::BalanceSheet);
        assert_eq!(fields.total_assets, Some(1000.0));
        assert_eq!(fields.total_liabilities, Some(400.0));
        assert_eq!(fields.revenue, None);

        let cash = json!({"operatingCashflow": "$250", "currency": "JPY"});
        let fields = normalize(&cash, StatementKind::CashFlow);
        assert_eq!(fields.operating_cashflow, Some(250.0));
        assert_eq!(fields.currency, "JPY");
    }

    #[test]
    fn test_bad_values_degrade_to_none() {
        let report = json!({"totalAssets": "lots", "totalLiabilities": {"nested": 1}});
        let fields = normalize(&report, StatementKind::BalanceSheet);
        assert_eq!(fields, CanonicalFields::default());
    }

    #[test]
    fn test_extract_reports() {
        let payload = json!({
            "symbol": "TEL",
            "annualReports": [{"fiscalDateEnding": "2022-09-30"}, "junk"],
            "quarterlyReports": [{"fiscalDateEnding": "2022-12-31"}, {"fiscalDateEnding": "2022-09-30"}]
        });
        assert_eq!(extract_reports(&payload, PeriodType::Annual).len(), 1);
        assert_eq!(extract_reports(&payload, PeriodType::Quarterly).len(), 2);
        assert!(extract_reports(&json!({}), PeriodType::Annual).is_empty());
    }

    #[test]
    fn test_prepare_rejects_missing_date() {
        let report = json!({"fiscalDateEnding": "soon", "totalRevenue": "1"});
        let err = prepare(report, StatementKind::IncomeStatement, PeriodType::Annual).unwrap_err();
        assert_eq!(
            err,
            Rejection::MissingFiscalDate {
                raw: Some("soon".to_string())
            }
        );

        let report = json!({"totalRevenue": "1"});
        let err = prepare(report, StatementKind::IncomeStatement, PeriodType::Annual).unwrap_err();
        assert_eq!(err, Rejection::MissingFiscalDate { raw: None });
    }

    #[test]
    fn test_prepare_keeps_raw_report() {
        let report = json!({"fiscal_date": "20211231", "operating_cashflow": "5"});
        let prepared = prepare(report.clone(), StatementKind::CashFlow, PeriodType::Annual).unwrap();
        assert_eq!(
            prepared.fiscal_date,
            NaiveDate::from_ymd_opt(2021, 12, 31).unwrap()
        );
        assert_eq!(prepared.fields.operating_cashflow, Some(5.0));
        assert_eq!(prepared.raw, report);
    }
}
