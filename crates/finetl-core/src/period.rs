//! Statement kinds and reporting periods.
//!
//! This module defines [`StatementKind`] for the three statement types the
//! pipeline ingests and [`PeriodType`] for annual and quarterly reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EtlError;

/// Kind of financial statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// Income statement (revenue, gross profit, net income).
    IncomeStatement,
    /// Balance sheet (total assets, total liabilities).
    BalanceSheet,
    /// Cash flow statement (operating cash flow).
    #[serde(rename = "cash_flow_statement")]
    CashFlow,
}

impl StatementKind {
    /// All statement kinds, in ingestion order.
    pub const ALL: [Self; 3] = [Self::IncomeStatement, Self::BalanceSheet, Self::CashFlow];

    /// Name stored in the `statement_type` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow_statement",
        }
    }

    /// Value of the API's `function` query parameter.
    #[must_use]
    pub const fn api_function(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "INCOME_STATEMENT",
            Self::BalanceSheet => "BALANCE_SHEET",
            Self::CashFlow => "CASH_FLOW",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income_statement" | "INCOME_STATEMENT" => Ok(Self::IncomeStatement),
            "balance_sheet" | "BALANCE_SHEET" => Ok(Self::BalanceSheet),
            "cash_flow_statement" | "cash_flow" | "CASH_FLOW" => Ok(Self::CashFlow),
            other => Err(EtlError::Parse(format!("Invalid statement type: {other}"))),
        }
    }
}

/// Period type for fundamental financial data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Annual,
    /// Quarterly reporting period.
    Quarterly,
}

impl PeriodType {
    /// Name stored in the `period` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }

    /// Key of the report list inside an API payload.
    #[must_use]
    pub const fn reports_key(&self) -> &'static str {
        match self {
            Self::Annual => "annualReports",
            Self::Quarterly => "quarterlyReports",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "annual" | "a" => Ok(Self::Annual),
            "quarterly" | "quarter" | "q" => Ok(Self::Quarterly),
            other => Err(EtlError::Parse(format!("Invalid period type: {other}"))),
        }
    }
}
