//! Pure ratio derivation.

use chrono::Datelike;
use finetl_core::{CanonicalFields, MetricName, PeriodType, StatementKind, StatementRecord};
use std::collections::BTreeMap;

/// One computed metric value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedMetric {
    /// Fiscal year.
    pub year: i32,
    /// Metric name.
    pub name: MetricName,
    /// Percentage, `None` when an input is missing or the denominator is zero.
    pub value: Option<f64>,
}

/// `100 * numerator / denominator`, or `None` when either side is missing or
/// the denominator is zero.
#[must_use]
pub fn percent(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(100.0 * n / d),
        _ => None,
    }
}

/// Derives yearly metrics from a company's statements.
///
/// Only annual statements are considered. Years come from income statements;
/// when a kind has several rows for one fiscal year the last one in `statements`
/// wins. Revenue growth compares each year with the previous income statement
/// year, so the earliest year has no growth value.
#[must_use]
pub fn derive_metrics(statements: &[StatementRecord]) -> Vec<DerivedMetric> {
    let mut income: BTreeMap<i32, &CanonicalFields> = BTreeMap::new();
    let mut balance: BTreeMap<i32, &CanonicalFields> = BTreeMap::new();
    let mut cash: BTreeMap<i32, &CanonicalFields> = BTreeMap::new();

    for statement in statements.iter().filter(|s| s.period == PeriodType::Annual) {
        let year = statement.fiscal_date.year();
        let by_year = match statement.statement_type {
            StatementKind::IncomeStatement => &mut income,
            StatementKind::BalanceSheet => &mut balance,
            StatementKind::CashFlow => &mut cash,
        };
        by_year.insert(year, &statement.fields);
    }

    let mut metrics = Vec::with_capacity(income.len() * MetricName::ALL.len());
    let mut previous_revenue: Option<Option<f64>> = None;

    for (&year, fields) in &income {
        let revenue = fields.revenue;
        let sheet = balance.get(&year);
        let total_assets = sheet.and_then(|b| b.total_assets);
        let operating_cashflow = cash.get(&year).and_then(|c| c.operating_cashflow);

        let revenue_yoy = match (revenue, previous_revenue.flatten()) {
            (Some(current), Some(prior)) => percent(Some(current - prior), Some(prior)),
            _ => None,
        };

        for name in MetricName::ALL {
            let value = match name {
                MetricName::GrossMargin => percent(fields.gross_profit, revenue),
                MetricName::NetMargin => percent(fields.net_income, revenue),
                MetricName::RevenueYoy => revenue_yoy,
                MetricName::OperatingCashMargin => percent(operating_cashflow, revenue),
                MetricName::DebtRatio => {
                    percent(sheet.and_then(|b| b.total_liabilities), total_assets)
                }
                MetricName::ReturnOnAssets => percent(fields.net_income, total_assets),
            };
            metrics.push(DerivedMetric { year, name, value });
        }

        previous_revenue = Some(revenue);
    }

    metrics
}
