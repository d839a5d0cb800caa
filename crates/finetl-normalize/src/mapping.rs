//! Static alias tables mapping source keys onto canonical fields.
//!
//! Different API versions name the same concept differently. Each canonical
//! field lists its accepted keys in priority order; the first key present with
//! a non-empty value wins. Supporting a new schema version means adding keys
//! here, not touching the parsing code.

use finetl_core::{CanonicalFields, StatementKind};

/// A canonical numeric field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    /// Total revenue.
    Revenue,
    /// Gross profit.
    GrossProfit,
    /// Net income.
    NetIncome,
    /// Total assets.
    TotalAssets,
    /// Total liabilities.
    TotalLiabilities,
    /// Operating cash flow.
    OperatingCashflow,
}

impl CanonicalField {
    /// Column name of the field in the store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::GrossProfit => "gross_profit",
            Self::NetIncome => "net_income",
            Self::TotalAssets => "total_assets",
            Self::TotalLiabilities => "total_liabilities",
            Self::OperatingCashflow => "operating_cashflow",
        }
    }

    /// Writes `value` into the matching slot of `fields`.
    pub fn assign(&self, fields: &mut CanonicalFields, value: Option<f64>) {
        match self {
            Self::Revenue => fields.revenue = value,
            Self::GrossProfit => fields.gross_profit = value,
            Self::NetIncome => fields.net_income = value,
            Self::TotalAssets => fields.total_assets = value,
            Self::TotalLiabilities => fields.total_liabilities = value,
            Self::OperatingCashflow => fields.operating_cashflow = value,
        }
    }
}

/// Accepted source keys for one canonical field.
#[derive(Clone, Copy, Debug)]
pub struct FieldMapping {
    /// Target field.
    pub field: CanonicalField,
    /// Source keys, highest priority first.
    pub aliases: &'static [&'static str],
}

/// Income statement fields.
pub const INCOME_STATEMENT: &[FieldMapping] = &[
    FieldMapping {
        field: CanonicalField::Revenue,
        aliases: &["totalRevenue", "revenues", "Revenue", "total_revenue"],
    },
    FieldMapping {
        field: CanonicalField::GrossProfit,
        aliases: &["grossProfit", "gross_profit"],
    },
    FieldMapping {
        field: CanonicalField::NetIncome,
        aliases: &["netIncome", "net_income", "netIncomeLoss"],
    },
];

/// Balance sheet fields.
pub const BALANCE_SHEET: &[FieldMapping] = &[
    FieldMapping {
        field: CanonicalField::TotalAssets,
        aliases: &["totalAssets", "total_assets"],
    },
    FieldMapping {
        field: CanonicalField::TotalLiabilities,
        aliases: &["totalLiabilities", "total_liabilities"],
    },
];

/// Cash flow statement fields.
pub const CASH_FLOW: &[FieldMapping] = &[FieldMapping {
    field: CanonicalField::OperatingCashflow,
    aliases: &["operatingCashflow", "operating_cashflow"],
}];

/// Keys holding the reporting currency, for every statement kind.
pub const CURRENCY_ALIASES: &[&str] = &["reportedCurrency", "currency"];

/// Keys holding the period-end date, for every statement kind.
pub const FISCAL_DATE_ALIASES: &[&str] = &["fiscalDateEnding", "fiscal_date"];

/// Returns the mapping table for a statement kind.
#[must_use]
pub const fn mapping_for(kind: StatementKind) -> &'static [FieldMapping] {
    match kind {
        StatementKind::IncomeStatement => INCOME_STATEMENT,
        StatementKind::BalanceSheet => BALANCE_SHEET,
        StatementKind::CashFlow => CASH_FLOW,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_table() {
        for kind in StatementKind::ALL {
            assert!(!mapping_for(kind).is_empty());
        }
    }

    #[test]
    fn test_aliases_are_unique_within_a_table() {
        for kind in StatementKind::ALL {
            let mut seen = std::collections::HashSet::new();
            for mapping in mapping_for(kind) {
                for alias in mapping.aliases {
                    assert!(seen.insert(*alias), "duplicate alias {alias} in {kind}");
                }
            }
        }
    }
}
