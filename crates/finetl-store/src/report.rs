//! Tabular views over the store for reporting.

use finetl_core::{EtlError, Result, StatementFilter};
use polars::prelude::*;
use rusqlite::params;
use tracing::{debug, instrument};

use crate::sqlite::SqliteStore;

impl SqliteStore {
    /// Returns metrics joined with their company as a DataFrame.
    ///
    /// Columns: `company`, `ticker`, `year`, `metric_name`, `value`. Rows are
    /// ordered by company name, year and metric name.
    ///
    /// # Errors
    /// Returns an error if the query or frame construction fails.
    #[instrument(skip(self))]
    pub fn metrics_frame(&self, company_id: Option<i64>) -> Result<DataFrame> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.name, c.ticker, m.year, m.metric_name, m.value
                 FROM metrics m JOIN companies c ON c.id = m.company_id
                 WHERE (?1 IS NULL OR m.company_id = ?1)
                 ORDER BY c.name, m.year, m.metric_name",
            )
            .map_err(|e| EtlError::Persistence(e.to_string()))?;

        let mut companies: Vec<String> = Vec::new();
        let mut tickers: Vec<String> = Vec::new();
        let mut years: Vec<i32> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut values: Vec<Option<f64>> = Vec::new();

        let rows = stmt
            .query_map(params![company_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                ))
            })
            .map_err(|e| EtlError::Persistence(e.to_string()))?;

        for row in rows {
            let (company, ticker, year, name, value) =
                row.map_err(|e| EtlError::Persistence(e.to_string()))?;
            companies.push(company);
            tickers.push(ticker);
            years.push(year);
            names.push(name);
            values.push(value);
        }

        debug!("Built metrics frame with {} rows", years.len());

        DataFrame::new(vec![
            Column::new("company".into(), companies),
            Column::new("ticker".into(), tickers),
            Column::new("year".into(), years),
            Column::new("metric_name".into(), names),
            Column::new("value".into(), values),
        ])
        .map_err(|e| EtlError::Other(e.to_string()))
    }

    /// Returns statements matching `filter` with their canonical fields.
    ///
    /// Columns: `company`, `ticker`, `statement_type`, `period`, `fiscal_date`
    /// (as a Date), then one column per canonical field and `currency`.
    ///
    /// # Errors
    /// Returns an error if the query or frame construction fails.
    #[instrument(skip(self))]
    pub fn statements_frame(&self, filter: StatementFilter) -> Result<DataFrame> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.name, c.ticker, s.statement_type, s.period, s.fiscal_date,
                        s.revenue, s.gross_profit, s.net_income, s.total_assets,
                        s.total_liabilities, s.operating_cashflow, s.currency
                 FROM financial_statements s JOIN companies c ON c.id = s.company_id
                 WHERE (?1 IS NULL OR s.company_id = ?1)
                   AND (?2 IS NULL OR s.statement_type = ?2)
                   AND (?3 IS NULL OR s.period = ?3)
                 ORDER BY c.name, s.fiscal_date, s.id",
            )
            .map_err(|e| EtlError::Persistence(e.to_string()))?;

        let mut companies: Vec<String> = Vec::new();
        let mut tickers: Vec<String> = Vec::new();
        let mut kinds: Vec<String> = Vec::new();
        let mut periods: Vec<String> = Vec::new();
        let mut dates: Vec<String> = Vec::new();
        let mut amounts: [Vec<Option<f64>>; 6] = Default::default();
        let mut currencies: Vec<String> = Vec::new();

        let rows = stmt
            .query_map(
                params![
                    filter.company_id,
                    filter.statement_type.map(|k| k.as_str()),
                    filter.period.map(|p| p.as_str())
                ],
                |row| {
                    let mut values = [None; 6];
                    for (i, slot) in values.iter_mut().enumerate() {
                        *slot = row.get::<_, Option<f64>>(5 + i)?;
                    }
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        values,
                        row.get::<_, String>(11)?,
                    ))
                },
            )
            .map_err(|e| EtlError::Persistence(e.to_string()))?;

        for row in rows {
            let (company, ticker, kind, period, date, values, currency) =
                row.map_err(|e| EtlError::Persistence(e.to_string()))?;
            companies.push(company);
            tickers.push(ticker);
            kinds.push(kind);
            periods.push(period);
            dates.push(date);
            for (column, value) in amounts.iter_mut().zip(values) {
                column.push(value);
            }
            currencies.push(currency);
        }

        debug!("Built statements frame with {} rows", dates.len());

        let [revenue, gross_profit, net_income, total_assets, total_liabilities, operating_cashflow] =
            amounts;

        let df = DataFrame::new(vec![
            Column::new("company".into(), companies),
            Column::new("ticker".into(), tickers),
            Column::new("statement_type".into(), kinds),
            Column::new("period".into(), periods),
            Column::new("fiscal_date".into(), dates),
            Column::new("revenue".into(), revenue),
            Column::new("gross_profit".into(), gross_profit),
            Column::new("net_income".into(), net_income),
            Column::new("total_assets".into(), total_assets),
            Column::new("total_liabilities".into(), total_liabilities),
            Column::new("operating_cashflow".into(), operating_cashflow),
            Column::new("currency".into(), currencies),
        ])
        .map_err(|e| EtlError::Other(e.to_string()))?;

        df.lazy()
            .with_column(col("fiscal_date").cast(DataType::Date))
            .collect()
            .map_err(|e| EtlError::Other(e.to_string()))
    }
}
