//! SQLite-backed statement store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use finetl_core::{
    CanonicalFields, CompanyRecord, EtlError, MetricName, MetricRecord, PeriodType,
    QuotaSnapshot, QuotaStateStore, RawPayload, Result, StatementFilter, StatementKind,
    StatementRecord, StatementStore, Symbol,
};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

/// Table definitions. Uniqueness of statements and metrics lives here, not in
/// application code, so repeated or concurrent writers cannot duplicate rows.
const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS companies (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        ticker TEXT NOT NULL UNIQUE,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS financial_statements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id),
        statement_type TEXT NOT NULL,
        period TEXT NOT NULL,
        fiscal_date TEXT NOT NULL,
        raw_data TEXT NOT NULL,
        revenue REAL,
        gross_profit REAL,
        net_income REAL,
        total_assets REAL,
        total_liabilities REAL,
        operating_cashflow REAL,
        currency TEXT NOT NULL DEFAULT 'USD',
        created_at TEXT NOT NULL,
        UNIQUE (company_id, statement_type, fiscal_date)
    );

    CREATE INDEX IF NOT EXISTS idx_statements_company_date
        ON financial_statements(company_id, fiscal_date);

    CREATE TABLE IF NOT EXISTS metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        company_id INTEGER NOT NULL REFERENCES companies(id),
        year INTEGER NOT NULL,
        metric_name TEXT NOT NULL,
        value REAL,
        created_at TEXT NOT NULL,
        UNIQUE (company_id, year, metric_name)
    );

    CREATE TABLE IF NOT EXISTS api_quota (
        key TEXT PRIMARY KEY,
        day TEXT NOT NULL,
        day_count INTEGER NOT NULL,
        minute_calls TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

const COMPANY_COLUMNS: &str = "id, name, ticker, metadata, created_at";

const STATEMENT_COLUMNS: &str = "id, company_id, statement_type, period, fiscal_date, raw_data, \
     revenue, gross_profit, net_income, total_assets, total_liabilities, operating_cashflow, \
     currency, created_at";

const METRIC_COLUMNS: &str = "id, company_id, year, metric_name, value, created_at";

fn db_err(e: rusqlite::Error) -> EtlError {
    EtlError::Persistence(e.to_string())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EtlError::Parse(format!("Invalid timestamp {s}: {e}")))
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| EtlError::Parse(format!("Invalid date {s}: {e}")))
}

/// Metadata that carries no information and must not overwrite stored metadata.
fn is_blank_metadata(metadata: &serde_json::Value) -> bool {
    match metadata {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// SQLite-based store for companies, statements, metrics and quota state.
///
/// All access goes through a single mutex-guarded connection, which makes the
/// store the one writer the pipeline needs.
#[derive(Debug)]
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// Useful for testing and dry runs; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("SQLite store schema initialized");
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EtlError::Persistence(e.to_string()))
    }
}

struct CompanyRow {
    id: i64,
    name: String,
    ticker: String,
    metadata: String,
    created_at: String,
}

impl CompanyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            ticker: row.get(2)?,
            metadata: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<CompanyRecord> {
        Ok(CompanyRecord {
            id: self.id,
            name: self.name,
            ticker: Symbol::new(self.ticker),
            metadata: serde_json::from_str(&self.metadata)
                .map_err(|e| EtlError::Parse(e.to_string()))?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct StatementRow {
    id: i64,
    company_id: i64,
    statement_type: String,
    period: String,
    fiscal_date: String,
    raw_data: String,
    fields: CanonicalFields,
    created_at: String,
}

impl StatementRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            company_id: row.get(1)?,
            statement_type: row.get(2)?,
            period: row.get(3)?,
            fiscal_date: row.get(4)?,
            raw_data: row.get(5)?,
            fields: CanonicalFields {
                revenue: row.get(6)?,
                gross_profit: row.get(7)?,
                net_income: row.get(8)?,
                total_assets: row.get(9)?,
                total_liabilities: row.get(10)?,
                operating_cashflow: row.get(11)?,
                currency: row.get(12)?,
            },
            created_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<StatementRecord> {
        Ok(StatementRecord {
            id: self.id,
            company_id: self.company_id,
            statement_type: self.statement_type.parse()?,
            period: self.period.parse()?,
            fiscal_date: parse_day(&self.fiscal_date)?,
            raw_data: serde_json::from_str(&self.raw_data)
                .map_err(|e| EtlError::Parse(e.to_string()))?,
            fields: self.fields,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct MetricRow {
    id: i64,
    company_id: i64,
    year: i32,
    metric_name: String,
    value: Option<f64>,
    created_at: String,
}

impl MetricRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            company_id: row.get(1)?,
            year: row.get(2)?,
            metric_name: row.get(3)?,
            value: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<MetricRecord> {
        Ok(MetricRecord {
            id: self.id,
            company_id: self.company_id,
            year: self.year,
            metric_name: self.metric_name.parse()?,
            value: self.value,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn find_company(conn: &Connection, column: &str, value: &str) -> Result<Option<CompanyRow>> {
    conn.query_row(
        &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE {column} = ?1"),
        params![value],
        CompanyRow::from_row,
    )
    .optional()
    .map_err(db_err)
}

fn company_by_id(conn: &Connection, id: i64) -> Result<CompanyRecord> {
    conn.query_row(
        &format!("SELECT {COMPANY_COLUMNS} FROM companies WHERE id = ?1"),
        params![id],
        CompanyRow::from_row,
    )
    .map_err(db_err)?
    .into_record()
}

#[async_trait]
impl StatementStore for SqliteStore {
    #[instrument(skip(self, metadata), fields(name = %name, ticker = %ticker))]
    async fn upsert_company(
        &self,
        name: &str,
        ticker: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<CompanyRecord> {
        let ticker = Symbol::new(ticker);
        let metadata = metadata
            .filter(|m| !is_blank_metadata(m))
            .map(ToString::to_string);

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        let by_name = find_company(&tx, "name", name)?;
        let by_ticker = if ticker.as_str().is_empty() {
            None
        } else {
            find_company(&tx, "ticker", ticker.as_str())?
        };

        let id = match (by_name, by_ticker) {
            (Some(named), Some(ticked)) if named.id != ticked.id => {
                // The ticker belongs to another row; moving it would break uniqueness.
                warn!(
                    name_match = named.id,
                    ticker_match = ticked.id,
                    "Name and ticker match different companies, keeping the name match"
                );
                if let Some(metadata) = &metadata {
                    tx.execute(
                        "UPDATE companies SET metadata = ?1 WHERE id = ?2",
                        params![metadata, named.id],
                    )
                    .map_err(db_err)?;
                }
                named.id
            }
            (Some(existing), _) | (None, Some(existing)) => {
                let new_ticker = if ticker.as_str().is_empty() {
                    existing.ticker.clone()
                } else {
                    ticker.to_string()
                };
                let new_metadata = metadata.unwrap_or_else(|| existing.metadata.clone());
                if new_ticker != existing.ticker || new_metadata != existing.metadata {
                    tx.execute(
                        "UPDATE companies SET ticker = ?1, metadata = ?2 WHERE id = ?3",
                        params![new_ticker, new_metadata, existing.id],
                    )
                    .map_err(db_err)?;
                    debug!(id = existing.id, "Updated company");
                }
                existing.id
            }
            (None, None) => {
                if ticker.as_str().is_empty() {
                    return Err(EtlError::Persistence(format!(
                        "Cannot create company {name} without a ticker"
                    )));
                }
                tx.execute(
                    "INSERT INTO companies (name, ticker, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        name,
                        ticker.as_str(),
                        metadata.unwrap_or_else(|| "{}".to_string()),
                        Utc::now().to_rfc3339()
                    ],
                )
                .map_err(db_err)?;
                let id = tx.last_insert_rowid();
                debug!(id, "Inserted company");
                id
            }
        };

        let record = company_by_id(&tx, id)?;
        tx.commit().map_err(db_err)?;
        Ok(record)
    }

    async fn list_companies(&self) -> Result<Vec<CompanyRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {COMPANY_COLUMNS} FROM companies ORDER BY id"))
            .map_err(db_err)?;
        let rows = stmt.query_map([], CompanyRow::from_row).map_err(db_err)?;

        let mut companies = Vec::new();
        for row in rows {
            companies.push(row.map_err(db_err)?.into_record()?);
        }
        Ok(companies)
    }

    async fn company_by_ticker(&self, ticker: &str) -> Result<Option<CompanyRecord>> {
        let ticker = Symbol::new(ticker);
        let conn = self.lock()?;
        find_company(&conn, "ticker", ticker.as_str())?
            .map(CompanyRow::into_record)
            .transpose()
    }

    #[instrument(skip(self, raw_payload, fields), fields(company_id, kind = %statement_type, fiscal_date = %fiscal_date))]
    async fn upsert_statement(
        &self,
        company_id: i64,
        statement_type: StatementKind,
        period: PeriodType,
        fiscal_date: NaiveDate,
        raw_payload: &RawPayload,
        fields: &CanonicalFields,
    ) -> Result<StatementRecord> {
        let raw_data =
            serde_json::to_string(raw_payload).map_err(|e| EtlError::Parse(e.to_string()))?;
        let fiscal_date = fiscal_date.to_string();

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO financial_statements
             (company_id, statement_type, period, fiscal_date, raw_data, revenue, gross_profit,
              net_income, total_assets, total_liabilities, operating_cashflow, currency, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT (company_id, statement_type, fiscal_date) DO UPDATE SET
                period = excluded.period,
                raw_data = excluded.raw_data,
                revenue = excluded.revenue,
                gross_profit = excluded.gross_profit,
                net_income = excluded.net_income,
                total_assets = excluded.total_assets,
                total_liabilities = excluded.total_liabilities,
                operating_cashflow = excluded.operating_cashflow,
                currency = excluded.currency",
            params![
                company_id,
                statement_type.as_str(),
                period.as_str(),
                fiscal_date,
                raw_data,
                fields.revenue,
                fields.gross_profit,
                fields.net_income,
                fields.total_assets,
                fields.total_liabilities,
                fields.operating_cashflow,
                fields.currency,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;

        let row = tx
            .query_row(
                &format!(
                    "SELECT {STATEMENT_COLUMNS} FROM financial_statements
                     WHERE company_id = ?1 AND statement_type = ?2 AND fiscal_date = ?3"
                ),
                params![company_id, statement_type.as_str(), fiscal_date],
                StatementRow::from_row,
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        debug!(id = row.id, "Upserted statement");
        row.into_record()
    }

    #[instrument(skip(self))]
    async fn list_statements(&self, filter: StatementFilter) -> Result<Vec<StatementRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {STATEMENT_COLUMNS} FROM financial_statements
                 WHERE (?1 IS NULL OR company_id = ?1)
                   AND (?2 IS NULL OR statement_type = ?2)
                   AND (?3 IS NULL OR period = ?3)
                 ORDER BY fiscal_date ASC, id ASC"
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![
                    filter.company_id,
                    filter.statement_type.map(|k| k.as_str()),
                    filter.period.map(|p| p.as_str())
                ],
                StatementRow::from_row,
            )
            .map_err(db_err)?;

        let mut statements = Vec::new();
        for row in rows {
            statements.push(row.map_err(db_err)?.into_record()?);
        }

        debug!("Found {} statements", statements.len());
        Ok(statements)
    }

    #[instrument(skip(self), fields(company_id, year, metric = %metric_name))]
    async fn upsert_metric(
        &self,
        company_id: i64,
        year: i32,
        metric_name: MetricName,
        value: Option<f64>,
    ) -> Result<MetricRecord> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO metrics (company_id, year, metric_name, value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (company_id, year, metric_name) DO UPDATE SET value = excluded.value",
            params![
                company_id,
                year,
                metric_name.as_str(),
                value,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;

        let row = tx
            .query_row(
                &format!(
                    "SELECT {METRIC_COLUMNS} FROM metrics
                     WHERE company_id = ?1 AND year = ?2 AND metric_name = ?3"
                ),
                params![company_id, year, metric_name.as_str()],
                MetricRow::from_row,
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        row.into_record()
    }

    async fn list_metrics(&self, company_id: Option<i64>) -> Result<Vec<MetricRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {METRIC_COLUMNS} FROM metrics
                 WHERE (?1 IS NULL OR company_id = ?1)
                 ORDER BY company_id, year, metric_name"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![company_id], MetricRow::from_row)
            .map_err(db_err)?;

        let mut metrics = Vec::new();
        for row in rows {
            metrics.push(row.map_err(db_err)?.into_record()?);
        }
        Ok(metrics)
    }
}

impl QuotaStateStore for SqliteStore {
    fn load_quota(&self, key: &str) -> Result<Option<QuotaSnapshot>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT day, day_count, minute_calls, updated_at FROM api_quota WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some((day, day_count, minute_calls, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(QuotaSnapshot {
            day: parse_day(&day)?,
            day_count,
            minute_calls: serde_json::from_str(&minute_calls)
                .map_err(|e| EtlError::Parse(e.to_string()))?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    fn save_quota(&self, key: &str, snapshot: &QuotaSnapshot) -> Result<()> {
        let minute_calls = serde_json::to_string(&snapshot.minute_calls)
            .map_err(|e| EtlError::Parse(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO api_quota (key, day, day_count, minute_calls, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key,
                snapshot.day.to_string(),
                snapshot.day_count,
                minute_calls,
                snapshot.updated_at.to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn income(revenue: f64) -> CanonicalFields {
        CanonicalFields {
            revenue: Some(revenue),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sqlite_store_initialization() {
        let store = SqliteStore::in_memory();
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_upsert_statement_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let company = store.upsert_company("TE Connectivity", "TEL", None).await.unwrap();
        let fiscal = date(2022, 9, 30);

        let first = store
            .upsert_statement(
                company.id,
                StatementKind::IncomeStatement,
                PeriodType::Annual,
                fiscal,
                &json!({"totalRevenue": "100"}),
                &income(100.0),
            )
            .await
            .unwrap();
        let second = store
            .upsert_statement(
                company.id,
                StatementKind::IncomeStatement,
                PeriodType::Annual,
                fiscal,
                &json!({"totalRevenue": "120"}),
                &income(120.0),
            )
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.fields.revenue, Some(120.0));
        assert_eq!(second.raw_data, json!({"totalRevenue": "120"}));

        let all = store.list_statements(StatementFilter::all()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields.revenue, Some(120.0));
    }

    #[tokio::test]
    async fn test_same_date_different_kind_is_a_new_row() {
        let store = SqliteStore::in_memory().unwrap();
        let company = store.upsert_company("Sensata Technologies", "ST", None).await.unwrap();
        let fiscal = date(2022, 12, 31);

        for kind in StatementKind::ALL {
            store
                .upsert_statement(
                    company.id,
                    kind,
                    PeriodType::Annual,
                    fiscal,
                    &json!({}),
                    &CanonicalFields::default(),
                )
                .await
                .unwrap();
        }

        let all = store.list_statements(StatementFilter::all()).await.unwrap();
        assert_eq!(all.len(), 3);
        let incomes = store
            .list_statements(StatementFilter::all().kind(StatementKind::IncomeStatement))
            .await
            .unwrap();
        assert_eq!(incomes.len(), 1);
    }

    #[tokio::test]
    async fn test_uniqueness_enforced_by_schema() {
        let store = SqliteStore::in_memory().unwrap();
        let company = store.upsert_company("DuPont de Nemours", "DD", None).await.unwrap();

        let conn = store.lock().unwrap();
        let insert = "INSERT INTO financial_statements
            (company_id, statement_type, period, fiscal_date, raw_data, created_at)
            VALUES (?1, 'balance_sheet', 'annual', '2022-12-31', '{}', '2024-01-01T00:00:00Z')";
        conn.execute(insert, params![company.id]).unwrap();
        assert!(conn.execute(insert, params![company.id]).is_err());

        let metric = "INSERT INTO metrics (company_id, year, metric_name, value, created_at)
            VALUES (?1, 2022, 'net_margin', 1.0, '2024-01-01T00:00:00Z')";
        conn.execute(metric, params![company.id]).unwrap();
        assert!(conn.execute(metric, params![company.id]).is_err());
    }

    #[tokio::test]
    async fn test_list_statements_ascending_by_fiscal_date() {
        let store = SqliteStore::in_memory().unwrap();
        let company = store.upsert_company("TE Connectivity", "TEL", None).await.unwrap();

        for (year, revenue) in [(2022, 150.0), (2020, 130.0), (2021, 140.0)] {
            store
                .upsert_statement(
                    company.id,
                    StatementKind::IncomeStatement,
                    PeriodType::Annual,
                    date(year, 12, 31),
                    &json!({}),
                    &income(revenue),
                )
                .await
                .unwrap();
        }
        store
            .upsert_statement(
                company.id,
                StatementKind::IncomeStatement,
                PeriodType::Quarterly,
                date(2022, 6, 30),
                &json!({}),
                &income(40.0),
            )
            .await
            .unwrap();

        let annual = store
            .list_statements(
                StatementFilter::all()
                    .company(company.id)
                    .kind(StatementKind::IncomeStatement)
                    .period(PeriodType::Annual),
            )
            .await
            .unwrap();
        let years: Vec<i32> = annual.iter().map(|s| s.fiscal_date.year()).collect();
        assert_eq!(years, vec![2020, 2021, 2022]);
    }

    #[tokio::test]
    async fn test_upsert_company_matches_by_name_or_ticker() {
        let store = SqliteStore::in_memory().unwrap();
        let created = store
            .upsert_company("TE Connectivity", "tel", Some(&json!({"sector": "industrials"})))
            .await
            .unwrap();
        assert_eq!(created.ticker.as_str(), "TEL");

        // Same ticker, drifted name: same company, name kept.
        let by_ticker = store.upsert_company("TE Connectivity Ltd", "TEL", None).await.unwrap();
        assert_eq!(by_ticker.id, created.id);
        assert_eq!(by_ticker.name, "TE Connectivity");
        assert_eq!(by_ticker.metadata, json!({"sector": "industrials"}));

        // Same name, new ticker: ticker updated in place.
        let by_name = store
            .upsert_company("TE Connectivity", "TEL.N", Some(&json!({"exchange": "NYSE"})))
            .await
            .unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.ticker.as_str(), "TEL.N");
        assert_eq!(by_name.metadata, json!({"exchange": "NYSE"}));

        assert_eq!(store.list_companies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_company_prefers_name_match() {
        let store = SqliteStore::in_memory().unwrap();
        let tel = store.upsert_company("TE Connectivity", "TEL", None).await.unwrap();
        let st = store.upsert_company("Sensata Technologies", "ST", None).await.unwrap();

        let resolved = store
            .upsert_company("TE Connectivity", "ST", Some(&json!({"note": "drift"})))
            .await
            .unwrap();
        assert_eq!(resolved.id, tel.id);
        assert_eq!(resolved.ticker.as_str(), "TEL");
        assert_eq!(resolved.metadata, json!({"note": "drift"}));

        let sensata = store.company_by_ticker("st").await.unwrap().unwrap();
        assert_eq!(sensata.id, st.id);
    }

    #[tokio::test]
    async fn test_metric_upsert_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let company = store.upsert_company("TE Connectivity", "TEL", None).await.unwrap();

        let first = store
            .upsert_metric(company.id, 2022, MetricName::GrossMargin, Some(30.0))
            .await
            .unwrap();
        let second = store
            .upsert_metric(company.id, 2022, MetricName::GrossMargin, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.value, None);

        store
            .upsert_metric(company.id, 2021, MetricName::NetMargin, Some(20.0))
            .await
            .unwrap();
        let metrics = store.list_metrics(Some(company.id)).await.unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].year, 2021);
        assert!(store.list_metrics(Some(company.id + 1)).await.unwrap().is_empty());
    }

    #[test]
    fn test_quota_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finetl.db");
        let now = Utc::now();
        let snapshot = QuotaSnapshot {
            day: now.date_naive(),
            day_count: 7,
            minute_calls: vec![now],
            updated_at: now,
        };

        {
            let store = SqliteStore::new(&path).unwrap();
            assert!(store.load_quota("alphavantage").unwrap().is_none());
            store.save_quota("alphavantage", &snapshot).unwrap();
        }

        let reopened = SqliteStore::new(&path).unwrap();
        let loaded = reopened.load_quota("alphavantage").unwrap().unwrap();
        assert_eq!(loaded.day_count, 7);
        assert_eq!(loaded.minute_calls.len(), 1);
        assert_eq!(loaded.day, snapshot.day);
    }
}
