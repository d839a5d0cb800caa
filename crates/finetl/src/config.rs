//! Environment-driven configuration.

use finetl_alphavantage::{DEFAULT_BASE_URL, QuotaLimits};
use finetl_core::{EtlError, PeriodType, Result, Symbol};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Reports kept per statement kind when `REPORT_LIMIT` is unset.
pub const DEFAULT_REPORT_LIMIT: usize = 3;

/// Database file used when `DATABASE_PATH` is unset.
pub const DEFAULT_DATABASE_PATH: &str = "finetl.db";

/// Timeout applied to each HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A company to ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanySpec {
    /// Display name, unique in the store.
    pub name: String,
    /// Ticker used for API requests.
    pub ticker: Symbol,
}

impl CompanySpec {
    /// Create a company entry.
    #[must_use]
    pub fn new(name: impl Into<String>, ticker: impl Into<Symbol>) -> Self {
        Self {
            name: name.into(),
            ticker: ticker.into(),
        }
    }

    /// The built-in roster.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("TE Connectivity", "TEL"),
            Self::new("Sensata Technologies", "ST"),
            Self::new("DuPont de Nemours", "DD"),
        ]
    }

    /// Parses a roster of the form `Name=TICKER;Name=TICKER`.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] if an entry lacks a name or a ticker.
    pub fn parse_roster(s: &str) -> Result<Vec<Self>> {
        s.split(';')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, ticker) = entry
                    .split_once('=')
                    .map(|(n, t)| (n.trim(), t.trim()))
                    .filter(|(n, t)| !n.is_empty() && !t.is_empty())
                    .ok_or_else(|| {
                        EtlError::Config(format!("Invalid company entry {entry:?}, expected Name=TICKER"))
                    })?;
                Ok(Self::new(name, ticker))
            })
            .collect()
    }
}

/// Which report lists to ingest from each payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DataPeriod {
    /// `annualReports` only.
    #[default]
    Annual,
    /// `quarterlyReports` only.
    Quarterly,
    /// Both lists.
    Both,
}

impl DataPeriod {
    /// Period types to ingest.
    #[must_use]
    pub fn periods(&self) -> Vec<PeriodType> {
        match self {
            Self::Annual => vec![PeriodType::Annual],
            Self::Quarterly => vec![PeriodType::Quarterly],
            Self::Both => vec![PeriodType::Annual, PeriodType::Quarterly],
        }
    }
}

impl FromStr for DataPeriod {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "all" => Ok(Self::Both),
            other => match other.parse::<PeriodType>() {
                Ok(PeriodType::Annual) => Ok(Self::Annual),
                Ok(PeriodType::Quarterly) => Ok(Self::Quarterly),
                Err(_) => Err(EtlError::Config(format!("Invalid DATA_PERIOD: {s}"))),
            },
        }
    }
}

/// Pipeline configuration.
///
/// Loaded from the environment (and a `.env` file when present) by
/// [`Config::from_env`]; every field can be overridden afterwards.
#[derive(Clone)]
pub struct Config {
    /// Alpha Vantage API key. Only required for commands that fetch.
    pub api_key: Option<String>,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// API endpoint.
    pub base_url: String,
    /// Call caps.
    pub quota: QuotaLimits,
    /// Most recent reports kept per statement kind, `None` for all.
    pub report_limit: Option<usize>,
    /// Report lists to ingest.
    pub data_period: DataPeriod,
    /// Deadline for a whole run.
    pub run_timeout: Option<Duration>,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Companies to ingest.
    pub companies: Vec<CompanySpec>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("database_path", &self.database_path)
            .field("base_url", &self.base_url)
            .field("quota", &self.quota)
            .field("report_limit", &self.report_limit)
            .field("data_period", &self.data_period)
            .field("run_timeout", &self.run_timeout)
            .field("http_timeout", &self.http_timeout)
            .field("companies", &self.companies)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            base_url: DEFAULT_BASE_URL.to_string(),
            quota: QuotaLimits::default(),
            report_limit: Some(DEFAULT_REPORT_LIMIT),
            data_period: DataPeriod::default(),
            run_timeout: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            companies: CompanySpec::defaults(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if it exists.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let api_key = get("ALPHAVANTAGE_API_KEY").or_else(|| get("API_KEY"));

        let per_minute = parse_var(&get, "QUOTA_PER_MINUTE")?.unwrap_or(defaults.quota.per_minute);
        let per_day = parse_var(&get, "QUOTA_PER_DAY")?.unwrap_or(defaults.quota.per_day);
        if per_minute == 0 || per_day == 0 {
            return Err(EtlError::Config("Quota limits must be positive".to_string()));
        }

        let report_limit = match parse_var::<usize, _>(&get, "REPORT_LIMIT")? {
            Some(0) => None,
            Some(n) => Some(n),
            None => defaults.report_limit,
        };

        let data_period = match get("DATA_PERIOD") {
            Some(v) => v.parse()?,
            None => defaults.data_period,
        };

        let companies = match get("COMPANIES") {
            Some(v) => CompanySpec::parse_roster(&v)?,
            None => defaults.companies,
        };

        Ok(Self {
            api_key,
            database_path: get("DATABASE_PATH").map_or(defaults.database_path, PathBuf::from),
            base_url: get("ALPHAVANTAGE_BASE_URL").unwrap_or(defaults.base_url),
            quota: QuotaLimits {
                per_minute,
                per_day,
            },
            report_limit,
            data_period,
            run_timeout: parse_var(&get, "RUN_TIMEOUT_SECS")?.map(Duration::from_secs),
            http_timeout: parse_var(&get, "HTTP_TIMEOUT_SECS")?
                .map_or(defaults.http_timeout, Duration::from_secs),
            companies,
        })
    }

    /// The API key, or a configuration error if none is set.
    ///
    /// # Errors
    /// Returns [`EtlError::Config`] when no key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            EtlError::Config("ALPHAVANTAGE_API_KEY environment variable required".to_string())
        })
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the database file.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the API endpoint.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the call caps.
    #[must_use]
    pub fn with_quota(mut self, quota: QuotaLimits) -> Self {
        self.quota = quota;
        self
    }

    /// Set how many recent reports to keep per statement kind, `None` for all.
    #[must_use]
    pub fn with_report_limit(mut self, limit: Option<usize>) -> Self {
        self.report_limit = limit;
        self
    }

    /// Set which report lists to ingest.
    #[must_use]
    pub fn with_data_period(mut self, period: DataPeriod) -> Self {
        self.data_period = period;
        self
    }

    /// Set the run deadline.
    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the company roster.
    #[must_use]
    pub fn with_companies(mut self, companies: Vec<CompanySpec>) -> Self {
        self.companies = companies;
        self
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|e| EtlError::Config(format!("Invalid {key} {v:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.database_path, PathBuf::from("finetl.db"));
        assert_eq!(config.base_url, "https://www.alphavantage.co/query");
        assert_eq!(config.quota, QuotaLimits { per_minute: 5, per_day: 25 });
        assert_eq!(config.report_limit, Some(3));
        assert_eq!(config.data_period, DataPeriod::Annual);
        assert_eq!(config.companies.len(), 3);
        assert_eq!(config.companies[0].ticker.as_str(), "TEL");
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("API_KEY", "fallback"),
            ("DATABASE_PATH", "/tmp/x.db"),
            ("QUOTA_PER_MINUTE", "75"),
            ("REPORT_LIMIT", "0"),
            ("DATA_PERIOD", "both"),
            ("RUN_TIMEOUT_SECS", "600"),
            ("COMPANIES", "Acme Corp=acme; Globex = GBX ;"),
        ]))
        .unwrap();

        assert_eq!(config.require_api_key().unwrap(), "fallback");
        assert_eq!(config.quota.per_minute, 75);
        assert_eq!(config.quota.per_day, 25);
        assert_eq!(config.report_limit, None);
        assert_eq!(config.data_period.periods().len(), 2);
        assert_eq!(config.run_timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            config.companies,
            vec![CompanySpec::new("Acme Corp", "ACME"), CompanySpec::new("Globex", "GBX")]
        );
    }

    #[test]
    fn test_primary_key_wins_over_fallback() {
        let config = Config::from_lookup(lookup(&[
            ("ALPHAVANTAGE_API_KEY", "primary"),
            ("API_KEY", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));
        assert!(!format!("{config:?}").contains("primary"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("QUOTA_PER_DAY", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("QUOTA_PER_MINUTE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATA_PERIOD", "weekly")])).is_err());
        assert!(Config::from_lookup(lookup(&[("COMPANIES", "NoTicker")])).is_err());
    }
}
