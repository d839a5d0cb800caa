//! Raw payload snapshots on disk.
//!
//! A snapshot is a JSON object keyed by company name, each holding the raw
//! API payload per statement kind:
//!
//! ```json
//! {"TE Connectivity": {"income_statement": {...}, "balance_sheet": {...}, "cash_flow_statement": {...}}}
//! ```
//!
//! It lets a run be replayed without spending API calls.

use finetl_core::{EtlError, RawPayload, Result, StatementKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, warn};

/// Raw payloads grouped by company name and statement kind.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    companies: BTreeMap<String, BTreeMap<String, RawPayload>>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the payload for one company and statement kind.
    pub fn insert(&mut self, company: impl Into<String>, kind: StatementKind, payload: RawPayload) {
        self.companies
            .entry(company.into())
            .or_default()
            .insert(kind.as_str().to_string(), payload);
    }

    /// Payload for one company and statement kind.
    #[must_use]
    pub fn get(&self, company: &str, kind: StatementKind) -> Option<&RawPayload> {
        self.companies.get(company)?.get(kind.as_str())
    }

    /// Company names, sorted.
    pub fn companies(&self) -> impl Iterator<Item = &str> {
        self.companies.keys().map(String::as_str)
    }

    /// Payloads of one company in statement kind order. Unknown kind keys are
    /// skipped with a warning.
    #[must_use]
    pub fn payloads(&self, company: &str) -> Vec<(StatementKind, &RawPayload)> {
        let Some(kinds) = self.companies.get(company) else {
            return Vec::new();
        };

        let mut payloads: Vec<(StatementKind, &RawPayload)> = kinds
            .iter()
            .filter_map(|(key, payload)| match key.parse::<StatementKind>() {
                Ok(kind) => Some((kind, payload)),
                Err(_) => {
                    warn!(company, key = %key, "Skipping unknown statement kind in snapshot");
                    None
                }
            })
            .collect();
        payloads.sort_by_key(|(kind, _)| *kind);
        payloads
    }

    /// Number of companies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.companies.len()
    }

    /// True if the snapshot holds no companies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Write the snapshot as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| EtlError::Other(format!("Cannot create {}: {e}", path.display())))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| EtlError::Other(format!("Cannot write {}: {e}", path.display())))?;
        debug!(path = %path.display(), companies = self.len(), "Saved snapshot");
        Ok(())
    }

    /// Read a snapshot written by [`save`](Self::save).
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or is not a snapshot.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EtlError::Other(format!("Cannot open {}: {e}", path.display())))?;
        let snapshot: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| EtlError::Parse(format!("Invalid snapshot {}: {e}", path.display())))?;
        debug!(path = %path.display(), companies = snapshot.len(), "Loaded snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("financial_data.json");

        let mut snapshot = Snapshot::new();
        snapshot.insert("TE Connectivity", StatementKind::IncomeStatement, json!({"annualReports": []}));
        snapshot.insert("TE Connectivity", StatementKind::CashFlow, json!({"annualReports": [{}]}));
        snapshot.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["TE Connectivity"]["cash_flow_statement"].is_object());

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.companies().collect::<Vec<_>>(), vec!["TE Connectivity"]);
    }

    #[test]
    fn test_payloads_in_kind_order() {
        let snapshot: Snapshot = serde_json::from_value(json!({
            "DuPont de Nemours": {
                "cash_flow_statement": {"annualReports": []},
                "income_statement": {"annualReports": []},
                "segment_data": {}
            }
        }))
        .unwrap();

        let kinds: Vec<StatementKind> = snapshot
            .payloads("DuPont de Nemours")
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(kinds, vec![StatementKind::IncomeStatement, StatementKind::CashFlow]);
        assert!(snapshot.payloads("Unknown").is_empty());
        assert!(snapshot.get("DuPont de Nemours", StatementKind::BalanceSheet).is_none());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(Snapshot::load(&path), Err(EtlError::Parse(_))));
        assert!(Snapshot::load(dir.path().join("missing.json")).is_err());
    }
}
