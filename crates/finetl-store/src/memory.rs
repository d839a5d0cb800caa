//! In-memory quota state.

use finetl_core::{EtlError, QuotaSnapshot, QuotaStateStore, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Quota state kept in a `RwLock`-protected `HashMap`.
///
/// Counters are lost when the value is dropped, so a restart starts with a
/// fresh budget. Intended for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryQuotaState {
    snapshots: RwLock<HashMap<String, QuotaSnapshot>>,
}

impl InMemoryQuotaState {
    /// Create an empty quota state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuotaStateStore for InMemoryQuotaState {
    fn load_quota(&self, key: &str) -> Result<Option<QuotaSnapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|e| EtlError::Persistence(e.to_string()))?;
        Ok(snapshots.get(key).cloned())
    }

    fn save_quota(&self, key: &str, snapshot: &QuotaSnapshot) -> Result<()> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|e| EtlError::Persistence(e.to_string()))?;
        snapshots.insert(key.to_string(), snapshot.clone());
        debug!(key, day_count = snapshot.day_count, "Saved quota snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_save_and_load() {
        let state = InMemoryQuotaState::new();
        assert!(state.load_quota("alphavantage").unwrap().is_none());

        let mut snapshot = QuotaSnapshot::empty(Utc::now());
        snapshot.day_count = 3;
        state.save_quota("alphavantage", &snapshot).unwrap();

        let loaded = state.load_quota("alphavantage").unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(state.load_quota("other").unwrap().is_none());
    }
}
