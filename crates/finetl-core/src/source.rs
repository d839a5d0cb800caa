//! Source trait for fetching raw statement payloads.
//!
//! A [`StatementSource`] wraps an external API. Implementations are
//! responsible for quota enforcement and retries; callers see either a raw
//! payload or a classified [`EtlError`](crate::EtlError).

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::{EtlError, Result},
    period::StatementKind,
    stop::StopSignal,
    types::{RawPayload, Symbol},
};

/// Source of raw financial statement payloads.
#[async_trait]
pub trait StatementSource: Send + Sync + Debug {
    /// Returns the name of this source (e.g., "Alpha Vantage").
    fn name(&self) -> &str;

    /// Fetches the raw payload for one statement kind of one company.
    ///
    /// The payload holds every report the API returns for that kind, annual
    /// and quarterly.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::TransientFetch`](crate::EtlError::TransientFetch)
    /// once retries are exhausted, or
    /// [`EtlError::RemoteData`](crate::EtlError::RemoteData) when the API
    /// rejects the request.
    async fn fetch(&self, symbol: &Symbol, kind: StatementKind) -> Result<RawPayload>;

    /// Like [`fetch`](Self::fetch), but gives up with
    /// [`EtlError::Cancelled`] once `stop` fires.
    ///
    /// The default only checks `stop` before the request. Sources that wait
    /// (for quota or between retries) should also check it while waiting.
    ///
    /// # Errors
    ///
    /// As [`fetch`](Self::fetch), plus [`EtlError::Cancelled`].
    async fn fetch_until(
        &self,
        symbol: &Symbol,
        kind: StatementKind,
        stop: &StopSignal,
    ) -> Result<RawPayload> {
        if stop.is_stopped() {
            return Err(EtlError::Cancelled);
        }
        self.fetch(symbol, kind).await
    }
}
