//! Telemetry Store Adapter (component A).
//!
//! Typed, retryable reads of historical records, systems, and cached
//! prediction models. The real telemetry store (a document database with
//! `history`/`systems`/`analysis-results`/`ai_feedback`/`prediction-models`
//! collections) is out of scope for this crate; this module defines the
//! narrow trait the rest of the engine depends on plus an in-memory
//! implementation good enough to exercise and test it end to end.

pub mod in_memory;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{HistoricalRecord, SystemProfile};
use crate::error::StoreError;

pub use in_memory::InMemoryStore;
pub use retry::RetryingStore;

/// A derived model cached by the engine (e.g. a capacity-decay fit). Keyed
/// by `(system_id, kind)` with a 24h TTL; the store is otherwise read-only
/// from the engine's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedModel {
    pub kind: String,
    pub value: serde_json::Value,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedModel {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Projection hint for `records`: callers that only need a subset of
/// fields may ask for it, letting a real store avoid reading whole
/// documents. The in-memory implementation ignores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    Full,
    MetricsOnly,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Records for `system_id` in `[from, to]`, ascending by timestamp.
    async fn records(
        &self,
        system_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        projection: Projection,
    ) -> Result<Vec<HistoricalRecord>, StoreError>;

    async fn system(&self, system_id: &str) -> Result<Option<SystemProfile>, StoreError>;

    /// The `n` most recent snapshots, newest first.
    async fn recent_snapshots(
        &self,
        system_id: &str,
        n: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError>;

    async fn cached_model(
        &self,
        system_id: &str,
        kind: &str,
    ) -> Result<Option<CachedModel>, StoreError>;

    async fn put_cached_model(
        &self,
        system_id: &str,
        model: CachedModel,
    ) -> Result<(), StoreError>;
}
