use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{CachedModel, Projection, TelemetryStore};
use crate::domain::{HistoricalRecord, SystemProfile};
use crate::error::StoreError;

/// In-memory implementation of the Telemetry Store Adapter, used by tests,
/// the demo HTTP handler, and documentation examples. Records are kept
/// sorted by timestamp ascending on insert so range queries stay cheap.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Vec<HistoricalRecord>>>,
    systems: RwLock<HashMap<String, SystemProfile>>,
    models: RwLock<HashMap<(String, String), CachedModel>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(self, profile: SystemProfile) -> Self {
        self.systems.write().insert(profile.id.clone(), profile);
        self
    }

    pub fn insert_records(&self, system_id: &str, mut new_records: Vec<HistoricalRecord>) {
        let mut records = self.records.write();
        let entry = records.entry(system_id.to_string()).or_default();
        entry.append(&mut new_records);
        entry.sort_by_key(|r| r.timestamp);
    }

    pub fn with_records(self, system_id: &str, records: Vec<HistoricalRecord>) -> Self {
        self.insert_records(system_id, records);
        self
    }
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn records(
        &self,
        system_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _projection: Projection,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        let records = self.records.read();
        Ok(records
            .get(system_id)
            .map(|all| {
                all.iter()
                    .filter(|r| r.timestamp >= from && r.timestamp <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn system(&self, system_id: &str) -> Result<Option<SystemProfile>, StoreError> {
        Ok(self.systems.read().get(system_id).cloned())
    }

    async fn recent_snapshots(
        &self,
        system_id: &str,
        n: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        let records = self.records.read();
        Ok(records
            .get(system_id)
            .map(|all| all.iter().rev().take(n).cloned().collect())
            .unwrap_or_default())
    }

    async fn cached_model(
        &self,
        system_id: &str,
        kind: &str,
    ) -> Result<Option<CachedModel>, StoreError> {
        let models = self.models.read();
        match models.get(&(system_id.to_string(), kind.to_string())) {
            Some(m) if !m.is_expired(Utc::now()) => Ok(Some(m.clone())),
            _ => Ok(None),
        }
    }

    async fn put_cached_model(
        &self,
        system_id: &str,
        model: CachedModel,
    ) -> Result<(), StoreError> {
        self.models
            .write()
            .insert((system_id.to_string(), model.kind.clone()), model);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Snapshot;
    use chrono::Duration;

    fn record(ts: DateTime<Utc>, soc: f64) -> HistoricalRecord {
        HistoricalRecord {
            system_id: "sys-1".into(),
            timestamp: ts,
            analysis: Snapshot {
                soc: Some(soc),
                ..Default::default()
            },
            weather: None,
            alerts: vec![],
        }
    }

    #[tokio::test]
    async fn records_filters_by_range_and_stays_sorted() {
        let t0 = Utc::now();
        let store = InMemoryStore::new().with_records(
            "sys-1",
            vec![
                record(t0 + Duration::hours(2), 40.0),
                record(t0, 50.0),
                record(t0 + Duration::hours(1), 45.0),
            ],
        );

        let all = store
            .records("sys-1", t0, t0 + Duration::hours(2), Projection::Full)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn recent_snapshots_is_newest_first() {
        let t0 = Utc::now();
        let store = InMemoryStore::new().with_records(
            "sys-1",
            vec![record(t0, 50.0), record(t0 + Duration::hours(1), 45.0)],
        );
        let recent = store.recent_snapshots("sys-1", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].analysis.soc, Some(45.0));
    }

    #[tokio::test]
    async fn cached_model_expires() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .put_cached_model(
                "sys-1",
                CachedModel {
                    kind: "lifetime".into(),
                    value: serde_json::json!({"k": 1}),
                    computed_at: now,
                    expires_at: now - Duration::seconds(1),
                },
            )
            .await
            .unwrap();
        assert!(store.cached_model("sys-1", "lifetime").await.unwrap().is_none());
    }
}
