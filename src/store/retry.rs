use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use super::{CachedModel, Projection, TelemetryStore};
use crate::domain::{HistoricalRecord, SystemProfile};
use crate::error::StoreError;

/// Wraps a `TelemetryStore` with exponential backoff: transient failures
/// are retried up to `max_retries` times before the adapter gives up and
/// returns `StoreError::Unavailable`. The engine is expected to degrade
/// gracefully on that, not propagate a panic or throw.
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S: TelemetryStore> RetryingStore<S> {
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op_name: &str, mut f: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(StoreError::Transient(msg)) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(StoreError::Unavailable {
                            attempts: attempt,
                            message: msg,
                        });
                    }
                    let delay = self.base_delay * 2u32.pow(attempt.saturating_sub(1));
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying transient store failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[async_trait]
impl<S: TelemetryStore> TelemetryStore for RetryingStore<S> {
    async fn records(
        &self,
        system_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        projection: Projection,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        self.with_retry("records", || self.inner.records(system_id, from, to, projection))
            .await
    }

    async fn system(&self, system_id: &str) -> Result<Option<SystemProfile>, StoreError> {
        self.with_retry("system", || self.inner.system(system_id)).await
    }

    async fn recent_snapshots(
        &self,
        system_id: &str,
        n: usize,
    ) -> Result<Vec<HistoricalRecord>, StoreError> {
        self.with_retry("recent_snapshots", || self.inner.recent_snapshots(system_id, n))
            .await
    }

    async fn cached_model(
        &self,
        system_id: &str,
        kind: &str,
    ) -> Result<Option<CachedModel>, StoreError> {
        self.with_retry("cached_model", || self.inner.cached_model(system_id, kind))
            .await
    }

    async fn put_cached_model(
        &self,
        system_id: &str,
        model: CachedModel,
    ) -> Result<(), StoreError> {
        self.with_retry("put_cached_model", || {
            self.inner.put_cached_model(system_id, model.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FlakyStore {
        inner: InMemoryStore,
        fail_times: Arc<AtomicU32>,
    }

    #[async_trait]
    impl TelemetryStore for FlakyStore {
        async fn records(
            &self,
            system_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
            projection: Projection,
        ) -> Result<Vec<HistoricalRecord>, StoreError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Transient("simulated blip".into()));
            }
            self.inner.records(system_id, from, to, projection).await
        }
        async fn system(&self, system_id: &str) -> Result<Option<SystemProfile>, StoreError> {
            self.inner.system(system_id).await
        }
        async fn recent_snapshots(
            &self,
            system_id: &str,
            n: usize,
        ) -> Result<Vec<HistoricalRecord>, StoreError> {
            self.inner.recent_snapshots(system_id, n).await
        }
        async fn cached_model(
            &self,
            system_id: &str,
            kind: &str,
        ) -> Result<Option<CachedModel>, StoreError> {
            self.inner.cached_model(system_id, kind).await
        }
        async fn put_cached_model(
            &self,
            system_id: &str,
            model: CachedModel,
        ) -> Result<(), StoreError> {
            self.inner.put_cached_model(system_id, model).await
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let flaky = FlakyStore {
            inner: InMemoryStore::new(),
            fail_times: Arc::new(AtomicU32::new(2)),
        };
        let store = RetryingStore::new(flaky, 3, Duration::from_millis(1));
        let result = store
            .records("sys-1", Utc::now() - chrono::Duration::days(1), Utc::now(), Projection::Full)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let flaky = FlakyStore {
            inner: InMemoryStore::new(),
            fail_times: Arc::new(AtomicU32::new(10)),
        };
        let store = RetryingStore::new(flaky, 2, Duration::from_millis(1));
        let result = store
            .records("sys-1", Utc::now() - chrono::Duration::days(1), Utc::now(), Projection::Full)
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable { attempts: 3, .. })));
    }
}
