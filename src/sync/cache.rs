use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Reconciler, SyncError, SyncReport};
use crate::persistence::{KeyValueStore, StorageError};
use crate::remote::RemoteError;

const PENDING_KEY: &str = "cache.pending";

/// A row written while offline, waiting to be pushed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: Uuid,
    pub table: String,
    pub payload: Value,
    pub queued_at: DateTime<Utc>,
}

/// Offline write queue kept in durable storage
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
    // Serialises read-modify-write cycles on the queue
    lock: Mutex<()>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn enqueue(&self, table: &str, payload: Value) -> Result<PendingRecord, StorageError> {
        let _guard = self.lock.lock();

        let record = PendingRecord {
            id: Uuid::new_v4(),
            table: table.to_string(),
            payload,
            queued_at: Utc::now(),
        };

        let mut queue = self.load()?;
        queue.push(record.clone());
        self.save(&queue)?;

        tracing::debug!("Queued offline record {} for '{}' ({} pending)", record.id, table, queue.len());
        Ok(record)
    }

    pub fn pending(&self) -> Result<Vec<PendingRecord>, StorageError> {
        let _guard = self.lock.lock();
        self.load()
    }

    /// Drop records the remote store has accepted
    pub fn acknowledge(&self, ids: &[Uuid]) -> Result<(), StorageError> {
        let _guard = self.lock.lock();

        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut queue = self.load()?;
        queue.retain(|record| !ids.contains(&record.id));
        self.save(&queue)
    }

    fn load(&self) -> Result<Vec<PendingRecord>, StorageError> {
        match self.store.get(PENDING_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, queue: &[PendingRecord]) -> Result<(), StorageError> {
        if queue.is_empty() {
            self.store.remove(PENDING_KEY)
        } else {
            self.store.set(PENDING_KEY, serde_json::to_value(queue)?)
        }
    }
}

/// Row store on the hosted backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn upsert_rows(&self, table: &str, rows: &[Value], access_token: Option<&str>) -> Result<(), RemoteError>;
}

/// Supplies the bearer token for remote writes
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

impl AccessTokenSource for crate::auth::SessionManager {
    fn access_token(&self) -> Option<String> {
        crate::auth::SessionManager::access_token(self)
    }
}

/// Pushes the offline queue to the remote store, one batch per table
pub struct CacheReconciler {
    cache: Arc<LocalCache>,
    remote: Arc<dyn RemoteStore>,
    tokens: Arc<dyn AccessTokenSource>,
}

impl CacheReconciler {
    pub fn new(cache: Arc<LocalCache>, remote: Arc<dyn RemoteStore>, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self { cache, remote, tokens }
    }
}

#[async_trait]
impl Reconciler for CacheReconciler {
    async fn reconcile(&self) -> Result<SyncReport, SyncError> {
        let pending = self.cache.pending()?;
        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        let mut batches: BTreeMap<&str, Vec<&PendingRecord>> = BTreeMap::new();
        for record in &pending {
            batches.entry(record.table.as_str()).or_default().push(record);
        }

        let token = self.tokens.access_token();
        let mut report = SyncReport::default();

        // Accepted batches are acknowledged immediately; a failure aborts the rest of the pass
        for (table, records) in batches {
            let rows: Vec<Value> = records.iter().map(|r| r.payload.clone()).collect();
            self.remote.upsert_rows(table, &rows, token.as_deref()).await?;

            let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
            self.cache.acknowledge(&ids)?;

            tracing::debug!("Pushed {} records to '{}'", ids.len(), table);
            report.pushed += ids.len();
            report.tables += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingRemote {
        fail_table: Option<String>,
        pushed: Mutex<Vec<(String, usize, Option<String>)>>,
    }

    #[async_trait]
    impl RemoteStore for RecordingRemote {
        async fn upsert_rows(&self, table: &str, rows: &[Value], access_token: Option<&str>) -> Result<(), RemoteError> {
            if self.fail_table.as_deref() == Some(table) {
                return Err(RemoteError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.pushed
                .lock()
                .push((table.to_string(), rows.len(), access_token.map(str::to_string)));
            Ok(())
        }
    }

    struct StaticToken;

    impl AccessTokenSource for StaticToken {
        fn access_token(&self) -> Option<String> {
            Some("token".into())
        }
    }

    fn cache() -> Arc<LocalCache> {
        Arc::new(LocalCache::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_enqueue_and_acknowledge() {
        let cache = cache();
        let first = cache.enqueue("attendance", json!({"athlete": 1})).unwrap();
        cache.enqueue("attendance", json!({"athlete": 2})).unwrap();

        assert_eq!(cache.pending().unwrap().len(), 2);
        cache.acknowledge(&[first.id]).unwrap();

        let remaining = cache.pending().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].payload, json!({"athlete": 2}));
    }

    #[tokio::test]
    async fn test_reconcile_pushes_each_table_once() {
        let cache = cache();
        cache.enqueue("attendance", json!({"athlete": 1})).unwrap();
        cache.enqueue("rankings", json!({"athlete": 1, "score": 9})).unwrap();
        cache.enqueue("attendance", json!({"athlete": 2})).unwrap();

        let remote = Arc::new(RecordingRemote::default());
        let reconciler = CacheReconciler::new(cache.clone(), remote.clone(), Arc::new(StaticToken));

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report, SyncReport { pushed: 3, tables: 2 });
        assert!(cache.pending().unwrap().is_empty());

        let pushed = remote.pushed.lock();
        assert_eq!(pushed[0], ("attendance".to_string(), 2, Some("token".to_string())));
        assert_eq!(pushed[1], ("rankings".to_string(), 1, Some("token".to_string())));
    }

    #[tokio::test]
    async fn test_failed_batch_fails_pass_and_keeps_records() {
        let cache = cache();
        cache.enqueue("attendance", json!({"athlete": 1})).unwrap();
        cache.enqueue("rankings", json!({"athlete": 1})).unwrap();

        let remote = Arc::new(RecordingRemote {
            fail_table: Some("rankings".into()),
            ..Default::default()
        });
        let reconciler = CacheReconciler::new(cache.clone(), remote, Arc::new(StaticToken));

        assert!(matches!(reconciler.reconcile().await, Err(SyncError::Remote(_))));

        let remaining = cache.pending().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].table, "rankings");
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_no_op() {
        let remote = Arc::new(RecordingRemote::default());
        let reconciler = CacheReconciler::new(cache(), remote.clone(), Arc::new(StaticToken));

        assert_eq!(reconciler.reconcile().await.unwrap(), SyncReport::default());
        assert!(remote.pushed.lock().is_empty());
    }
}
