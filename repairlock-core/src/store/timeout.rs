use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{Consistency, RecordStore, StatusPage, StoreError, StoreResult};
use crate::records::{MutexRecord, RecordKey, StatusRecord};
use crate::topology::NamespaceManifest;

/// Bounds every call of the wrapped store by a fixed deadline.
#[derive(Clone)]
pub struct TimeoutStore {
    inner: Arc<dyn RecordStore>,
    limit: Duration,
}

impl fmt::Debug for TimeoutStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutStore")
            .field("inner", &self.inner)
            .field("limit", &self.limit)
            .finish()
    }
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn RecordStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| StoreError::Timeout {
                operation,
                after: self.limit,
            })?
    }
}

#[async_trait]
impl RecordStore for TimeoutStore {
    async fn put_mutex(
        &self,
        key: &RecordKey,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.bounded("put_mutex", self.inner.put_mutex(key, ttl, consistency))
            .await
    }

    async fn mutex_records(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<MutexRecord>> {
        self.bounded(
            "mutex_records",
            self.inner.mutex_records(data_center, consistency),
        )
        .await
    }

    async fn delete_mutex(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.bounded("delete_mutex", self.inner.delete_mutex(key, consistency))
            .await
    }

    async fn put_status(
        &self,
        record: &StatusRecord,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.bounded("put_status", self.inner.put_status(record, ttl, consistency))
            .await
    }

    async fn status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<Option<StatusRecord>> {
        self.bounded("status", self.inner.status(key, consistency))
            .await
    }

    async fn data_center_statuses(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<StatusRecord>> {
        self.bounded(
            "data_center_statuses",
            self.inner.data_center_statuses(data_center, consistency),
        )
        .await
    }

    async fn status_page(
        &self,
        cursor: Option<u64>,
        limit: usize,
        consistency: Consistency,
    ) -> StoreResult<StatusPage> {
        self.bounded(
            "status_page",
            self.inner.status_page(cursor, limit, consistency),
        )
        .await
    }

    async fn delete_status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()> {
        self.bounded("delete_status", self.inner.delete_status(key, consistency))
            .await
    }

    async fn ensure_namespace(&self, manifest: &NamespaceManifest) -> StoreResult<bool> {
        self.bounded("ensure_namespace", self.inner.ensure_namespace(manifest))
            .await
    }
}
