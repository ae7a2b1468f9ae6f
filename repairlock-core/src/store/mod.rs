//! Port to the shared, replicated, TTL-bearing record store.
//!
//! The coordination protocol never assumes more than the store offers:
//! per-call consistency levels, per-record TTLs, last-write-wins
//! replication, and write timestamps surfaced on read.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod timeout;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{MutexRecord, RecordKey, StatusRecord};
use crate::topology::NamespaceManifest;

pub use memory::{MemoryStore, MemoryStoreOptions};
#[cfg(feature = "redis")]
pub use redis_store::{RedisStore, RedisStoreOptions};
pub use timeout::TimeoutStore;

/// How many replicas an operation must reach.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// A single replica; fast and possibly stale.
    One,
    /// A majority of replicas.
    Quorum,
    /// Every replica.
    All,
}

impl Consistency {
    /// Replicas that must take part for a cluster of `replicas` nodes.
    pub fn required(self, replicas: usize) -> usize {
        let replicas = replicas.max(1);
        match self {
            Consistency::One => 1,
            Consistency::Quorum => replicas / 2 + 1,
            Consistency::All => replicas,
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::One => write!(f, "one"),
            Consistency::Quorum => write!(f, "quorum"),
            Consistency::All => write!(f, "all"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("malformed record at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("only {acknowledged} of {required} replicas acknowledged the write")]
    Unavailable { required: usize, acknowledged: usize },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One page of a cluster-wide status scan.
#[derive(Clone, Debug, Default)]
pub struct StatusPage {
    pub records: Vec<StatusRecord>,
    /// Cursor for the next page; `None` once the scan is exhausted.
    pub next: Option<u64>,
}

#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Create or overwrite the mutex record of `key`.
    async fn put_mutex(
        &self,
        key: &RecordKey,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()>;

    /// Every live mutex record of `data_center`.
    async fn mutex_records(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<MutexRecord>>;

    async fn delete_mutex(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()>;

    /// Create or overwrite a status record, refreshing its TTL.
    async fn put_status(
        &self,
        record: &StatusRecord,
        ttl: Duration,
        consistency: Consistency,
    ) -> StoreResult<()>;

    async fn status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<Option<StatusRecord>>;

    /// Every live status record of `data_center`.
    async fn data_center_statuses(
        &self,
        data_center: &str,
        consistency: Consistency,
    ) -> StoreResult<Vec<StatusRecord>>;

    /// Cluster-wide paginated scan. `cursor` is `None` for the first page.
    async fn status_page(
        &self,
        cursor: Option<u64>,
        limit: usize,
        consistency: Consistency,
    ) -> StoreResult<StatusPage>;

    async fn delete_status(
        &self,
        key: &RecordKey,
        consistency: Consistency,
    ) -> StoreResult<()>;

    /// Persist `manifest` unless the namespace already has one. Returns
    /// `true` when this call created it.
    async fn ensure_namespace(&self, manifest: &NamespaceManifest) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_replicas() {
        assert_eq!(Consistency::One.required(3), 1);
        assert_eq!(Consistency::Quorum.required(3), 2);
        assert_eq!(Consistency::Quorum.required(5), 3);
        assert_eq!(Consistency::All.required(3), 3);
        assert_eq!(Consistency::Quorum.required(0), 1);
    }
}
