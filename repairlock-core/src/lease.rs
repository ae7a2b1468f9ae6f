//! Write-then-verify soft mutex over the data center's mutex records.
//!
//! A node writes its own mutex record, waits for replication to settle, then
//! re-reads every mutex record of its data center. The first record in key
//! order is the holder; every node that sees the same set agrees on it. When
//! replication is slower than the settle delay two nodes can both see
//! themselves first, so exclusion is probabilistic.

use std::{fmt, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Result, StoreContext};
use crate::records::RecordKey;
use crate::store::RecordStore;

/// A successfully verified mutex.
#[derive(Clone, Debug)]
pub struct Lease {
    key: RecordKey,
    written_at: Instant,
    ttl: Duration,
}

impl Lease {
    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Time left before the mutex record self-expires.
    pub fn remaining(&self) -> Duration {
        self.ttl.saturating_sub(self.written_at.elapsed())
    }

    pub fn is_live(&self) -> bool {
        !self.remaining().is_zero()
    }

    /// Whether the mutex record outlives a store call that may take up to
    /// `call`.
    pub fn covers(&self, call: Duration) -> bool {
        self.remaining() > call
    }
}

#[derive(Clone, Debug)]
pub enum LeaseOutcome {
    Acquired(Lease),
    /// Another node (or nobody, when the own record was not visible yet)
    /// came out first.
    Lost { holder: Option<String> },
}

impl LeaseOutcome {
    pub fn acquired(&self) -> bool {
        matches!(self, LeaseOutcome::Acquired(_))
    }
}

#[derive(Clone)]
pub struct LeaseCoordinator {
    store: Arc<dyn RecordStore>,
    config: Arc<CoordinatorConfig>,
}

impl fmt::Debug for LeaseCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseCoordinator")
            .field("mutex_ttl", &self.config.mutex_ttl())
            .field("settle_delay", &self.config.settle_delay())
            .finish()
    }
}

impl LeaseCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<CoordinatorConfig>) -> Self {
        Self { store, config }
    }

    pub async fn try_acquire(&self, key: &RecordKey) -> Result<LeaseOutcome> {
        let ttl = self.config.mutex_ttl();
        let written_at = Instant::now();
        self.store
            .put_mutex(key, ttl, self.config.write_consistency)
            .await
            .during("writing the mutex record")?;
        debug!(node = %key.nodename, data_center = %key.data_center, ?ttl, "mutex record written");

        tokio::time::sleep(self.config.settle_delay()).await;

        let mut records = self
            .store
            .mutex_records(&key.data_center, self.config.verify_consistency)
            .await
            .during("verifying the mutex")?;
        records.sort_by(|a, b| a.nodename.cmp(&b.nodename));
        let holder = records.into_iter().next().map(|record| record.nodename);

        if holder.as_deref() == Some(key.nodename.as_str()) {
            info!(node = %key.nodename, data_center = %key.data_center, "mutex acquired");
            return Ok(LeaseOutcome::Acquired(Lease {
                key: key.clone(),
                written_at,
                ttl,
            }));
        }

        info!(
            node = %key.nodename,
            data_center = %key.data_center,
            holder = holder.as_deref().unwrap_or("<none>"),
            "mutex held elsewhere"
        );
        self.discard(key).await;
        Ok(LeaseOutcome::Lost { holder })
    }

    /// Deletes the mutex record of a lease that is no longer needed.
    pub async fn release(&self, lease: Lease) -> Result<()> {
        self.store
            .delete_mutex(&lease.key, self.config.write_consistency)
            .await
            .during("releasing the mutex")
    }

    /// Best-effort removal of the own mutex record.
    pub async fn discard(&self, key: &RecordKey) {
        if let Err(err) = self
            .store
            .delete_mutex(key, self.config.write_consistency)
            .await
        {
            warn!(node = %key.nodename, error = %err, "failed to delete own mutex record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Consistency, MemoryStore};

    fn coordinator(store: MemoryStore) -> LeaseCoordinator {
        LeaseCoordinator::new(Arc::new(store), Arc::new(CoordinatorConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn lone_node_acquires() {
        let store = MemoryStore::new();
        let key = RecordKey::new("node-a", "dc1");
        let outcome = coordinator(store.clone()).try_acquire(&key).await.unwrap();
        let LeaseOutcome::Acquired(lease) = outcome else {
            panic!("expected the lease, got {outcome:?}");
        };
        assert!(lease.is_live());
        assert!(lease.remaining() <= Duration::from_secs(55));
    }

    #[tokio::test(start_paused = true)]
    async fn lower_nodename_wins_and_loser_cleans_up() {
        let store = MemoryStore::new();
        let held = RecordKey::new("node-a", "dc1");
        store
            .put_mutex(&held, Duration::from_secs(60), Consistency::Quorum)
            .await
            .unwrap();

        let key = RecordKey::new("node-b", "dc1");
        let outcome = coordinator(store.clone()).try_acquire(&key).await.unwrap();
        match outcome {
            LeaseOutcome::Lost { holder } => assert_eq!(holder.as_deref(), Some("node-a")),
            other => panic!("expected a loss, got {other:?}"),
        }

        let remaining = store.mutex_records("dc1", Consistency::All).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].nodename, "node-a");
    }

    #[tokio::test(start_paused = true)]
    async fn other_data_centers_do_not_interfere() {
        let store = MemoryStore::new();
        store
            .put_mutex(&RecordKey::new("aaa", "dc2"), Duration::from_secs(60), Consistency::Quorum)
            .await
            .unwrap();
        let outcome = coordinator(store)
            .try_acquire(&RecordKey::new("node-b", "dc1"))
            .await
            .unwrap();
        assert!(outcome.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn lease_expires_with_the_mutex_ttl() {
        let store = MemoryStore::new();
        let outcome = coordinator(store)
            .try_acquire(&RecordKey::new("node-a", "dc1"))
            .await
            .unwrap();
        let LeaseOutcome::Acquired(lease) = outcome else {
            panic!("expected the lease");
        };
        assert!(lease.covers(Duration::from_secs(50)));
        assert!(!lease.covers(Duration::from_secs(55)));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!lease.is_live());
    }
}
