//! Status record lifecycle and the "may I run?" gate.

use std::{fmt, sync::Arc};

use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{Result, StoreContext};
use crate::records::{RecordKey, RepairStatus, StatusRecord, StepOutcome};
use crate::store::RecordStore;

/// Answer of [`StatusTracker::may_run`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Eligibility {
    Eligible,
    /// This node still has a record: a run in flight or a cool-down.
    OwnRecord(RepairStatus),
    /// Another node of the data center has not completed its run.
    PeerActive {
        nodename: String,
        status: RepairStatus,
    },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn RecordStore>,
    config: Arc<CoordinatorConfig>,
}

impl fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusTracker")
            .field("status_ttl", &self.config.status_ttl())
            .field("cooldown_ttl", &self.config.cooldown_ttl())
            .finish()
    }
}

impl StatusTracker {
    pub fn new(store: Arc<dyn RecordStore>, config: Arc<CoordinatorConfig>) -> Self {
        Self { store, config }
    }

    pub async fn may_run(&self, key: &RecordKey) -> Result<Eligibility> {
        let own = self
            .store
            .status(key, self.config.read_consistency)
            .await
            .during("reading own status")?;
        if let Some(record) = own {
            debug!(node = %key.nodename, status = %record.status, "own status record present");
            return Ok(Eligibility::OwnRecord(record.status));
        }
        self.peer_active(key).await
    }

    /// The peer half of [`Self::may_run`], on its own.
    pub async fn peer_active(&self, key: &RecordKey) -> Result<Eligibility> {
        let mut peers = self
            .store
            .data_center_statuses(&key.data_center, self.config.read_consistency)
            .await
            .during("reading data center statuses")?;
        peers.sort_by(|a, b| a.nodename.cmp(&b.nodename));

        let active = peers
            .into_iter()
            .find(|record| record.nodename != key.nodename && record.status.is_active());
        Ok(match active {
            Some(record) => {
                debug!(peer = %record.nodename, status = %record.status, "peer run in flight");
                Eligibility::PeerActive {
                    nodename: record.nodename,
                    status: record.status,
                }
            }
            None => Eligibility::Eligible,
        })
    }

    /// Writes the initial `Started` record. Failure is fatal: without it the
    /// run would be invisible to peers.
    pub async fn start(&self, key: &RecordKey) -> Result<StatusRecord> {
        let record = StatusRecord::started(key);
        self.store
            .put_status(&record, self.config.status_ttl(), self.config.write_consistency)
            .await
            .during("writing the Started status")?;
        info!(node = %key.nodename, run_id = %record.run_id, "repair started");
        Ok(record)
    }

    /// Moves `record` to `status` and persists it. Returns whether the write
    /// succeeded; failures are logged and otherwise ignored.
    pub async fn advance(
        &self,
        record: &mut StatusRecord,
        status: RepairStatus,
        outcome: Option<StepOutcome>,
    ) -> bool {
        let ttl = if status.is_completed() {
            self.config.cooldown_ttl()
        } else {
            self.config.status_ttl()
        };
        record.transition(status, outcome, self.config.history_limit);

        match self
            .store
            .put_status(record, ttl, self.config.write_consistency)
            .await
        {
            Ok(()) => {
                debug!(node = %record.nodename, status = %record.status, "status advanced");
                true
            }
            Err(err) => {
                warn!(
                    node = %record.nodename,
                    status = %record.status,
                    error = %err,
                    "failed to update status record"
                );
                false
            }
        }
    }

    /// Deletes the node's own mutex and status records. Safe to repeat.
    pub async fn reset(&self, key: &RecordKey) -> Result<()> {
        self.store
            .delete_mutex(key, self.config.write_consistency)
            .await
            .during("deleting the mutex record")?;
        self.store
            .delete_status(key, self.config.write_consistency)
            .await
            .during("deleting the status record")?;
        info!(node = %key.nodename, data_center = %key.data_center, "state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{Consistency, MemoryStore};

    fn tracker(store: &MemoryStore) -> StatusTracker {
        StatusTracker::new(Arc::new(store.clone()), Arc::new(CoordinatorConfig::default()))
    }

    async fn seed(store: &MemoryStore, node: &str, dc: &str, status: RepairStatus) {
        let mut record = StatusRecord::started(&RecordKey::new(node, dc));
        record.transition(status, None, 4);
        store
            .put_status(&record, Duration::from_secs(600), Consistency::All)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn own_record_blocks_regardless_of_value() {
        let store = MemoryStore::new();
        seed(&store, "a", "dc1", RepairStatus::Completed).await;
        let eligibility = tracker(&store).may_run(&RecordKey::new("a", "dc1")).await.unwrap();
        assert_eq!(eligibility, Eligibility::OwnRecord(RepairStatus::Completed));
    }

    #[tokio::test]
    async fn active_peer_blocks_completed_peer_does_not() {
        let store = MemoryStore::new();
        seed(&store, "b", "dc1", RepairStatus::Completed).await;
        let me = RecordKey::new("a", "dc1");
        assert!(tracker(&store).may_run(&me).await.unwrap().is_eligible());

        seed(&store, "c", "dc1", RepairStatus::Step("range7".into())).await;
        assert_eq!(
            tracker(&store).may_run(&me).await.unwrap(),
            Eligibility::PeerActive {
                nodename: "c".into(),
                status: RepairStatus::Step("range7".into())
            }
        );
    }

    #[tokio::test]
    async fn peers_in_other_data_centers_are_ignored() {
        let store = MemoryStore::new();
        seed(&store, "b", "dc2", RepairStatus::Started).await;
        assert!(
            tracker(&store)
                .may_run(&RecordKey::new("a", "dc1"))
                .await
                .unwrap()
                .is_eligible()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completed_uses_cooldown_ttl() {
        let store = MemoryStore::new();
        let config = CoordinatorConfig {
            status_ttl_secs: 100,
            cooldown_ttl_secs: 1_000,
            ..CoordinatorConfig::default()
        };
        let tracker = StatusTracker::new(Arc::new(store.clone()), Arc::new(config));
        let key = RecordKey::new("a", "dc1");

        let mut record = tracker.start(&key).await.unwrap();
        assert!(tracker.advance(&mut record, RepairStatus::Completed, None).await);

        tokio::time::advance(Duration::from_secs(500)).await;
        assert!(store.status(&key, Consistency::One).await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(501)).await;
        assert!(store.status(&key, Consistency::One).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn advance_swallows_store_failures() {
        let store = MemoryStore::new();
        let tracker = tracker(&store);
        let mut record = tracker.start(&RecordKey::new("a", "dc1")).await.unwrap();
        store.fail_status_writes(true);
        assert!(
            !tracker
                .advance(&mut record, RepairStatus::Step("r1".into()), None)
                .await
        );
        assert_eq!(record.status, RepairStatus::Step("r1".into()));
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let store = MemoryStore::new();
        let tracker = tracker(&store);
        let key = RecordKey::new("a", "dc1");
        tracker.start(&key).await.unwrap();

        tracker.reset(&key).await.unwrap();
        tracker.reset(&key).await.unwrap();
        assert!(tracker.may_run(&key).await.unwrap().is_eligible());
    }
}
