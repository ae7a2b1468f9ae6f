//! Cluster-wide view of every node's status record, for the dashboard.
//!
//! The aggregator task is the only writer: each poll builds a fresh
//! [`ClusterSnapshot`] and publishes it through a `watch` channel. Readers
//! always see a complete snapshot and never a half-updated one.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::error::{Result, StoreContext};
use crate::records::{RepairStatus, StatusRecord};
use crate::store::{Consistency, RecordStore};

const RETRY_AFTER_FAILURE: Duration = Duration::from_secs(1);

/// Age limits for in-flight runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Thresholds {
    pub warn_after: Duration,
    pub critical_after: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_after: Duration::from_secs(2 * 3_600),
            critical_after: Duration::from_secs(4 * 3_600),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl Severity {
    /// Completed rows are always `Ok`; running rows degrade with age.
    pub fn classify(status: &RepairStatus, elapsed: Duration, thresholds: Thresholds) -> Self {
        if status.is_completed() {
            Severity::Ok
        } else if elapsed > thresholds.critical_after {
            Severity::Critical
        } else if elapsed > thresholds.warn_after {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

/// One display line.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeRow {
    pub nodename: String,
    pub data_center: String,
    pub status: RepairStatus,
    pub written_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub severity: Severity,
}

/// Latest status record per node at `taken_at`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub records: BTreeMap<String, StatusRecord>,
    pub taken_at: Option<DateTime<Utc>>,
}

impl ClusterSnapshot {
    /// Builds a snapshot, keeping the most recent record when a node name
    /// shows up more than once.
    pub fn from_records(
        records: impl IntoIterator<Item = StatusRecord>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        let mut latest: BTreeMap<String, StatusRecord> = BTreeMap::new();
        for record in records {
            match latest.get(&record.nodename) {
                Some(existing) if existing.written_at >= record.written_at => {}
                _ => {
                    latest.insert(record.nodename.clone(), record);
                }
            }
        }
        Self {
            records: latest,
            taken_at: Some(taken_at),
        }
    }

    pub fn running(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.status.is_active())
            .count()
    }

    pub fn completed(&self) -> usize {
        self.records.len() - self.running()
    }

    /// Running rows first, then completed ones; oldest write first in each
    /// group. Elapsed time is measured against `now`.
    pub fn rows(&self, now: DateTime<Utc>, thresholds: Thresholds) -> Vec<NodeRow> {
        let mut rows: Vec<NodeRow> = self
            .records
            .values()
            .map(|record| {
                let elapsed = (now - record.written_at).to_std().unwrap_or_default();
                NodeRow {
                    nodename: record.nodename.clone(),
                    data_center: record.data_center.clone(),
                    status: record.status.clone(),
                    written_at: record.written_at,
                    elapsed,
                    severity: Severity::classify(&record.status, elapsed, thresholds),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            a.status
                .is_completed()
                .cmp(&b.status.is_completed())
                .then(a.written_at.cmp(&b.written_at))
        });
        rows
    }
}

/// Renders a duration as seconds, minutes, hours or days with two decimals.
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut value = elapsed.as_secs_f64();
    if value < 60.0 {
        return format!("{value:.2} seconds");
    }
    value /= 60.0;
    if value < 60.0 {
        return format!("{value:.2} minutes");
    }
    value /= 60.0;
    if value < 24.0 {
        return format!("{value:.2} hours");
    }
    value /= 24.0;
    format!("{value:.2} days")
}

#[derive(Clone)]
pub struct ClusterStatusAggregator {
    store: Arc<dyn RecordStore>,
    page_size: usize,
}

impl fmt::Debug for ClusterStatusAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterStatusAggregator")
            .field("store", &self.store)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl ClusterStatusAggregator {
    pub fn new(store: Arc<dyn RecordStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Reads every status record in the namespace, page by page.
    pub async fn poll(&self) -> Result<ClusterSnapshot> {
        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .status_page(cursor, self.page_size, Consistency::One)
                .await
                .during("scanning cluster status")?;
            records.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(records = records.len(), "cluster status polled");
        Ok(ClusterSnapshot::from_records(records, Utc::now()))
    }

    /// Polls on a background task until every snapshot receiver is dropped.
    /// The refresh interval is read from `interval_rx` and may change at
    /// any time.
    pub fn spawn(
        self,
        mut interval_rx: watch::Receiver<Duration>,
    ) -> (watch::Receiver<Arc<ClusterSnapshot>>, JoinHandle<()>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(ClusterSnapshot::default()));

        let task = tokio::spawn(async move {
            loop {
                let delay = match self.poll().await {
                    Ok(snapshot) => {
                        if snapshot_tx.send(Arc::new(snapshot)).is_err() {
                            break;
                        }
                        *interval_rx.borrow_and_update()
                    }
                    Err(err) => {
                        warn!(error = %err, "cluster status poll failed; keeping last snapshot");
                        RETRY_AFTER_FAILURE
                    }
                };

                tokio::select! {
                    _ = snapshot_tx.closed() => break,
                    _ = tokio::time::sleep(delay) => {}
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            // Nobody can adjust the interval any more; keep
                            // the last value.
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
            debug!("cluster status aggregator stopped");
        });

        (snapshot_rx, task)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::records::RecordKey;

    fn record(node: &str, status: RepairStatus, age_secs: i64, now: DateTime<Utc>) -> StatusRecord {
        let mut record = StatusRecord::started(&RecordKey::new(node, "dc1"));
        record.status = status;
        record.written_at = now - TimeDelta::seconds(age_secs);
        record
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_secs(42)), "42.00 seconds");
        assert_eq!(format_elapsed(Duration::from_secs(90)), "1.50 minutes");
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3_600)), "3.00 hours");
        assert_eq!(format_elapsed(Duration::from_secs(36 * 3_600)), "1.50 days");
    }

    #[test]
    fn severity_ignores_completed_rows() {
        let thresholds = Thresholds::default();
        let five_hours = Duration::from_secs(5 * 3_600);
        assert_eq!(
            Severity::classify(&RepairStatus::Completed, five_hours, thresholds),
            Severity::Ok
        );
        assert_eq!(
            Severity::classify(&RepairStatus::Started, five_hours, thresholds),
            Severity::Critical
        );
        assert_eq!(
            Severity::classify(
                &RepairStatus::Step("r1".into()),
                Duration::from_secs(3 * 3_600),
                thresholds,
            ),
            Severity::Warning
        );
        assert_eq!(
            Severity::classify(&RepairStatus::Started, Duration::from_secs(60), thresholds),
            Severity::Ok
        );
    }

    #[test]
    fn rows_put_running_first_oldest_first() {
        let now = Utc::now();
        let snapshot = ClusterSnapshot::from_records(
            [
                record("a", RepairStatus::Completed, 10, now),
                record("b", RepairStatus::Step("r2".into()), 100, now),
                record("c", RepairStatus::Completed, 500, now),
                record("d", RepairStatus::Started, 300, now),
            ],
            now,
        );
        assert_eq!(snapshot.running(), 2);
        assert_eq!(snapshot.completed(), 2);

        let order: Vec<_> = snapshot
            .rows(now, Thresholds::default())
            .into_iter()
            .map(|row| row.nodename)
            .collect();
        assert_eq!(order, ["d", "b", "c", "a"]);
    }

    #[test]
    fn duplicate_nodenames_keep_latest_record() {
        let now = Utc::now();
        let snapshot = ClusterSnapshot::from_records(
            [
                record("a", RepairStatus::Started, 100, now),
                record("a", RepairStatus::Completed, 5, now),
            ],
            now,
        );
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records["a"].status, RepairStatus::Completed);
    }
}
