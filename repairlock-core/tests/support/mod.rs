//! Shared fixtures for the coordination integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use repairlock_core::{
    CoordinatorConfig, PlanError, Planner, RecordKey, RepairPlan, RepairStatus, RepairStep,
    SchedulerDriver, StatusRecord, StepExecutor,
    records::MutexRecord,
    runner::StepExit,
    store::{Consistency, RecordStore, StatusPage, StoreResult},
    topology::NamespaceManifest,
};

/// Coordinator settings used across the scenarios: default TTLs, 5s settle.
pub fn config() -> Arc<CoordinatorConfig> {
    Arc::new(CoordinatorConfig::default())
}

pub fn plan(steps: &[(&str, &str)]) -> RepairPlan {
    RepairPlan {
        steps: steps
            .iter()
            .map(|(name, command)| RepairStep {
                name: name.to_string(),
                command: command.to_string(),
            })
            .collect(),
    }
}

/// Planner returning a fixed plan, or a spawn failure when empty-handed.
#[derive(Debug, Clone)]
pub struct FixedPlanner(pub Option<RepairPlan>);

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _key: &RecordKey) -> Result<RepairPlan, PlanError> {
        self.0.clone().ok_or_else(|| PlanError::Spawn {
            tool: "range_repair".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        })
    }
}

/// Executor that takes `step_time` per step on the tokio clock and tracks
/// how many steps are in flight across every node sharing it.
#[derive(Debug, Default)]
pub struct ClusterExecutor {
    pub step_time: Duration,
    pub exit_codes: HashMap<String, i32>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    runs: Mutex<Vec<String>>,
}

impl ClusterExecutor {
    pub fn new(step_time: Duration) -> Self {
        Self {
            step_time,
            ..Self::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl StepExecutor for ClusterExecutor {
    async fn run(&self, step: &RepairStep) -> StepExit {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.runs.lock().push(step.command.clone());

        tokio::time::sleep(self.step_time).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let code = self.exit_codes.get(&step.name).copied().unwrap_or(0);
        StepExit {
            code: Some(code),
            success: code == 0,
            spawn_error: None,
        }
    }
}

/// Store decorator that logs status writes and can distort mutex reads.
#[derive(Debug)]
pub struct Probe {
    inner: Arc<dyn RecordStore>,
    /// Node whose mutex record weak reads fail to return.
    pub hide_mutex_of: Option<String>,
    /// Extra latency added after a mutex scan has been served.
    pub verify_latency: Duration,
    /// Latency added in front of every call.
    pub call_latency: Duration,
    statuses: Mutex<Vec<RepairStatus>>,
}

impl Probe {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            hide_mutex_of: None,
            verify_latency: Duration::ZERO,
            call_latency: Duration::ZERO,
            statuses: Mutex::new(Vec::new()),
        }
    }

    /// Every status value written through this probe, in order.
    pub fn written_statuses(&self) -> Vec<RepairStatus> {
        self.statuses.lock().clone()
    }

    async fn delay(&self) {
        if !self.call_latency.is_zero() {
            tokio::time::sleep(self.call_latency).await;
        }
    }
}

#[async_trait]
impl RecordStore for Probe {
    async fn put_mutex(&self, key: &RecordKey, ttl: Duration, c: Consistency) -> StoreResult<()> {
        self.delay().await;
        self.inner.put_mutex(key, ttl, c).await
    }

    async fn mutex_records(&self, dc: &str, c: Consistency) -> StoreResult<Vec<MutexRecord>> {
        self.delay().await;
        let mut records = self.inner.mutex_records(dc, c).await?;
        if c == Consistency::One
            && let Some(hidden) = &self.hide_mutex_of
        {
            records.retain(|record| &record.nodename != hidden);
        }
        if !self.verify_latency.is_zero() {
            tokio::time::sleep(self.verify_latency).await;
        }
        Ok(records)
    }

    async fn delete_mutex(&self, key: &RecordKey, c: Consistency) -> StoreResult<()> {
        self.delay().await;
        self.inner.delete_mutex(key, c).await
    }

    async fn put_status(
        &self,
        record: &StatusRecord,
        ttl: Duration,
        c: Consistency,
    ) -> StoreResult<()> {
        self.delay().await;
        self.statuses.lock().push(record.status.clone());
        self.inner.put_status(record, ttl, c).await
    }

    async fn status(&self, key: &RecordKey, c: Consistency) -> StoreResult<Option<StatusRecord>> {
        self.delay().await;
        self.inner.status(key, c).await
    }

    async fn data_center_statuses(
        &self,
        dc: &str,
        c: Consistency,
    ) -> StoreResult<Vec<StatusRecord>> {
        self.delay().await;
        self.inner.data_center_statuses(dc, c).await
    }

    async fn status_page(
        &self,
        cursor: Option<u64>,
        limit: usize,
        c: Consistency,
    ) -> StoreResult<StatusPage> {
        self.delay().await;
        self.inner.status_page(cursor, limit, c).await
    }

    async fn delete_status(&self, key: &RecordKey, c: Consistency) -> StoreResult<()> {
        self.delay().await;
        self.inner.delete_status(key, c).await
    }

    async fn ensure_namespace(&self, manifest: &NamespaceManifest) -> StoreResult<bool> {
        self.delay().await;
        self.inner.ensure_namespace(manifest).await
    }
}

pub fn driver(
    node: &str,
    store: Arc<dyn RecordStore>,
    config: Arc<CoordinatorConfig>,
    planner: FixedPlanner,
    executor: Arc<ClusterExecutor>,
) -> SchedulerDriver {
    SchedulerDriver::new(
        RecordKey::new(node, "dc1"),
        store,
        config,
        Arc::new(planner),
        executor,
    )
}
