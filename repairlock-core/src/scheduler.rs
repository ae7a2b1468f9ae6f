//! One scheduler invocation: gate, lease, run.

use std::{fmt, sync::Arc};

use tracing::{debug, info, instrument};

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::lease::{LeaseCoordinator, LeaseOutcome};
use crate::plan::Planner;
use crate::records::{RecordKey, RepairStatus};
use crate::runner::{RepairRunner, RunReport, StepExecutor, StepFailurePolicy};
use crate::status::{Eligibility, StatusTracker};
use crate::store::RecordStore;
use crate::topology;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SchedulerState {
    Idle,
    Eligible,
    Acquiring,
    Running,
    Completed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Eligible => "eligible",
            SchedulerState::Acquiring => "acquiring",
            SchedulerState::Running => "running",
            SchedulerState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Why an invocation did nothing. None of these is an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// Own record present: in progress, failed mid-run or cooling down.
    OwnRecord(RepairStatus),
    PeerActive {
        nodename: String,
        status: RepairStatus,
    },
    LeaseLost {
        holder: Option<String>,
    },
    /// The mutex record would have expired before `Started` was written.
    LeaseExpired,
}

impl SkipReason {
    /// Stable name used in the `outcome` log field.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::OwnRecord(_) => "own_record",
            SkipReason::PeerActive { .. } => "peer_active",
            SkipReason::LeaseLost { .. } => "lease_lost",
            SkipReason::LeaseExpired => "lease_expired",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OwnRecord(status) => write!(f, "own status record is {status}"),
            SkipReason::PeerActive { nodename, status } => {
                write!(f, "{nodename} is repairing ({status})")
            }
            SkipReason::LeaseLost { holder: Some(holder) } => {
                write!(f, "mutex held by {holder}")
            }
            SkipReason::LeaseLost { holder: None } => write!(f, "mutex not visible after settling"),
            SkipReason::LeaseExpired => write!(f, "mutex expired before the run started"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SchedulerOutcome {
    Completed(RunReport),
    Skipped(SkipReason),
    Reset,
}

/// Result of [`SchedulerDriver::run_once`] with the states it went through.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    pub outcome: SchedulerOutcome,
    pub path: Vec<SchedulerState>,
}

impl Invocation {
    pub fn skipped(&self) -> Option<&SkipReason> {
        match &self.outcome {
            SchedulerOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

pub struct SchedulerDriver {
    key: RecordKey,
    config: Arc<CoordinatorConfig>,
    store: Arc<dyn RecordStore>,
    peer_data_centers: Vec<String>,
    tracker: StatusTracker,
    lease: LeaseCoordinator,
    planner: Arc<dyn Planner>,
    runner: RepairRunner,
}

impl fmt::Debug for SchedulerDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerDriver")
            .field("key", &self.key)
            .field("store", &self.store)
            .field("planner", &self.planner)
            .field("runner", &self.runner)
            .finish()
    }
}

impl SchedulerDriver {
    pub fn new(
        key: RecordKey,
        store: Arc<dyn RecordStore>,
        config: Arc<CoordinatorConfig>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
    ) -> Self {
        let tracker = StatusTracker::new(Arc::clone(&store), Arc::clone(&config));
        let lease = LeaseCoordinator::new(Arc::clone(&store), Arc::clone(&config));
        let runner = RepairRunner::new(
            tracker.clone(),
            executor,
            StepFailurePolicy::from_abort_flag(config.abort_on_step_failure),
        );
        Self {
            key,
            config,
            store,
            peer_data_centers: Vec::new(),
            tracker,
            lease,
            planner,
            runner,
        }
    }

    /// Data centers besides the local one, recorded in the namespace
    /// manifest on first bootstrap.
    pub fn with_peer_data_centers(mut self, peers: Vec<String>) -> Self {
        self.peer_data_centers = peers;
        self
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    fn enter(&self, path: &mut Vec<SchedulerState>, state: SchedulerState) {
        debug!(%state, "scheduler transition");
        path.push(state);
    }

    fn skip(&self, path: Vec<SchedulerState>, reason: SkipReason) -> Invocation {
        info!(outcome = reason.label(), reason = %reason, "skipping repair");
        Invocation {
            outcome: SchedulerOutcome::Skipped(reason),
            path,
        }
    }

    /// Decides whether to run, and runs. Skips are `Ok`; only store,
    /// planner, topology and aborted-step failures are errors.
    #[instrument(
        skip(self),
        fields(node = %self.key.nodename, data_center = %self.key.data_center)
    )]
    pub async fn run_once(&self) -> Result<Invocation> {
        let mut path = Vec::with_capacity(5);
        self.enter(&mut path, SchedulerState::Idle);

        topology::bootstrap(
            self.store.as_ref(),
            &self.config.namespace,
            &self.key,
            &self.peer_data_centers,
        )
        .await?;

        match self.tracker.may_run(&self.key).await? {
            Eligibility::Eligible => {}
            Eligibility::OwnRecord(status) => {
                return Ok(self.skip(path, SkipReason::OwnRecord(status)));
            }
            Eligibility::PeerActive { nodename, status } => {
                return Ok(self.skip(path, SkipReason::PeerActive { nodename, status }));
            }
        }
        self.enter(&mut path, SchedulerState::Eligible);

        self.enter(&mut path, SchedulerState::Acquiring);
        let lease = match self.lease.try_acquire(&self.key).await? {
            LeaseOutcome::Acquired(lease) => lease,
            LeaseOutcome::Lost { holder } => {
                return Ok(self.skip(path, SkipReason::LeaseLost { holder }));
            }
        };

        if !lease.is_live() {
            self.lease.discard(lease.key()).await;
            return Ok(self.skip(path, SkipReason::LeaseExpired));
        }

        // A peer may have written Started and dropped its mutex while we
        // were settling.
        if let Eligibility::PeerActive { nodename, status } =
            self.tracker.peer_active(&self.key).await?
        {
            self.lease.discard(lease.key()).await;
            return Ok(self.skip(path, SkipReason::PeerActive { nodename, status }));
        }

        // The mutex must still be there once Started has landed.
        if !lease.covers(self.config.store_timeout()) {
            debug!(remaining = ?lease.remaining(), "lease too short for the Started write");
            self.lease.discard(lease.key()).await;
            return Ok(self.skip(path, SkipReason::LeaseExpired));
        }

        let mut record = self.tracker.start(&self.key).await?;
        self.enter(&mut path, SchedulerState::Running);
        self.lease.release(lease).await?;

        let plan = self.planner.plan(&self.key).await?;
        let report = self.runner.execute(&plan, &mut record).await?;

        self.enter(&mut path, SchedulerState::Completed);
        info!(outcome = "completed", steps = report.steps.len(), "repair run finished");
        Ok(Invocation {
            outcome: SchedulerOutcome::Completed(report),
            path,
        })
    }

    /// Drops this node's mutex and status records, whatever their state.
    #[instrument(
        skip(self),
        fields(node = %self.key.nodename, data_center = %self.key.data_center)
    )]
    pub async fn reset(&self) -> Result<SchedulerOutcome> {
        self.tracker.reset(&self.key).await?;
        debug!(state = %SchedulerState::Idle, "scheduler transition");
        info!(outcome = "reset", "repair state reset");
        Ok(SchedulerOutcome::Reset)
    }
}
