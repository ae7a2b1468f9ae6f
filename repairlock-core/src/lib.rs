//! # repairlock core
//!
//! Coordination library that keeps expensive repair jobs from overlapping
//! inside a data center. Nodes share nothing but an eventually-consistent,
//! TTL-bearing key/value store; every scheduled invocation re-derives its
//! decision from fresh reads.
//!
//! ## Architecture
//!
//! - [`store`]: the [`RecordStore`](store::RecordStore) port plus the Redis,
//!   in-memory and timeout-bounded implementations
//! - [`lease`]: write, settle, re-read "soft mutex" scoped to a data center
//! - [`status`]: the per-node repair status record and the gating checks
//! - [`plan`]: obtaining the ordered command plan from the external planner
//! - [`runner`]: sequential plan execution with an explicit failure policy
//! - [`scheduler`]: the single per-invocation state traversal, and reset
//! - [`topology`]: local identity and the one-time namespace bootstrap
//! - [`cluster`]: cluster-wide status snapshots for the dashboard
//!
//! The lease only offers probabilistic mutual exclusion: it assumes that
//! replication converges within the configured settle delay.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cluster;
pub mod config;
pub mod error;
pub mod lease;
pub mod plan;
pub mod records;
pub mod runner;
pub mod scheduler;
pub mod status;
pub mod store;
pub mod topology;

pub use cluster::{ClusterSnapshot, ClusterStatusAggregator, Severity, Thresholds};
pub use config::{CoordinatorConfig, DashboardConfig};
pub use error::{RepairError, Result};
pub use lease::{Lease, LeaseCoordinator, LeaseOutcome};
pub use plan::{PlanError, Planner, RangeRepairPlanner, RepairPlan, RepairStep};
pub use records::{RecordKey, RepairStatus, StatusRecord, StepOutcome};
pub use runner::{RunReport, ShellExecutor, StepExecutor, StepFailurePolicy};
pub use scheduler::{Invocation, SchedulerDriver, SchedulerOutcome, SchedulerState, SkipReason};
pub use status::{Eligibility, StatusTracker};
pub use store::{Consistency, RecordStore, StoreError};
