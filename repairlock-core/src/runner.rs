//! Sequential execution of a repair plan.

use std::{fmt, process::ExitStatus, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{process::Command, time::Instant};
use tracing::{debug, error, info, warn};

use crate::error::{RepairError, Result};
use crate::plan::{RepairPlan, RepairStep};
use crate::records::{RepairStatus, StatusRecord, StepOutcome};
use crate::status::StatusTracker;

/// What happened to one command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepExit {
    /// `None` when the process was killed by a signal or never started.
    pub code: Option<i32>,
    pub success: bool,
    /// Why the command could not be started, if it could not.
    pub spawn_error: Option<String>,
}

impl StepExit {
    pub fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
            spawn_error: None,
        }
    }

    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            success: false,
            spawn_error: Some(reason.into()),
        }
    }
}

/// Runs a single plan step to completion.
#[async_trait]
pub trait StepExecutor: Send + Sync + fmt::Debug {
    async fn run(&self, step: &RepairStep) -> StepExit;
}

/// Runs the step command through `sh -c` with inherited stdio.
#[derive(Clone, Debug, Default)]
pub struct ShellExecutor;

#[async_trait]
impl StepExecutor for ShellExecutor {
    async fn run(&self, step: &RepairStep) -> StepExit {
        debug!(step = %step.name, command = %step.command, "running repair step");
        match Command::new("sh").arg("-c").arg(&step.command).status().await {
            Ok(status) => StepExit::from_status(status),
            Err(err) => StepExit::not_started(err.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StepFailurePolicy {
    /// Log the failure and carry on with the next step.
    #[default]
    Continue,
    /// Stop the run at the first failing step.
    Abort,
}

impl StepFailurePolicy {
    pub fn from_abort_flag(abort_on_step_failure: bool) -> Self {
        if abort_on_step_failure {
            StepFailurePolicy::Abort
        } else {
            StepFailurePolicy::Continue
        }
    }
}

/// Outcome of a full plan execution.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunReport {
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|outcome| !outcome.success).count()
    }
}

#[derive(Clone)]
pub struct RepairRunner {
    tracker: StatusTracker,
    executor: Arc<dyn StepExecutor>,
    policy: StepFailurePolicy,
}

impl fmt::Debug for RepairRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepairRunner")
            .field("executor", &self.executor)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RepairRunner {
    pub fn new(
        tracker: StatusTracker,
        executor: Arc<dyn StepExecutor>,
        policy: StepFailurePolicy,
    ) -> Self {
        Self {
            tracker,
            executor,
            policy,
        }
    }

    /// Runs every step in order, recording progress in `record`, and marks
    /// the record `Completed` at the end.
    pub async fn execute(&self, plan: &RepairPlan, record: &mut StatusRecord) -> Result<RunReport> {
        let mut report = RunReport::default();
        // Each outcome is persisted together with the next status write.
        let mut pending: Option<StepOutcome> = None;

        for step in &plan.steps {
            self.tracker
                .advance(record, RepairStatus::Step(step.name.clone()), pending.take())
                .await;

            let started = Instant::now();
            let exit = self.executor.run(step).await;
            let outcome = StepOutcome {
                step: step.name.clone(),
                exit_code: exit.code,
                success: exit.success,
                duration_ms: started.elapsed().as_millis() as u64,
                finished_at: Utc::now(),
            };
            report.steps.push(outcome.clone());

            if exit.success {
                info!(step = %step.name, exit_code = ?exit.code, "repair step finished");
                pending = Some(outcome);
                continue;
            }

            let detail = match (&exit.spawn_error, exit.code) {
                (Some(reason), _) => format!("could not start: {reason}"),
                (None, Some(code)) => format!("exit code {code}"),
                (None, None) => "terminated by signal".to_string(),
            };
            match self.policy {
                StepFailurePolicy::Continue => {
                    warn!(
                        step = %step.name,
                        exit_code = ?exit.code,
                        %detail,
                        "repair step failed, continuing"
                    );
                    pending = Some(outcome);
                }
                StepFailurePolicy::Abort => {
                    error!(
                        step = %step.name,
                        exit_code = ?exit.code,
                        %detail,
                        "repair step failed, aborting"
                    );
                    let label = record.status.clone();
                    self.tracker.advance(record, label, Some(outcome)).await;
                    return Err(RepairError::StepFailed {
                        step: step.name.clone(),
                        detail,
                    });
                }
            }
        }

        self.tracker
            .advance(record, RepairStatus::Completed, pending.take())
            .await;
        info!(
            steps = report.steps.len(),
            failed = report.failed_steps(),
            "repair completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::records::RecordKey;
    use crate::store::{Consistency, MemoryStore, RecordStore};

    /// Executor returning canned exit codes and remembering the call order.
    #[derive(Debug, Default)]
    struct Scripted {
        codes: HashMap<String, i32>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepExecutor for Scripted {
        async fn run(&self, step: &RepairStep) -> StepExit {
            self.calls.lock().push(step.name.clone());
            let code = self.codes.get(&step.name).copied().unwrap_or(0);
            StepExit {
                code: Some(code),
                success: code == 0,
                spawn_error: None,
            }
        }
    }

    fn plan(names: &[&str]) -> RepairPlan {
        RepairPlan {
            steps: names
                .iter()
                .map(|name| RepairStep {
                    name: name.to_string(),
                    command: format!("repair {name}"),
                })
                .collect(),
        }
    }

    async fn setup(
        store: &MemoryStore,
        executor: Arc<Scripted>,
        policy: StepFailurePolicy,
    ) -> (RepairRunner, StatusRecord) {
        let tracker = StatusTracker::new(
            Arc::new(store.clone()),
            Arc::new(CoordinatorConfig::default()),
        );
        let record = tracker.start(&RecordKey::new("a", "dc1")).await.unwrap();
        (RepairRunner::new(tracker, executor, policy), record)
    }

    #[tokio::test]
    async fn steps_run_in_order_and_complete() {
        let store = MemoryStore::new();
        let executor = Arc::new(Scripted::default());
        let (runner, mut record) =
            setup(&store, executor.clone(), StepFailurePolicy::Continue).await;

        let report = runner.execute(&plan(&["r1", "r2", "r3"]), &mut record).await.unwrap();

        assert_eq!(*executor.calls.lock(), ["r1", "r2", "r3"]);
        assert_eq!(report.steps.len(), 3);
        let stored = store
            .status(&record.key(), Consistency::One)
            .await
            .unwrap()
            .expect("record persisted");
        assert_eq!(stored.status, RepairStatus::Completed);
        assert_eq!(stored.history.len(), 3);
    }

    #[tokio::test]
    async fn continue_policy_records_failures() {
        let store = MemoryStore::new();
        let executor = Arc::new(Scripted {
            codes: HashMap::from([("r2".to_string(), 2)]),
            ..Scripted::default()
        });
        let (runner, mut record) =
            setup(&store, executor.clone(), StepFailurePolicy::Continue).await;

        let report = runner.execute(&plan(&["r1", "r2", "r3"]), &mut record).await.unwrap();

        assert_eq!(executor.calls.lock().len(), 3);
        assert_eq!(report.failed_steps(), 1);
        assert_eq!(record.status, RepairStatus::Completed);
        assert_eq!(record.history[1].exit_code, Some(2));
        assert!(!record.history[1].success);
    }

    #[tokio::test]
    async fn abort_policy_stops_and_keeps_step_label() {
        let store = MemoryStore::new();
        let executor = Arc::new(Scripted {
            codes: HashMap::from([("r2".to_string(), 1)]),
            ..Scripted::default()
        });
        let (runner, mut record) = setup(&store, executor.clone(), StepFailurePolicy::Abort).await;

        let err = runner
            .execute(&plan(&["r1", "r2", "r3"]), &mut record)
            .await
            .expect_err("r2 fails");

        assert!(matches!(err, RepairError::StepFailed { ref step, .. } if step == "r2"));
        assert_eq!(*executor.calls.lock(), ["r1", "r2"]);
        let stored = store
            .status(&record.key(), Consistency::One)
            .await
            .unwrap()
            .expect("record persisted");
        assert_eq!(stored.status, RepairStatus::Step("r2".into()));
        assert_eq!(stored.history.last().and_then(|o| o.exit_code), Some(1));
    }

    #[tokio::test]
    async fn shell_executor_reports_exit_codes() {
        let exit = ShellExecutor
            .run(&RepairStep {
                name: "r1".into(),
                command: "exit 4".into(),
            })
            .await;
        assert_eq!(exit.code, Some(4));
        assert!(!exit.success);

        let exit = ShellExecutor
            .run(&RepairStep {
                name: "r2".into(),
                command: "true".into(),
            })
            .await;
        assert!(exit.success);
    }

    #[test]
    fn policy_follows_abort_flag() {
        assert_eq!(StepFailurePolicy::from_abort_flag(false), StepFailurePolicy::Continue);
        assert_eq!(StepFailurePolicy::from_abort_flag(true), StepFailurePolicy::Abort);
    }
}
