//! Records persisted in the shared store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const STARTED: &str = "Started";
const COMPLETED: &str = "Completed";

/// Identity of a node inside a data center; the key of both record kinds.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordKey {
    pub nodename: String,
    pub data_center: String,
}

impl RecordKey {
    pub fn new(nodename: impl Into<String>, data_center: impl Into<String>) -> Self {
        Self {
            nodename: nodename.into(),
            data_center: data_center.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.nodename, self.data_center)
    }
}

/// "I am attempting to hold the repair lease for my data center."
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MutexRecord {
    pub nodename: String,
    pub data_center: String,
    pub written_at: DateTime<Utc>,
}

impl MutexRecord {
    pub fn new(key: &RecordKey) -> Self {
        Self {
            nodename: key.nodename.clone(),
            data_center: key.data_center.clone(),
            written_at: Utc::now(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.nodename.clone(), self.data_center.clone())
    }
}

/// Lifecycle value of a status record. An absent record is `None` at the
/// call sites; the step label is whatever the external planner emitted.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RepairStatus {
    Started,
    Step(String),
    Completed,
}

impl RepairStatus {
    pub fn label(&self) -> &str {
        match self {
            RepairStatus::Started => STARTED,
            RepairStatus::Step(label) => label,
            RepairStatus::Completed => COMPLETED,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RepairStatus::Completed)
    }

    /// True for every value that means "a run is in flight".
    pub fn is_active(&self) -> bool {
        !self.is_completed()
    }

    /// Labels that name a lifecycle value and so cannot name a step.
    pub fn is_reserved(label: &str) -> bool {
        label == STARTED || label == COMPLETED
    }
}

impl From<String> for RepairStatus {
    fn from(label: String) -> Self {
        match label.as_str() {
            STARTED => RepairStatus::Started,
            COMPLETED => RepairStatus::Completed,
            _ => RepairStatus::Step(label),
        }
    }
}

impl From<&str> for RepairStatus {
    fn from(label: &str) -> Self {
        RepairStatus::from(label.to_string())
    }
}

impl From<RepairStatus> for String {
    fn from(status: RepairStatus) -> Self {
        match status {
            RepairStatus::Step(label) => label,
            other => other.label().to_string(),
        }
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one executed plan step, kept in the status history.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    /// `None` when the command could not be spawned or was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Per-node lifecycle record of a repair run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub nodename: String,
    pub data_center: String,
    #[serde(rename = "repair_status")]
    pub status: RepairStatus,
    pub written_at: DateTime<Utc>,
    pub run_id: Uuid,
    #[serde(default)]
    pub history: Vec<StepOutcome>,
}

impl StatusRecord {
    pub fn started(key: &RecordKey) -> Self {
        Self {
            nodename: key.nodename.clone(),
            data_center: key.data_center.clone(),
            status: RepairStatus::Started,
            written_at: Utc::now(),
            run_id: Uuid::now_v7(),
            history: Vec::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.nodename.clone(), self.data_center.clone())
    }

    /// Moves the record to `status`, appending `outcome` and dropping the
    /// oldest history entries beyond `history_limit`.
    pub fn transition(
        &mut self,
        status: RepairStatus,
        outcome: Option<StepOutcome>,
        history_limit: usize,
    ) {
        self.status = status;
        self.written_at = Utc::now();
        if let Some(outcome) = outcome {
            self.history.push(outcome);
        }
        let overflow = self.history.len().saturating_sub(history_limit);
        if overflow > 0 {
            self.history.drain(..overflow);
        }
    }
}
