use thiserror::Error;

use crate::plan::PlanError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("store error while {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("repair planner failed: {0}")]
    Planner(#[from] PlanError),

    #[error("repair step `{step}` failed ({detail})")]
    StepFailed { step: String, detail: String },

    #[error("cluster topology unavailable: {0}")]
    Topology(String),
}

pub type Result<T> = std::result::Result<T, RepairError>;

/// Attaches the operation being performed to a raw store failure.
pub trait StoreContext<T> {
    fn during(self, operation: &'static str) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, StoreError> {
    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| RepairError::Store { operation, source })
    }
}
