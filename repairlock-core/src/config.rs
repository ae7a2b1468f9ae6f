use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::Consistency;

/// Twenty days, the historical default for both the stale-run window and
/// the cool-down between completed runs.
const TWENTY_DAYS_SECS: u64 = 3_600 * 24 * 20;

/// Immutable knobs handed to every coordination component at construction.
///
/// All fields carry defaults so a deployment only has to override what it
/// cares about.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Store namespace (key prefix) holding the mutex and status records.
    pub namespace: String,
    /// TTL of a mutex record. Must outlive the mutex write, the settle
    /// delay, the verify read, the peer re-check and the `Started` write.
    pub mutex_ttl_secs: u64,
    /// TTL applied to `Started` and per-step status writes; a run whose
    /// record has not been refreshed within this window is considered stale.
    pub status_ttl_secs: u64,
    /// TTL applied to the final `Completed` write; the minimum spacing
    /// between two completed runs of the same node.
    pub cooldown_ttl_secs: u64,
    /// Pause between the mutex write and the verifying re-read (ms).
    pub settle_delay_ms: u64,
    /// Upper bound for any single store call (ms).
    pub store_timeout_ms: u64,
    /// Consistency used for mutex and status writes.
    pub write_consistency: Consistency,
    /// Consistency used for the post-settle mutex re-read.
    pub verify_consistency: Consistency,
    /// Consistency used for the eligibility reads.
    pub read_consistency: Consistency,
    /// Stop the plan at the first failing step instead of carrying on.
    pub abort_on_step_failure: bool,
    /// Number of step outcomes kept in the status record history.
    pub history_limit: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            namespace: "operations".to_string(),
            mutex_ttl_secs: 60,
            status_ttl_secs: TWENTY_DAYS_SECS,
            cooldown_ttl_secs: TWENTY_DAYS_SECS,
            settle_delay_ms: 5_000,
            store_timeout_ms: 10_000,
            write_consistency: Consistency::Quorum,
            verify_consistency: Consistency::One,
            read_consistency: Consistency::Quorum,
            abort_on_step_failure: false,
            history_limit: 16,
        }
    }
}

impl CoordinatorConfig {
    pub fn mutex_ttl(&self) -> Duration {
        Duration::from_secs(self.mutex_ttl_secs)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn cooldown_ttl(&self) -> Duration {
        Duration::from_secs(self.cooldown_ttl_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Worst-case time from the start of the mutex write until `Started`
    /// is committed: the mutex write, the settle delay, the verify read,
    /// the peer re-check and the `Started` write itself.
    pub fn lease_critical_path(&self) -> Duration {
        self.settle_delay() + self.store_timeout() * 4
    }

    /// Guard rails that make the lease meaningful. Returns a human readable
    /// description of the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("namespace must not be empty".into());
        }
        if self.status_ttl_secs == 0 || self.cooldown_ttl_secs == 0 {
            return Err("status and cool-down TTLs must be non-zero".into());
        }
        if self.history_limit == 0 {
            return Err("history_limit must be at least 1".into());
        }
        if self.mutex_ttl() <= self.lease_critical_path() {
            return Err(format!(
                "mutex TTL ({}s) must exceed settle delay plus four store timeouts ({}ms)",
                self.mutex_ttl_secs,
                self.lease_critical_path().as_millis()
            ));
        }
        Ok(())
    }
}

/// Tuning for the watch/dashboard mode.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    /// Initial refresh cadence (seconds); adjustable at runtime.
    pub poll_interval_secs: u64,
    /// Elapsed time since the last status write after which an in-flight
    /// run is highlighted as a warning.
    pub warn_after_secs: u64,
    /// Elapsed time after which an in-flight run is shown as critical.
    pub critical_after_secs: u64,
    /// Number of status records fetched per page of the cluster scan.
    pub scan_page_size: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            warn_after_secs: 2 * 3_600,
            critical_after_secs: 4 * 3_600,
            scan_page_size: 500,
        }
    }
}

impl DashboardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn thresholds(&self) -> crate::cluster::Thresholds {
        crate::cluster::Thresholds {
            warn_after: Duration::from_secs(self.warn_after_secs),
            critical_after: Duration::from_secs(self.critical_after_secs),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1".into());
        }
        if self.scan_page_size == 0 {
            return Err("scan_page_size must be at least 1".into());
        }
        if self.warn_after_secs >= self.critical_after_secs {
            return Err("warn_after_secs must be lower than critical_after_secs".into());
        }
        Ok(())
    }
}
