//! Typed configuration sections.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use repairlock_core::{CoordinatorConfig, DashboardConfig};
use serde::{Deserialize, Serialize};

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Passed explicitly (`--config`).
    Explicit(PathBuf),
    /// Named by `REPAIRLOCK_CONFIG_PATH`.
    EnvPath(PathBuf),
    /// Found in one of the well-known locations.
    File(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Default => None,
            ConfigSource::Explicit(path)
            | ConfigSource::EnvPath(path)
            | ConfigSource::File(path) => Some(path),
        }
    }
}

/// Complete configuration of one `repairlockctl` invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub node: NodeConfig,
    pub coordinator: CoordinatorConfig,
    pub planner: PlannerConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

/// Connection to the shared record store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Primary endpoint, e.g. `redis://store.internal:6379/0`.
    pub url: String,
    /// Optional read replica used for weak reads.
    pub replica_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// File holding the password; read when `password` is unset.
    pub password_file: Option<PathBuf>,
    /// Replica acknowledgements awaited for a quorum write. The default
    /// expects at least one replica; a standalone server needs `0`, and
    /// connecting fails when the primary reports fewer replicas.
    pub quorum_acks: usize,
    /// Replica acknowledgements awaited for an all-replica write.
    pub all_acks: usize,
    /// Upper bound for the replication wait of a single write (ms).
    pub wait_timeout_ms: u64,
    /// `SCAN` batch hint.
    pub scan_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            replica_url: None,
            username: None,
            password: None,
            password_file: None,
            quorum_acks: 1,
            all_acks: 2,
            wait_timeout_ms: 2_000,
            scan_count: 200,
        }
    }
}

impl StoreConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("replica_url", &self.replica_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_file", &self.password_file)
            .field("quorum_acks", &self.quorum_acks)
            .field("all_acks", &self.all_acks)
            .field("wait_timeout_ms", &self.wait_timeout_ms)
            .field("scan_count", &self.scan_count)
            .finish()
    }
}

/// Identity of the local node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Falls back to the system hostname when unset.
    pub hostname: Option<String>,
    /// The local data center. Required for every coordination call.
    pub data_center: Option<String>,
    /// Other data centers of the cluster, recorded in the namespace manifest.
    pub peer_data_centers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Executable that prints the repair plan in dry-run mode.
    pub range_repair_tool: PathBuf,
    /// Restrict the plan to the local data center.
    pub local: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            range_repair_tool: PathBuf::from("/usr/local/bin/range_repair.py"),
            local: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Write logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}
