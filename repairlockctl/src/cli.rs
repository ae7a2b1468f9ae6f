use std::{path::PathBuf, time::Duration};

use clap::Parser;
use repairlock_config::{Config, LogLevel};

/// Schedules a repair on this node, at most one node per data center at a
/// time. Meant to be run periodically (e.g. hourly from cron).
#[derive(Parser, Debug, Default)]
#[command(name = "repairlockctl", version)]
pub struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name of this node (defaults to the system hostname)
    #[arg(short = 'H', long)]
    pub hostname: Option<String>,

    /// Data center this node belongs to
    #[arg(long)]
    pub data_center: Option<String>,

    /// Another data center of the cluster; repeat for several
    #[arg(long = "peer-data-center", value_name = "DC")]
    pub peer_data_centers: Vec<String>,

    /// Store URL, e.g. redis://store.internal:6379/0
    #[arg(long)]
    pub url: Option<String>,

    /// Read replica used for weak reads
    #[arg(long)]
    pub replica_url: Option<String>,

    /// Store username
    #[arg(short = 'U', long)]
    pub username: Option<String>,

    /// Store password (prompted for when a username is given without one)
    #[arg(short = 'P', long)]
    pub password: Option<String>,

    /// Namespace holding the mutex and status records
    #[arg(short = 'k', long)]
    pub namespace: Option<String>,

    /// Sets both the stale-run and the cool-down TTL, e.g. "20days"
    #[arg(short = 't', long, value_parser = humantime::parse_duration)]
    pub ttl: Option<Duration>,

    /// How long an unfinished run blocks the data center
    #[arg(long, value_parser = humantime::parse_duration)]
    pub status_ttl: Option<Duration>,

    /// Minimum spacing between two completed runs of this node
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cooldown_ttl: Option<Duration>,

    /// Lifetime of the mutex record
    #[arg(long, value_parser = humantime::parse_duration)]
    pub mutex_ttl: Option<Duration>,

    /// Pause between writing the mutex and verifying it
    #[arg(long, value_parser = humantime::parse_duration)]
    pub settle_delay: Option<Duration>,

    /// Tool that prints the repair plan in dry-run mode
    #[arg(short = 'r', long, value_name = "PATH")]
    pub range_repair_tool: Option<PathBuf>,

    /// Only repair ranges within the local data center
    #[arg(long)]
    pub local: bool,

    /// Stop at the first failing repair step
    #[arg(long)]
    pub abort_on_step_failure: bool,

    /// Show the cluster repair dashboard
    #[arg(long, conflicts_with = "reset")]
    pub watch: bool,

    /// Remove this node's mutex and status records
    #[arg(long)]
    pub reset: bool,

    /// Log at info level
    #[arg(short, long)]
    pub verbose: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub logfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Reset,
    Watch,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.watch {
            Mode::Watch
        } else if self.reset {
            Mode::Reset
        } else {
            Mode::Run
        }
    }

    /// Layers the flags that were given on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        let store = &mut config.store;
        if let Some(url) = &self.url {
            store.url = url.clone();
        }
        if let Some(url) = &self.replica_url {
            store.replica_url = Some(url.clone());
        }
        if let Some(username) = &self.username {
            store.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            store.password = Some(password.clone());
        }

        let node = &mut config.node;
        if let Some(hostname) = &self.hostname {
            node.hostname = Some(hostname.clone());
        }
        if let Some(dc) = &self.data_center {
            node.data_center = Some(dc.clone());
        }
        if !self.peer_data_centers.is_empty() {
            node.peer_data_centers = self.peer_data_centers.clone();
        }

        let coordinator = &mut config.coordinator;
        if let Some(namespace) = &self.namespace {
            coordinator.namespace = namespace.clone();
        }
        if let Some(ttl) = self.ttl {
            coordinator.status_ttl_secs = ttl.as_secs();
            coordinator.cooldown_ttl_secs = ttl.as_secs();
        }
        if let Some(ttl) = self.status_ttl {
            coordinator.status_ttl_secs = ttl.as_secs();
        }
        if let Some(ttl) = self.cooldown_ttl {
            coordinator.cooldown_ttl_secs = ttl.as_secs();
        }
        if let Some(ttl) = self.mutex_ttl {
            coordinator.mutex_ttl_secs = ttl.as_secs();
        }
        if let Some(delay) = self.settle_delay {
            coordinator.settle_delay_ms = delay.as_millis() as u64;
        }
        if self.abort_on_step_failure {
            coordinator.abort_on_step_failure = true;
        }

        if let Some(tool) = &self.range_repair_tool {
            config.planner.range_repair_tool = tool.clone();
        }
        if self.local {
            config.planner.local = true;
        }

        if self.debug {
            config.logging.level = LogLevel::Debug;
        } else if self.verbose {
            config.logging.level = config.logging.level.max(LogLevel::Info);
        }
        if let Some(path) = &self.logfile {
            config.logging.file = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("repairlockctl").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn ttl_flag_sets_both_ttls_and_specific_flags_win() {
        let cli = parse(&["-t", "2days", "--cooldown-ttl", "7days"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.coordinator.status_ttl_secs, 2 * 86_400);
        assert_eq!(config.coordinator.cooldown_ttl_secs, 7 * 86_400);
    }

    #[test]
    fn flags_override_file_values() {
        let cli = parse(&[
            "-H",
            "node-7",
            "--data-center",
            "dc2",
            "--peer-data-center",
            "dc1",
            "--peer-data-center",
            "dc3",
            "-k",
            "maintenance",
            "--settle-delay",
            "1500ms",
            "-r",
            "/opt/range_repair",
            "--local",
            "--abort-on-step-failure",
            "-v",
        ]);
        let mut config = Config::default();
        config.node.data_center = Some("dc-from-file".into());
        cli.apply(&mut config);

        assert_eq!(config.node.hostname.as_deref(), Some("node-7"));
        assert_eq!(config.node.data_center.as_deref(), Some("dc2"));
        assert_eq!(config.node.peer_data_centers, ["dc1", "dc3"]);
        assert_eq!(config.coordinator.namespace, "maintenance");
        assert_eq!(config.coordinator.settle_delay_ms, 1_500);
        assert!(config.coordinator.abort_on_step_failure);
        assert!(config.planner.local);
        assert_eq!(config.planner.range_repair_tool, PathBuf::from("/opt/range_repair"));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn untouched_flags_keep_file_values() {
        let cli = parse(&[]);
        let mut config = Config::default();
        config.coordinator.mutex_ttl_secs = 90;
        config.logging.level = LogLevel::Debug;
        cli.apply(&mut config);
        assert_eq!(config.coordinator.mutex_ttl_secs, 90);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(cli.mode(), Mode::Run);
    }

    #[test]
    fn watch_and_reset_are_exclusive() {
        assert!(Cli::try_parse_from(["repairlockctl", "--watch", "--reset"]).is_err());
        assert_eq!(parse(&["--reset"]).mode(), Mode::Reset);
        assert_eq!(parse(&["--watch"]).mode(), Mode::Watch);
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert!(Cli::try_parse_from(["repairlockctl", "--mutex-ttl", "soon"]).is_err());
    }
}
