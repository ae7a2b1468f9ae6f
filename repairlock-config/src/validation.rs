//! Guard rails applied to a fully merged configuration (file plus CLI flags).

use thiserror::Error;

use crate::models::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigGuardRailError {
    #[error("coordinator: {0}")]
    Coordinator(String),

    #[error("dashboard: {0}")]
    Dashboard(String),

    #[error("store: {0}")]
    Store(String),

    #[error("planner: {0}")]
    Planner(String),
}

impl Config {
    /// Rejects settings under which the lease or the dashboard cannot work.
    pub fn validate(&self) -> Result<(), ConfigGuardRailError> {
        self.coordinator
            .validate()
            .map_err(ConfigGuardRailError::Coordinator)?;
        self.dashboard
            .validate()
            .map_err(ConfigGuardRailError::Dashboard)?;

        if self.store.url.trim().is_empty() {
            return Err(ConfigGuardRailError::Store("url must not be empty".into()));
        }
        if self.store.scan_count == 0 {
            return Err(ConfigGuardRailError::Store(
                "scan_count must be at least 1".into(),
            ));
        }
        if self.store.all_acks < self.store.quorum_acks {
            return Err(ConfigGuardRailError::Store(
                "all_acks must not be lower than quorum_acks".into(),
            ));
        }
        if self.planner.range_repair_tool.as_os_str().is_empty() {
            return Err(ConfigGuardRailError::Planner(
                "range_repair_tool must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn short_mutex_ttl_is_rejected() {
        let mut config = Config::default();
        config.coordinator.mutex_ttl_secs = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigGuardRailError::Coordinator(_))
        ));
    }

    #[test]
    fn ack_counts_must_be_ordered() {
        let mut config = Config::default();
        config.store.quorum_acks = 3;
        config.store.all_acks = 2;
        assert!(matches!(config.validate(), Err(ConfigGuardRailError::Store(_))));
    }
}
