//! Locating and parsing the configuration file.
//!
//! Evaluation order:
//! 1) an explicit path (`--config`),
//! 2) `$REPAIRLOCK_CONFIG_PATH`,
//! 3) `repairlock.toml` or `config/repairlock.toml` under the search root,
//! 4) built-in defaults.
//!
//! `.env` files are applied first so the environment variable can come from
//! one. Files may be TOML or JSON.

pub mod error;
pub mod store_url;

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::models::{Config, ConfigSource};
use error::ConfigLoadError;

pub const CONFIG_PATH_ENV: &str = "REPAIRLOCK_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["repairlock.toml", "config/repairlock.toml"];

/// A parsed configuration and where it was read from.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub source: ConfigSource,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    env_path: Option<PathBuf>,
    search_root: Option<PathBuf>,
    read_dotenv: bool,
}

impl ConfigLoader {
    /// Loader reading `$REPAIRLOCK_CONFIG_PATH` and `.env`, searching the
    /// working directory.
    pub fn from_env() -> Self {
        Self {
            explicit_path: None,
            env_path: None,
            search_root: None,
            read_dotenv: true,
        }
    }

    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    /// Overrides the `$REPAIRLOCK_CONFIG_PATH` lookup.
    pub fn with_env_path(mut self, path: Option<PathBuf>) -> Self {
        self.env_path = path;
        self
    }

    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        if self.read_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!(path = %path.display(), "loaded .env"),
                Err(err) if err.not_found() => {}
                Err(err) => debug!(error = %err, "ignoring unreadable .env"),
            }
        }

        if let Some(path) = &self.explicit_path {
            let config = load_from_file(path)?;
            return Ok(ConfigLoad {
                config,
                source: ConfigSource::Explicit(path.clone()),
            });
        }

        if let Some(path) = self.env_path.clone().or_else(env_config_path) {
            let config = load_from_file(&path)?;
            return Ok(ConfigLoad {
                config,
                source: ConfigSource::EnvPath(path),
            });
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok(ConfigLoad {
                config,
                source: ConfigSource::File(path),
            });
        }

        Ok(ConfigLoad {
            config: Config::default(),
            source: ConfigSource::Default,
        })
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let root = self.search_root.clone().unwrap_or_default();
        CANDIDATES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.is_file())
    }
}

fn env_config_path() -> Option<PathBuf> {
    env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

pub fn load_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
            origin,
            toml: "not attempted".into(),
            json: err.to_string(),
        }),
        Some("toml") => toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
            origin,
            toml: err.to_string(),
            json: "not attempted".into(),
        }),
        _ => parse_from_str(&contents, &origin),
    }
}

/// Tries TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<Config, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Parse {
            origin: origin.to_string(),
            toml: toml_err.to_string(),
            json: json_err.to_string(),
        })
    })
}
