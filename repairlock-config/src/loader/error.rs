use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read configuration from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {origin}: toml error: {toml}; json error: {json}")]
    Parse {
        origin: String,
        toml: String,
        json: String,
    },

    #[error("invalid store URL: {source}")]
    InvalidStoreUrl {
        #[source]
        source: url::ParseError,
    },

    #[error("store URL cannot carry the username `{username}`")]
    InvalidStoreUsername { username: String },

    #[error("store URL cannot carry a password")]
    InvalidStorePassword,

    #[error("failed to read secret file {path}: {source}")]
    SecretFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
