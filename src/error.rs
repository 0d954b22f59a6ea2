use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Top-level error for the runner, aggregator and report writers.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Problems with the runner configuration. Fatal for the whole run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("repeat.count must be at least 1 (got {0})")]
    ZeroRepeat(u32),
}

/// Failures raised by backend implementations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("connection refused by {backend}: {reason}")]
    Connect { backend: String, reason: String },

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node already exists: {0}")]
    NodeExists(String),

    #[error("parent node missing for {0}")]
    MissingParent(String),

    #[error("invalid node path: {0:?}")]
    InvalidPath(String),

    #[error("operation not supported by {backend}: {operation}")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    #[error("storage IO error: {0}")]
    Io(#[from] io::Error),

    #[error("node encoding error: {0}")]
    Encoding(String),
}

/// Reasons a persisted run artifact is rejected during aggregation.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{path}: cannot read artifact: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: missing backend key '{key}'")]
    MissingBackend { path: PathBuf, key: &'static str },

    #[error("{path}:{line}: expected 'key=value'")]
    MalformedLine { path: PathBuf, line: usize },

    #[error("{path}:{line}: invalid duration {value:?} for operation '{operation}'")]
    InvalidDuration {
        path: PathBuf,
        line: usize,
        operation: String,
        value: String,
    },

    #[error("{path}:{line}: duplicate key '{key}'")]
    DuplicateKey {
        path: PathBuf,
        line: usize,
        key: String,
    },
}
