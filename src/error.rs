// Error types for simulation setup and the tick boundary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    /// Invalid initialization input; the simulation does not start.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config file error: {0}")]
    ConfigFile(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigYaml(#[from] serde_yaml::Error),

    #[error("config parse error: {0}")]
    ConfigJson(#[from] serde_json::Error),

    #[error("unsupported config format: {0} (expected .yaml, .yml or .json)")]
    ConfigFormat(String),

    /// A previous tick panicked and poisoned the shared state. Recoverable
    /// by re-running initialization (POST /reset).
    #[error("simulation state poisoned by a failed tick")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, SimError>;
