//! Engine-level errors.

use drift_ecs::EcsError;

/// Errors produced while configuring or driving the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("a system named '{name}' is already registered")]
    DuplicateSystem { name: String },

    #[error(transparent)]
    Ecs(#[from] EcsError),
}
