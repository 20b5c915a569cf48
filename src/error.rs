//! Error types for the layered cache
//!
//! Configuration and construction problems are errors. Per-key outcomes such as a
//! miss or a non-numeric counter are ordinary values (`None`, `Ok(false)`), never errors.

use thiserror::Error;

use crate::backends::BackendKind;

/// Result type alias using [`CacheError`]
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by tiers, the codec and the cache manager
#[derive(Error, Debug)]
pub enum CacheError {
    /// Non-positive TTL, wrongly typed option, or a disabled backend kind
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// Mandatory configuration keys absent at tier construction
    #[error("Missing mandatory configuration for {kind} tier: {}", keys.join(", "))]
    MissingConfiguration {
        kind: BackendKind,
        keys: Vec<String>,
    },

    /// The tier's server forbids a global flush from this client
    #[error("Clearing the whole {kind} cache is forbidden")]
    ClearAllDenied { kind: BackendKind },

    /// Handle could not be opened, or a command failed at the transport level
    #[error("{kind} connection failure: {message}")]
    Connection { kind: BackendKind, message: String },

    /// Stored text could not be turned back into a value (or vice versa)
    #[error("Codec error: {0}")]
    Codec(String),

    /// A stored entity names a type nobody registered for reconstruction
    #[error("No reconstruction registered for cacheable type '{type_name}'")]
    UnregisteredEntity { type_name: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CacheError {
    pub(crate) fn connection(kind: BackendKind, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            kind,
            message: err.to_string(),
        }
    }

    /// `true` for the expected "global flush forbidden" failure
    #[must_use]
    pub const fn is_clear_all_denied(&self) -> bool {
        matches!(self, Self::ClearAllDenied { .. })
    }
}
