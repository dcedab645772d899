//! Crate-level error types for `kiln-kernel`.
//!
//! Provides a unified [`KernelError`] composing errors from every
//! sub-module together with [`error_stack::Report`] for context-carrying
//! propagation through the host's startup path.

use thiserror::Error;

/// Crate-level error type for `kiln-kernel`.
///
/// Wraps each sub-module's typed error via `#[from]` so the `?` operator
/// converts them automatically.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A configuration-related error.
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A scene-graph error.
    #[error("Scene error: {0}")]
    Scene(#[from] crate::scene::SceneError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal / untyped error described by a message string.
    #[error("{0}")]
    Internal(String),
}

/// Result alias carrying an [`error_stack::Report`] for attached context.
pub type KernelResult<T> = error_stack::Result<T, KernelError>;
