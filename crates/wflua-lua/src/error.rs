//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while bootstrapping or running scripts.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Interpreter error.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// None of the entrypoint candidates exists.
    #[error("No entrypoint in {}: tried {}", dir.display(), tried.join(", "))]
    NoEntrypoint { dir: PathBuf, tried: Vec<String> },

    /// A script failed to load or run.
    #[error("Failed to run script '{name}': {message}")]
    LoadError { name: String, message: String },

    /// Invalid runtime configuration.
    #[error("Invalid runtime configuration: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
