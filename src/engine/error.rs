//! Error definitions for the engine module

use thiserror::Error;

/// Error types for the command engines
#[derive(Debug, Error)]
pub enum EngineError {
    /// Settings rejected before an engine is built
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Error while managing a background task
    #[error("Thread error: {0}")]
    ThreadError(String),
}
