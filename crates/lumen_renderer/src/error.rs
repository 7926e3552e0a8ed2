//! Errors surfaced by the renderer.
//!
//! Only construction and startup can fail. Steady-state problems (a
//! panicking tile, a pool shut down underneath the manager) are logged and
//! recovered locally.

use lumen_core::ConfigError;
use thiserror::Error;

/// Errors that can occur while building or starting a renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Render manager was already started")]
    AlreadyStarted,
}

/// Result type for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;
