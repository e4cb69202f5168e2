//! Harness error type.

use tempo_core::TimelineError;
use tempo_env::EnvError;
use thiserror::Error;

/// Errors raised while building or driving a simulated world.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}
