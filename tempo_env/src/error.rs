//! Error types for the Tempo environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvError {
    /// Fixed step must be a finite, positive number of seconds
    #[error("Invalid fixed step: {0}s")]
    InvalidStepRate(f64),
    
    /// A pacer must be allowed at least one step per frame
    #[error("Invalid catch-up budget: {0} steps per frame")]
    InvalidCatchUp(u32),
}
