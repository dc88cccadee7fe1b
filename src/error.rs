//! Error taxonomy for the Monte Carlo core.
//!
//! Divergence and inconsistency errors are fatal and never retried.
//! Errors raised by the external collaborators (path stepper, optical
//! properties, phase matrices, boundary radiance) are carried unchanged.

/// Error type returned by the collaborator traits in [`crate::medium`] and [`crate::path`].
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Centralized error type for a Monte Carlo run
#[derive(thiserror::Error, Debug)]
pub enum MonteCarloError {
    /// Path re-tracing exceeded the permitted number of stepper calls.
    #[error("divergence: {steps} path steps taken without reaching the cloud box boundary (limit {limit})")]
    Divergence { steps: usize, limit: usize },

    /// NaN values or mismatched array lengths between path, chain and optical data.
    #[error("numerical inconsistency: {0}")]
    Inconsistency(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MonteCarloError {
    pub fn inconsistency<T: ToString>(msg: T) -> Self {
        MonteCarloError::Inconsistency(msg.to_string())
    }

    pub fn invalid_settings<T: ToString>(msg: T) -> Self {
        MonteCarloError::InvalidSettings(msg.to_string())
    }
}

/// Result type alias for Monte Carlo operations
pub type MonteCarloResult<T> = Result<T, MonteCarloError>;
