//! Error type shared by every layer of the engine.
//!
//! Only configuration and input problems surface as errors. Geometric dead ends inside the
//! ray tracer (no valid reflection point, a path below the signal threshold) are not errors;
//! they simply shrink the candidate path set.

use thiserror::Error;

/// Errors produced by the coverage engine and its collaborators.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Nothing could be computed: no grid point or no usable transmitter.
    #[error("Calculation failed: {0}")]
    CalculationFailed(String),

    /// The room model lacks the walls or bounds needed for a prediction.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Malformed transmitter, frequency or engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller aborted the computation; partial results were discarded.
    #[error("Computation cancelled")]
    Cancelled,

    /// Scene or config file could not be read or parsed.
    #[error("Failed to load {path}: {message}")]
    SceneLoad { path: String, message: String },
}

impl CoverageError {
    /// True for the error kinds a caller should answer with the simplified
    /// free-space estimate instead of aborting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoverageError::CalculationFailed(_) | CoverageError::InsufficientData(_) | CoverageError::InvalidConfiguration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoverageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(CoverageError::CalculationFailed("x".into()).is_recoverable());
        assert!(CoverageError::InsufficientData("x".into()).is_recoverable());
        assert!(CoverageError::InvalidConfiguration("x".into()).is_recoverable());
        assert!(!CoverageError::Cancelled.is_recoverable());
    }
}
