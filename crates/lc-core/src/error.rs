//! Error types for larcal

use thiserror::Error;

/// larcal error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (bad configuration, malformed input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// A statistic was requested on a distribution with no positive weight.
    #[error("empty distribution: {0}")]
    EmptyDistribution(String),

    /// Two histograms with different axis definitions were combined.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The truncated mean did not settle within the iteration cap.
    #[error("truncated mean did not converge after {iterations} iterations (last shift {last_shift:.3e})")]
    ConvergenceFailure {
        /// Iterations performed.
        iterations: usize,
        /// Absolute change of the mean in the final iteration.
        last_shift: f64,
    },

    /// A named object or input batch is absent.
    #[error("missing input: {0}")]
    MissingInput(String),
}

impl Error {
    /// Whether this error should only skip the current slice/group/batch.
    ///
    /// Everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EmptyDistribution(_)
                | Error::ShapeMismatch(_)
                | Error::ConvergenceFailure { .. }
                | Error::MissingInput(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(Error::EmptyDistribution("slice".into()).is_recoverable());
        assert!(Error::MissingInput("group_0".into()).is_recoverable());
        assert!(Error::ConvergenceFailure { iterations: 100, last_shift: 1.0 }.is_recoverable());
        assert!(!Error::Validation("bins".into()).is_recoverable());
    }

    #[test]
    fn convergence_message_mentions_iterations() {
        let e = Error::ConvergenceFailure { iterations: 7, last_shift: 0.5 };
        assert!(e.to_string().contains("7 iterations"));
    }
}
