//! Error types for the experiment controller.

use crate::engine::EngineError;
use thiserror::Error;

/// Errors raised while planning, running or recording an experiment.
#[derive(Debug, Error)]
pub enum Error {
    /// Nonsensical geometry, sweep or protocol configuration.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The simulation engine failed or rejected a command during a run.
    #[error("Engine communication failed: {0}")]
    EngineCommunication(#[from] EngineError),

    /// The measurement window produced nothing to reduce.
    #[error("Degenerate measurement for {vehicle_count} vehicles: {reason}")]
    MeasurementDegenerate {
        vehicle_count: usize,
        reason: String,
    },

    /// A run within a sweep failed; the sweep was aborted.
    #[error("Run with {vehicle_count} vehicles failed: {source}")]
    RunFailed {
        vehicle_count: usize,
        #[source]
        source: Box<Error>,
    },

    /// The configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The chart could not be rendered.
    #[error("Chart rendering failed: {0}")]
    Chart(String),
}

/// Result type for experiment operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub(crate) fn degenerate(vehicle_count: usize, reason: impl Into<String>) -> Self {
        Self::MeasurementDegenerate {
            vehicle_count,
            reason: reason.into(),
        }
    }
}
