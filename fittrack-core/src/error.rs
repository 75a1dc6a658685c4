//! Error types shared by the tracker and its collaborators.

use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Failures reported by a sensor or location source.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("Sensor hardware is not available")]
    Unavailable,

    #[error("Permission not granted")]
    PermissionDenied,
}

/// Errors surfaced by [`crate::ActivityTracker`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Location permission not granted")]
    PermissionDenied,

    /// A source refused a subscription because the hardware is missing.
    /// A missing step counter is tolerated during initialization, so in
    /// practice this comes from the location source.
    #[error("Sensor hardware not available on this device")]
    SensorUnavailable,

    #[error("Tracking has not been initialized")]
    NotInitialized,

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl From<SourceError> for TrackerError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable => TrackerError::SensorUnavailable,
            SourceError::PermissionDenied => TrackerError::PermissionDenied,
        }
    }
}
