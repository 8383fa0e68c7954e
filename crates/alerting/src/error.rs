//! Alerting Error Types

use notify::NotifyError;
use thiserror::Error;

/// Errors from the alerting core
#[derive(Debug, Clone, Error)]
pub enum AlertError {
    /// Threat type not present in the registry
    #[error("Unknown threat type: {0}")]
    UnknownThreatType(String),

    /// Threshold outside [0, 1]
    #[error("Threshold {0} is out of range [0, 1]")]
    InvalidThreshold(f64),

    /// A record already exists for this threat/day key
    #[error("Alert already recorded for {key}")]
    DuplicateAlert { key: String },

    /// History backend failure
    #[error("Alert history store error: {0}")]
    Store(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}
