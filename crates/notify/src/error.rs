//! Notification Error Types

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a notifier while delivering a single message
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Gateway credentials are missing
    #[error("SMS gateway not configured: {0}")]
    NotConfigured(String),

    /// Destination could not be turned into a deliverable address
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Gateway answered but refused the message
    #[error("Gateway rejected message (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Request never completed
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }
}

impl From<PhoneError> for TransportError {
    fn from(err: PhoneError) -> Self {
        TransportError::InvalidDestination(err.to_string())
    }
}

/// Recipient directory failures
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    InvalidPhone(#[from] PhoneError),
}

/// Phone number validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("Phone number is empty")]
    Empty,

    #[error("Phone number {number} has {digits} digits, expected 10-15")]
    InvalidLength { number: String, digits: usize },
}

/// Errors surfaced by the fan-out layer
#[derive(Debug, Clone, Error)]
pub enum NotifyError {
    /// Target missing, unverified, or opted out of alerts
    #[error("Recipient {0} not found or not eligible for alerts")]
    RecipientNotEligible(Uuid),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
