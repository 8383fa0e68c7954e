//! Notifier capability

use crate::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub success: bool,
    pub message_id: String,
    /// Gateway-reported status, e.g. `queued`
    pub status: String,
}

/// Message transport (SMS gateway, logger, test double)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message to one destination
    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, TransportError>;

    /// Notifier name for logs
    fn name(&self) -> &str;
}

/// Message captured by [`LogNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub destination: String,
    pub body: String,
    pub message_id: String,
}

/// Dry-run notifier: logs instead of sending and keeps an outbox
#[derive(Debug, Default)]
pub struct LogNotifier {
    outbox: Mutex<Vec<OutboxEntry>>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far
    pub fn outbox(&self) -> Vec<OutboxEntry> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.outbox.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, TransportError> {
        let message_id = format!("dry-{}", Uuid::new_v4());
        info!(
            "[dry-run] SMS to {} ({} chars), id {}",
            destination,
            body.chars().count(),
            message_id
        );

        let mut outbox = self
            .outbox
            .lock()
            .map_err(|e| TransportError::Network(format!("Lock error: {}", e)))?;
        outbox.push(OutboxEntry {
            destination: destination.to_string(),
            body: body.to_string(),
            message_id: message_id.clone(),
        });

        Ok(SendReceipt {
            success: true,
            message_id,
            status: "logged".to_string(),
        })
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_outbox() {
        let notifier = LogNotifier::new();

        let receipt = notifier.send("+15551234567", "hello").await.unwrap();
        assert!(receipt.success);
        assert!(receipt.message_id.starts_with("dry-"));

        let outbox = notifier.outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].destination, "+15551234567");
        assert_eq!(outbox[0].message_id, receipt.message_id);
    }
}
