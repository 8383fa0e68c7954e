//! Per-recipient alert fan-out

use crate::directory::{Recipient, RecipientDirectory};
use crate::message::{AlertPayload, AlertTemplate};
use crate::notifier::{Notifier, SendReceipt};
use crate::NotifyError;
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Message reported when nobody is eligible
pub const NO_RECIPIENTS_MESSAGE: &str = "No users to notify";

/// Delivery outcome for one recipient
#[derive(Debug, Clone, Serialize)]
pub struct RecipientResult {
    pub recipient_id: Uuid,
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate outcome of a fan-out
#[derive(Debug, Clone, Serialize)]
pub struct FanOutResult {
    /// False only when no recipient was eligible
    pub success: bool,
    pub message: Option<String>,
    pub total_recipients: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<RecipientResult>,
}

impl FanOutResult {
    fn no_recipients() -> Self {
        Self {
            success: false,
            message: Some(NO_RECIPIENTS_MESSAGE.to_string()),
            total_recipients: 0,
            success_count: 0,
            failed_count: 0,
            results: Vec::new(),
        }
    }

    /// Id of the first delivered message
    pub fn first_message_id(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.success)
            .and_then(|r| r.message_id.as_deref())
    }
}

/// Sends one logical alert to every eligible recipient
pub struct NotificationFanOut {
    directory: Arc<dyn RecipientDirectory>,
    notifier: Arc<dyn Notifier>,
    template: AlertTemplate,
}

impl NotificationFanOut {
    pub fn new(
        directory: Arc<dyn RecipientDirectory>,
        notifier: Arc<dyn Notifier>,
        template: AlertTemplate,
    ) -> Self {
        info!("Creating fan-out with notifier: {}", notifier.name());
        Self {
            directory,
            notifier,
            template,
        }
    }

    /// Eligible recipients, directory order, no duplicate ids
    pub async fn resolve_recipients(
        &self,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<Recipient>, NotifyError> {
        let mut seen = HashSet::new();
        let recipients = self
            .directory
            .eligible_recipients(exclude)
            .await?
            .into_iter()
            .filter(|r| r.is_eligible() && !exclude.contains(&r.id))
            .filter(|r| seen.insert(r.id))
            .collect();
        Ok(recipients)
    }

    /// Send the alert to every eligible recipient. A failed send never aborts
    /// the batch; it is counted in `failed_count`.
    pub async fn dispatch_to_all(
        &self,
        payload: &AlertPayload,
        exclude: &HashSet<Uuid>,
    ) -> Result<FanOutResult, NotifyError> {
        let recipients = self.resolve_recipients(exclude).await?;
        if recipients.is_empty() {
            warn!("No eligible recipients for {} alert", payload.threat_type);
            return Ok(FanOutResult::no_recipients());
        }

        let mut results = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let result = match self.send_to(recipient, payload).await {
                Ok(receipt) if receipt.success => RecipientResult {
                    recipient_id: recipient.id,
                    success: true,
                    message_id: Some(receipt.message_id),
                    error: None,
                },
                Ok(receipt) => RecipientResult {
                    recipient_id: recipient.id,
                    success: false,
                    message_id: Some(receipt.message_id),
                    error: Some(format!("Delivery status: {}", receipt.status)),
                },
                Err(e) => RecipientResult {
                    recipient_id: recipient.id,
                    success: false,
                    message_id: None,
                    error: Some(e.to_string()),
                },
            };

            if result.success {
                counter!("blueguard_sms_sent_total").increment(1);
            } else {
                counter!("blueguard_sms_failed_total").increment(1);
                warn!(
                    "Alert to {} failed: {}",
                    recipient.phone_number,
                    result.error.as_deref().unwrap_or("unknown")
                );
            }
            results.push(result);
        }

        let success_count = results.iter().filter(|r| r.success).count();
        info!(
            "{} alert sent to {}/{} recipients",
            payload.threat_type,
            success_count,
            recipients.len()
        );

        Ok(FanOutResult {
            success: true,
            message: None,
            total_recipients: recipients.len(),
            success_count,
            failed_count: recipients.len() - success_count,
            results,
        })
    }

    /// Targeted send, used for administrator test alerts
    pub async fn dispatch_to_one(
        &self,
        recipient_id: Uuid,
        payload: &AlertPayload,
    ) -> Result<SendReceipt, NotifyError> {
        let recipient = self
            .directory
            .find(recipient_id)
            .await?
            .filter(Recipient::is_eligible)
            .ok_or(NotifyError::RecipientNotEligible(recipient_id))?;

        let receipt = self.send_to(&recipient, payload).await?;
        if receipt.success {
            counter!("blueguard_sms_sent_total").increment(1);
        } else {
            counter!("blueguard_sms_failed_total").increment(1);
        }
        Ok(receipt)
    }

    async fn send_to(
        &self,
        recipient: &Recipient,
        payload: &AlertPayload,
    ) -> Result<SendReceipt, crate::TransportError> {
        let body = self.template.render(payload, &recipient.display_name);
        self.notifier.send(&recipient.phone_number, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryRecipients, NewRecipient};
    use crate::error::{DirectoryError, TransportError};
    use crate::message::Severity;
    use crate::notifier::LogNotifier;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Fails every destination listed in `failing`
    struct FlakyNotifier {
        failing: HashSet<String>,
        inner: LogNotifier,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, TransportError> {
            if self.failing.contains(destination) {
                return Err(TransportError::Network("connection reset".to_string()));
            }
            self.inner.send(destination, body).await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    /// Returns the same recipient twice
    struct DuplicatingDirectory(Recipient);

    #[async_trait]
    impl RecipientDirectory for DuplicatingDirectory {
        async fn eligible_recipients(
            &self,
            _exclude: &HashSet<Uuid>,
        ) -> Result<Vec<Recipient>, DirectoryError> {
            Ok(vec![self.0.clone(), self.0.clone()])
        }

        async fn find(&self, _id: Uuid) -> Result<Option<Recipient>, DirectoryError> {
            Ok(Some(self.0.clone()))
        }
    }

    fn payload() -> AlertPayload {
        AlertPayload {
            threat_type: "EROSION".to_string(),
            display_name: "Coastal Erosion".to_string(),
            severity: Severity::High,
            location: "Coastal Region".to_string(),
            recommendation: "Avoid coastal areas and monitor erosion rates".to_string(),
            confidence: 0.85,
            timestamp: Utc::now(),
            additional_info: Some("Risk Index: 75".to_string()),
        }
    }

    fn directory_with(count: usize) -> Arc<InMemoryRecipients> {
        let dir = Arc::new(InMemoryRecipients::new());
        for i in 0..count {
            dir.insert(NewRecipient {
                id: None,
                phone_number: format!("555123{:04}", i),
                display_name: format!("User {}", i),
                verified: true,
                alert_opt_in: true,
            })
            .unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_no_recipients() {
        let notifier = Arc::new(LogNotifier::new());
        let fanout = NotificationFanOut::new(
            directory_with(0),
            notifier.clone(),
            AlertTemplate::default(),
        );

        let result = fanout.dispatch_to_all(&payload(), &HashSet::new()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some(NO_RECIPIENTS_MESSAGE));
        assert_eq!(notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let failing: HashSet<String> = (0..3).map(|i| format!("+1555123{:04}", i)).collect();
        let notifier = Arc::new(FlakyNotifier {
            failing,
            inner: LogNotifier::new(),
        });
        let fanout =
            NotificationFanOut::new(directory_with(5), notifier.clone(), AlertTemplate::default());

        let result = fanout.dispatch_to_all(&payload(), &HashSet::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.total_recipients, 5);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failed_count, 3);
        assert_eq!(result.results.len(), 5);
        assert!(result.first_message_id().is_some());
        assert_eq!(notifier.inner.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_personalized_bodies_and_exclusion() {
        let dir = directory_with(3);
        let notifier = Arc::new(LogNotifier::new());
        let fanout = NotificationFanOut::new(dir.clone(), notifier.clone(), AlertTemplate::default());

        let all = fanout.resolve_recipients(&HashSet::new()).await.unwrap();
        let exclude: HashSet<Uuid> = [all[0].id].into_iter().collect();

        let result = fanout.dispatch_to_all(&payload(), &exclude).await.unwrap();
        assert_eq!(result.total_recipients, 2);

        let outbox = notifier.outbox();
        assert!(outbox[0].body.contains("Hi User 1,"));
        assert!(outbox[1].body.contains("Hi User 2,"));
    }

    #[tokio::test]
    async fn test_duplicates_removed() {
        let recipient = Recipient {
            id: Uuid::new_v4(),
            phone_number: "+15551234567".to_string(),
            display_name: String::new(),
            verified: true,
            alert_opt_in: true,
        };
        let notifier = Arc::new(LogNotifier::new());
        let fanout = NotificationFanOut::new(
            Arc::new(DuplicatingDirectory(recipient)),
            notifier.clone(),
            AlertTemplate::default(),
        );

        let result = fanout.dispatch_to_all(&payload(), &HashSet::new()).await.unwrap();
        assert_eq!(result.total_recipients, 1);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_to_one_eligibility() {
        let dir = directory_with(1);
        let notifier = Arc::new(LogNotifier::new());
        let fanout = NotificationFanOut::new(dir.clone(), notifier.clone(), AlertTemplate::default());
        let id = fanout.resolve_recipients(&HashSet::new()).await.unwrap()[0].id;

        let receipt = fanout.dispatch_to_one(id, &payload()).await.unwrap();
        assert!(receipt.success);

        dir.set_alert_opt_in(id, false);
        let err = fanout.dispatch_to_one(id, &payload()).await.unwrap_err();
        assert!(matches!(err, NotifyError::RecipientNotEligible(e) if e == id));

        let missing = Uuid::new_v4();
        let err = fanout.dispatch_to_one(missing, &payload()).await.unwrap_err();
        assert!(matches!(err, NotifyError::RecipientNotEligible(_)));
        assert_eq!(notifier.sent_count(), 1);
    }
}
