//! Recipient Directory

use crate::phone::normalize_e164;
use crate::DirectoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Alert recipient as seen by the fan-out layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    /// E.164 phone number
    pub phone_number: String,
    pub display_name: String,
    /// Phone ownership confirmed
    pub verified: bool,
    /// Subscribed to threat alerts
    pub alert_opt_in: bool,
}

impl Recipient {
    /// Verified and opted in
    pub fn is_eligible(&self) -> bool {
        self.verified && self.alert_opt_in
    }
}

/// Recipient registration input
#[derive(Debug, Clone, Deserialize)]
pub struct NewRecipient {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub phone_number: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default = "default_opt_in")]
    pub alert_opt_in: bool,
}

fn default_opt_in() -> bool {
    true
}

/// Read access to the user directory
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Recipients that are verified, opted in, and not in `exclude`
    async fn eligible_recipients(
        &self,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<Recipient>, DirectoryError>;

    /// Point lookup by id
    async fn find(&self, id: Uuid) -> Result<Option<Recipient>, DirectoryError>;
}

/// In-memory directory
pub struct InMemoryRecipients {
    recipients: Mutex<Vec<Recipient>>,
}

impl InMemoryRecipients {
    pub fn new() -> Self {
        info!("Creating in-memory recipient directory");
        Self {
            recipients: Mutex::new(Vec::new()),
        }
    }

    /// Register a recipient, normalising the phone number. Re-registering an
    /// existing id replaces the entry in place.
    pub fn insert(&self, new: NewRecipient) -> Result<Recipient, DirectoryError> {
        let recipient = Recipient {
            id: new.id.unwrap_or_else(Uuid::new_v4),
            phone_number: normalize_e164(&new.phone_number)?,
            display_name: new.display_name,
            verified: new.verified,
            alert_opt_in: new.alert_opt_in,
        };

        let mut recipients = self
            .recipients
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock error: {}", e)))?;
        match recipients.iter_mut().find(|r| r.id == recipient.id) {
            Some(existing) => *existing = recipient.clone(),
            None => recipients.push(recipient.clone()),
        }
        debug!("Registered recipient {}", recipient.id);
        Ok(recipient)
    }

    /// Mark phone as verified; returns false if the id is unknown
    pub fn set_verified(&self, id: Uuid, verified: bool) -> bool {
        self.update(id, |r| r.verified = verified)
    }

    /// Change alert subscription; returns false if the id is unknown
    pub fn set_alert_opt_in(&self, id: Uuid, opt_in: bool) -> bool {
        self.update(id, |r| r.alert_opt_in = opt_in)
    }

    pub fn len(&self) -> usize {
        self.recipients.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Recipient)) -> bool {
        let Ok(mut recipients) = self.recipients.lock() else {
            return false;
        };
        match recipients.iter_mut().find(|r| r.id == id) {
            Some(recipient) => {
                apply(recipient);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> Result<Vec<Recipient>, DirectoryError> {
        self.recipients
            .lock()
            .map(|r| r.clone())
            .map_err(|e| DirectoryError::Unavailable(format!("Lock error: {}", e)))
    }
}

impl Default for InMemoryRecipients {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecipientDirectory for InMemoryRecipients {
    async fn eligible_recipients(
        &self,
        exclude: &HashSet<Uuid>,
    ) -> Result<Vec<Recipient>, DirectoryError> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|r| r.is_eligible() && !exclude.contains(&r.id))
            .collect())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Recipient>, DirectoryError> {
        Ok(self.snapshot()?.into_iter().find(|r| r.id == id))
    }
}
