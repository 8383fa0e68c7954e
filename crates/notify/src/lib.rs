//! Alert Notification
//!
//! SMS delivery for coastal threat alerts:
//! - Notifier capability (Twilio-compatible gateway, dry-run logger)
//! - E.164 phone number normalisation
//! - Recipient directory with eligibility filtering
//! - Per-recipient fan-out with isolated failures

mod directory;
mod error;
mod fanout;
mod message;
mod notifier;
pub mod phone;
mod sms;

pub use directory::{InMemoryRecipients, NewRecipient, Recipient, RecipientDirectory};
pub use error::{DirectoryError, NotifyError, PhoneError, TransportError};
pub use fanout::{FanOutResult, NotificationFanOut, RecipientResult, NO_RECIPIENTS_MESSAGE};
pub use message::{AlertPayload, AlertTemplate, Severity};
pub use notifier::{LogNotifier, Notifier, OutboxEntry, SendReceipt};
pub use sms::{SmsGatewayConfig, SmsGatewayNotifier};
