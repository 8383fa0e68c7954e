//! Twilio-compatible SMS gateway

use crate::notifier::{Notifier, SendReceipt};
use crate::phone::normalize_e164;
use crate::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// SMS gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsGatewayConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number, E.164
    pub from_number: String,
    /// REST base URL (default: https://api.twilio.com)
    pub base_url: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for SmsGatewayConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            base_url: "https://api.twilio.com".to_string(),
            timeout_secs: 10,
        }
    }
}

impl SmsGatewayConfig {
    /// Whether all credentials are present
    pub fn is_complete(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Notifier delivering over a Twilio-compatible REST API
pub struct SmsGatewayNotifier {
    config: SmsGatewayConfig,
    client: reqwest::Client,
}

impl SmsGatewayNotifier {
    /// Create a notifier; fails if credentials are incomplete
    pub fn new(config: SmsGatewayConfig) -> Result<Self, TransportError> {
        if !config.is_complete() {
            return Err(TransportError::NotConfigured(
                "account_sid, auth_token and from_number are required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!("SMS gateway configured at {}", config.base_url);
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Notifier for SmsGatewayNotifier {
    async fn send(&self, destination: &str, body: &str) -> Result<SendReceipt, TransportError> {
        let to = normalize_e164(destination)?;
        debug!("Sending SMS to {} from {}", to, self.config.from_number);

        let params = [
            ("To", to.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GatewayErrorBody>()
                .await
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| status.to_string());
            warn!("SMS to {} rejected: {}", to, message);
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let message: MessageResponse = response.json().await?;
        info!("SMS sent to {} (sid {})", to, message.sid);

        Ok(SendReceipt {
            success: true,
            message_id: message.sid,
            status: message.status.unwrap_or_else(|| "queued".to_string()),
        })
    }

    fn name(&self) -> &str {
        "sms-gateway"
    }
}
