//! Alert payload and SMS rendering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Threat severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        };
        f.write_str(label)
    }
}

/// Logical alert, rendered once per recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Registry key, e.g. `CYCLONE`
    pub threat_type: String,
    /// Human readable threat name
    pub display_name: String,
    pub severity: Severity,
    pub location: String,
    pub recommendation: String,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    /// Per-threat reading, e.g. `Distance: 150 km`
    pub additional_info: Option<String>,
}

impl AlertPayload {
    /// Confidence as a percentage with one decimal
    pub fn confidence_label(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// SMS template settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTemplate {
    /// Closing line, rendered as `- <signature>`
    pub signature: String,
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self {
            signature: "BlueGuard Team".to_string(),
        }
    }
}

impl AlertTemplate {
    /// Render the SMS body for one recipient
    pub fn render(&self, payload: &AlertPayload, recipient_name: &str) -> String {
        let mut body = String::from("🚨 COASTAL THREAT ALERT 🚨\n\n");

        let name = recipient_name.trim();
        if !name.is_empty() {
            body.push_str(&format!("Hi {},\n\n", name));
        }

        body.push_str(&format!("Type: {}\n", payload.display_name));
        body.push_str(&format!("Severity: {}\n", payload.severity));
        body.push_str(&format!("Location: {}\n", payload.location));
        body.push_str(&format!("Confidence: {}\n", payload.confidence_label()));
        body.push_str(&format!(
            "Time: {}\n",
            payload.timestamp.format("%Y-%m-%d %H:%M UTC")
        ));
        if let Some(info) = payload.additional_info.as_deref().filter(|i| !i.is_empty()) {
            body.push_str(info);
            body.push('\n');
        }

        body.push_str(&format!("\nRecommendation: {}\n\n", payload.recommendation));
        body.push_str("Stay safe and follow local authorities' instructions.\n\n");
        body.push_str(&format!("- {}", self.signature));
        body
    }
}
