//! Prediction input and processing report types

use crate::config::ThreatConfig;
use crate::history::AlertRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Skip reason for a threat already alerted in the current UTC day
pub const REASON_ALREADY_ALERTED: &str = "Already alerted today";
/// Skip reason when every delivery in a fan-out failed
pub const REASON_ALL_FAILED: &str = "All deliveries failed";
/// Skip reason when the fan-out itself errored
pub const REASON_SEND_FAILED: &str = "Failed to send SMS";
/// Skip reason when the dedup lookup itself failed
pub const REASON_READ_FAILED: &str = "Failed to read alert history";
/// Skip reason when the alert went out but history could not be written
pub const REASON_RECORD_FAILED: &str = "Failed to record alert history";

/// Model verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PredictionStatus {
    Threat,
    Safe,
}

/// Model output for one threat type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub status: PredictionStatus,
    pub confidence: f64,
    /// Free-form label, e.g. `High`
    #[serde(default)]
    pub level: String,
}

impl Prediction {
    pub fn threat(confidence: f64) -> Self {
        Self {
            status: PredictionStatus::Threat,
            confidence,
            level: String::new(),
        }
    }

    pub fn safe(confidence: f64) -> Self {
        Self {
            status: PredictionStatus::Safe,
            confidence,
            level: String::new(),
        }
    }

    /// THREAT with confidence at or above the threshold
    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.status == PredictionStatus::Threat && self.confidence >= threshold
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectedThreat {
    pub threat_type: String,
    pub confidence: f64,
    pub level: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentAlert {
    pub threat_type: String,
    pub recipients_notified: usize,
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedAlert {
    pub threat_type: String,
    pub reason: String,
    /// Record that caused a dedup skip
    pub prior_record: Option<AlertRecord>,
    pub error: Option<String>,
}

/// Outcome of one evaluation call
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub threats_detected: Vec<DetectedThreat>,
    pub alerts_sent: Vec<SentAlert>,
    pub alerts_skipped: Vec<SkippedAlert>,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingReport {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            threats_detected: Vec::new(),
            alerts_sent: Vec::new(),
            alerts_skipped: Vec::new(),
            timestamp,
        }
    }
}

/// Today's alert state for one threat type
#[derive(Debug, Clone, Serialize)]
pub struct ThreatStatus {
    pub has_alerted_today: bool,
    pub last_alert: Option<AlertRecord>,
    pub config: ThreatConfig,
}
