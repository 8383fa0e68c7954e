//! Alert payload construction from prediction context

use crate::config::ThreatConfig;
use chrono::{DateTime, Utc};
use notify::AlertPayload;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Sensor context supplied alongside predictions
pub type InputData = Map<String, Value>;

/// Fallback location when the input names none
pub const DEFAULT_LOCATION: &str = "Coastal Region";

/// Input fields checked for a location, first match wins
const LOCATION_FIELDS: [&str; 4] = ["LOCATION", "AREA", "REGION", "COORDINATES"];

/// (threat type, label, input field, unit suffix)
const ADDITIONAL_INFO: [(&str, &str, &str, &str); 4] = [
    ("ALGAL_BLOOM", "Chlorophyll Level", "CHLOROPHYLL MG_M3", " mg/m³"),
    ("CYCLONE", "Distance", "CYCLONE_DISTANCE_KM", " km"),
    ("EROSION", "Risk Index", "COASTAL EROSION_RISK", ""),
    ("SEA_LEVEL", "Current Level", "SEA_LEVEL_M", " m"),
];

/// Threat details for a targeted alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatData {
    pub confidence: f64,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub input_data: InputData,
}

impl ThreatData {
    /// Sample threat used for administrator test alerts
    pub fn test_sample() -> Self {
        let input = json!({
            "LOCATION": "Test Coastal Area",
            "CHLOROPHYLL MG_M3": 2.5,
            "CYCLONE_DISTANCE_KM": 150,
            "COASTAL EROSION_RISK": 75,
            "SEA_LEVEL_M": 1.2,
        });
        Self {
            confidence: 0.85,
            level: "High".to_string(),
            input_data: match input {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// Text form of a present, non-empty input value
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// First populated location field, or `default`
pub fn extract_location(input: &InputData, default: &str) -> String {
    LOCATION_FIELDS
        .iter()
        .find_map(|field| input.get(*field).and_then(text_value))
        .unwrap_or_else(|| default.to_string())
}

/// Per-threat reading line, `None` for types without one
pub fn additional_info(threat_type: &str, input: &InputData) -> Option<String> {
    ADDITIONAL_INFO
        .iter()
        .find(|(threat, ..)| *threat == threat_type)
        .map(|(_, label, field, unit)| {
            let reading = input
                .get(*field)
                .and_then(text_value)
                .unwrap_or_else(|| "N/A".to_string());
            format!("{}: {}{}", label, reading, unit)
        })
}

pub(crate) fn build_payload(
    threat_type: &str,
    config: &ThreatConfig,
    confidence: f64,
    input: &InputData,
    default_location: &str,
    now: DateTime<Utc>,
) -> AlertPayload {
    AlertPayload {
        threat_type: threat_type.to_string(),
        display_name: config.display_name.clone(),
        severity: config.severity,
        location: extract_location(input, default_location),
        recommendation: config.recommendation.clone(),
        confidence,
        timestamp: now,
        additional_info: additional_info(threat_type, input),
    }
}
