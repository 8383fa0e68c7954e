//! Threat Alerting
//!
//! Decides which threat predictions are actionable, enforces one alert wave
//! per threat type per UTC day, and keeps a pruned alert history.

mod clock;
mod config;
mod error;
mod evaluator;
mod history;
mod payload;
mod report;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{default_threat_configs, ThreatConfig, ThreatConfigRegistry, ThreatConfigUpdate};
pub use error::AlertError;
pub use evaluator::{EvaluatorConfig, ThreatEvaluator};
pub use history::{
    day_key, iso_day, key_day, retention_cutoff, AlertHistoryStore, AlertRecord,
    InMemoryAlertHistory, DEFAULT_RETENTION_DAYS,
};
pub use notify::Severity;
pub use payload::{additional_info, extract_location, InputData, ThreatData, DEFAULT_LOCATION};
pub use report::{
    DetectedThreat, Prediction, PredictionStatus, ProcessingReport, SentAlert, SkippedAlert,
    ThreatStatus, REASON_ALL_FAILED, REASON_ALREADY_ALERTED, REASON_READ_FAILED,
    REASON_RECORD_FAILED, REASON_SEND_FAILED,
};
