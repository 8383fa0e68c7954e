//! Threat Evaluator
//!
//! Turns prediction batches into at most one alert wave per threat type per
//! UTC day.

use crate::clock::Clock;
use crate::config::{ThreatConfig, ThreatConfigRegistry, ThreatConfigUpdate};
use crate::history::{day_key, AlertHistoryStore, AlertRecord, DEFAULT_RETENTION_DAYS};
use crate::payload::{build_payload, InputData, ThreatData, DEFAULT_LOCATION};
use crate::report::*;
use crate::AlertError;
use chrono::{DateTime, Utc};
use metrics::counter;
use notify::{NotificationFanOut, SendReceipt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Days of alert history to keep (default: 7)
    pub retention_days: u32,
    /// Location used when input data names none
    pub default_location: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }
}

/// Threat evaluation and alert dispatch
pub struct ThreatEvaluator {
    registry: Arc<ThreatConfigRegistry>,
    history: Arc<dyn AlertHistoryStore>,
    fanout: Arc<NotificationFanOut>,
    clock: Arc<dyn Clock>,
    config: EvaluatorConfig,
    /// Serialises evaluations so check-then-record cannot interleave
    evaluation_lock: Mutex<()>,
}

impl ThreatEvaluator {
    pub fn new(
        registry: Arc<ThreatConfigRegistry>,
        history: Arc<dyn AlertHistoryStore>,
        fanout: Arc<NotificationFanOut>,
        clock: Arc<dyn Clock>,
        config: EvaluatorConfig,
    ) -> Self {
        info!("Creating threat evaluator with config: {:?}", config);
        Self {
            registry,
            history,
            fanout,
            clock,
            config,
            evaluation_lock: Mutex::new(()),
        }
    }

    /// Evaluate a prediction batch, alerting for each actionable threat type
    /// not yet alerted today.
    pub async fn process_threat_predictions(
        &self,
        predictions: &HashMap<String, Prediction>,
        input: &InputData,
    ) -> Result<ProcessingReport, AlertError> {
        let _guard = self.evaluation_lock.lock().await;
        let now = self.clock.now();
        let mut report = ProcessingReport::new(now);

        info!("Processing {} threat predictions", predictions.len());

        for (threat_type, config) in self.registry.list_all()? {
            let Some(prediction) = predictions.get(&threat_type) else {
                continue;
            };

            if !prediction.is_actionable(config.threshold) {
                debug!(
                    "{} not actionable: {:?} at {} (threshold {})",
                    threat_type, prediction.status, prediction.confidence, config.threshold
                );
                continue;
            }

            report.threats_detected.push(DetectedThreat {
                threat_type: threat_type.clone(),
                confidence: prediction.confidence,
                level: prediction.level.clone(),
                threshold: config.threshold,
            });

            self.alert_once(&threat_type, &config, prediction, input, now, &mut report)
                .await;
        }

        match self.history.prune(self.config.retention_days, now).await {
            Ok(0) => {}
            Ok(removed) => {
                counter!("blueguard_history_pruned_total").increment(removed as u64);
                info!("Pruned {} old alert records", removed);
            }
            Err(e) => warn!("Alert history prune failed: {}", e),
        }

        info!(
            "Threat processing complete: {} threats, {} alerts sent, {} skipped",
            report.threats_detected.len(),
            report.alerts_sent.len(),
            report.alerts_skipped.len()
        );
        Ok(report)
    }

    async fn alert_once(
        &self,
        threat_type: &str,
        config: &ThreatConfig,
        prediction: &Prediction,
        input: &InputData,
        now: DateTime<Utc>,
        report: &mut ProcessingReport,
    ) {
        let key = day_key(threat_type, now);

        match self.history.get(&key).await {
            Ok(None) => {}
            Ok(Some(prior)) => {
                debug!("{} already alerted today ({})", threat_type, key);
                push_skip(
                    report,
                    skipped(threat_type, REASON_ALREADY_ALERTED, Some(prior), None),
                );
                return;
            }
            Err(e) => {
                error!("Failed to read alert history for {}: {}", key, e);
                push_skip(
                    report,
                    skipped(threat_type, REASON_READ_FAILED, None, Some(e.to_string())),
                );
                return;
            }
        }

        let payload = build_payload(
            threat_type,
            config,
            prediction.confidence,
            input,
            &self.config.default_location,
            now,
        );

        let outcome = match self.fanout.dispatch_to_all(&payload, &HashSet::new()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to send {} alert: {}", threat_type, e);
                push_skip(
                    report,
                    skipped(threat_type, REASON_SEND_FAILED, None, Some(e.to_string())),
                );
                return;
            }
        };

        // History is written only when at least one recipient was reached,
        // so a later call on the same day can retry.
        if !outcome.success || outcome.success_count == 0 {
            let reason = match outcome.message.as_deref() {
                Some(message) if !outcome.success => message.to_string(),
                _ => REASON_ALL_FAILED.to_string(),
            };
            warn!("{} alert not delivered: {}", threat_type, reason);
            push_skip(report, skipped(threat_type, &reason, None, None));
            return;
        }

        match self
            .history
            .record(threat_type, now, prediction.confidence, outcome.success_count)
            .await
        {
            Ok(record) => {
                info!(
                    "Threat alert sent for {} to {} recipients",
                    threat_type, record.recipients_notified
                );
                report.alerts_sent.push(SentAlert {
                    threat_type: threat_type.to_string(),
                    recipients_notified: record.recipients_notified,
                    message_id: outcome.first_message_id().map(str::to_string),
                });
                counter!("blueguard_alerts_sent_total", "threat_type" => threat_type.to_string())
                    .increment(1);
            }
            Err(AlertError::DuplicateAlert { key }) => {
                // Another instance sharing the store recorded first.
                warn!("{} recorded concurrently, treating as already alerted", key);
                let prior = self.history.get(&key).await.ok().flatten();
                push_skip(
                    report,
                    skipped(threat_type, REASON_ALREADY_ALERTED, prior, None),
                );
            }
            Err(e) => {
                error!("Alert for {} sent but not recorded: {}", threat_type, e);
                push_skip(
                    report,
                    skipped(threat_type, REASON_RECORD_FAILED, None, Some(e.to_string())),
                );
            }
        }
    }

    /// Per-type alert state for the current UTC day
    pub async fn current_threat_status(
        &self,
    ) -> Result<BTreeMap<String, ThreatStatus>, AlertError> {
        let now = self.clock.now();
        let mut status = BTreeMap::new();

        for (threat_type, config) in self.registry.list_all()? {
            let last_alert = self.history.get(&day_key(&threat_type, now)).await?;
            status.insert(
                threat_type,
                ThreatStatus {
                    has_alerted_today: last_alert.is_some(),
                    last_alert,
                    config,
                },
            );
        }
        Ok(status)
    }

    /// Retained records, optionally limited to one threat type
    pub async fn alert_history(
        &self,
        threat_type: Option<&str>,
    ) -> Result<Vec<AlertRecord>, AlertError> {
        self.history.history(threat_type).await
    }

    pub async fn clear_alert_history(&self) -> Result<(), AlertError> {
        self.history.clear().await?;
        info!("Alert history cleared");
        Ok(())
    }

    /// Fails with `UnknownThreatType` rather than silently ignoring the call
    pub fn update_threat_config(
        &self,
        threat_type: &str,
        update: ThreatConfigUpdate,
    ) -> Result<ThreatConfig, AlertError> {
        self.registry.update(threat_type, update)
    }

    pub fn threat_configs(&self) -> Result<BTreeMap<String, ThreatConfig>, AlertError> {
        self.registry.list_all()
    }

    /// Send one alert to one recipient, bypassing dedup. Writes no history.
    pub async fn send_personalized_threat_alert(
        &self,
        recipient_id: Uuid,
        threat_type: &str,
        threat: &ThreatData,
    ) -> Result<SendReceipt, AlertError> {
        let config = self.registry.get(threat_type)?;
        let payload = build_payload(
            threat_type,
            &config,
            threat.confidence,
            &threat.input_data,
            &self.config.default_location,
            self.clock.now(),
        );

        let receipt = self.fanout.dispatch_to_one(recipient_id, &payload).await?;
        info!("Personalized {} alert sent to {}", threat_type, recipient_id);
        Ok(receipt)
    }
}

fn push_skip(report: &mut ProcessingReport, alert: SkippedAlert) {
    counter!("blueguard_alerts_skipped_total", "threat_type" => alert.threat_type.clone())
        .increment(1);
    report.alerts_skipped.push(alert);
}

fn skipped(
    threat_type: &str,
    reason: &str,
    prior_record: Option<AlertRecord>,
    error: Option<String>,
) -> SkippedAlert {
    SkippedAlert {
        threat_type: threat_type.to_string(),
        reason: reason.to_string(),
        prior_record,
        error,
    }
}
