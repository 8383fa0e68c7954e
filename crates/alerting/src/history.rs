//! Alert history and daily dedup keys
//!
//! Records are bucketed by `<threat_type>_<YYYY-MM-DD>` (UTC). ISO dates sort
//! lexicographically in calendar order, which retention pruning relies on.

use crate::AlertError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};

/// Default retention window in days
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// UTC calendar day of an instant, `YYYY-MM-DD`
pub fn iso_day(instant: DateTime<Utc>) -> String {
    instant.date_naive().format("%Y-%m-%d").to_string()
}

/// Dedup key for a threat type on the UTC day containing `instant`
pub fn day_key(threat_type: &str, instant: DateTime<Utc>) -> String {
    format!("{}_{}", threat_type, iso_day(instant))
}

/// Day component of a key; threat types may themselves contain underscores
pub fn key_day(key: &str) -> Option<&str> {
    key.rsplit_once('_').map(|(_, day)| day)
}

/// Oldest day kept by a prune at `now`. Windows reaching past the earliest
/// representable date keep everything.
pub fn retention_cutoff(retention_days: u32, now: DateTime<Utc>) -> String {
    let oldest = now
        .checked_sub_signed(Duration::days(i64::from(retention_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    iso_day(oldest)
}

/// One dispatched alert wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub key: String,
    /// Dispatch instant
    pub timestamp: DateTime<Utc>,
    pub threat_type: String,
    pub confidence: f64,
    pub recipients_notified: usize,
}

impl AlertRecord {
    pub fn new(
        threat_type: &str,
        now: DateTime<Utc>,
        confidence: f64,
        recipients_notified: usize,
    ) -> Self {
        Self {
            key: day_key(threat_type, now),
            timestamp: now,
            threat_type: threat_type.to_string(),
            confidence,
            recipients_notified,
        }
    }

    pub fn day(&self) -> &str {
        key_day(&self.key).unwrap_or_default()
    }
}

/// Storage for dispatched alerts.
///
/// `record` must be an atomic create-if-absent on the key: when two callers
/// race, exactly one succeeds and the other gets [`AlertError::DuplicateAlert`].
/// Stores shared between processes must provide this with a conditional put.
#[async_trait]
pub trait AlertHistoryStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<AlertRecord>, AlertError>;

    async fn record(
        &self,
        threat_type: &str,
        now: DateTime<Utc>,
        confidence: f64,
        recipients_notified: usize,
    ) -> Result<AlertRecord, AlertError>;

    /// Records in insertion order, optionally filtered by threat type prefix
    async fn history(&self, threat_type_prefix: Option<&str>)
        -> Result<Vec<AlertRecord>, AlertError>;

    /// Delete records whose day is strictly older than `now - retention_days`.
    /// Returns the number of removed records.
    async fn prune(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize, AlertError>;

    async fn clear(&self) -> Result<(), AlertError>;

    async fn has_alerted(&self, threat_type: &str, now: DateTime<Utc>) -> Result<bool, AlertError> {
        Ok(self.get(&day_key(threat_type, now)).await?.is_some())
    }
}

/// Process-local history
pub struct InMemoryAlertHistory {
    records: Mutex<Vec<AlertRecord>>,
}

impl InMemoryAlertHistory {
    pub fn new() -> Self {
        info!("Creating in-memory alert history");
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AlertRecord>>, AlertError> {
        self.records
            .lock()
            .map_err(|e| AlertError::Store(format!("Lock error: {}", e)))
    }
}

impl Default for InMemoryAlertHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertHistoryStore for InMemoryAlertHistory {
    async fn get(&self, key: &str) -> Result<Option<AlertRecord>, AlertError> {
        Ok(self.lock()?.iter().find(|r| r.key == key).cloned())
    }

    async fn record(
        &self,
        threat_type: &str,
        now: DateTime<Utc>,
        confidence: f64,
        recipients_notified: usize,
    ) -> Result<AlertRecord, AlertError> {
        let record = AlertRecord::new(threat_type, now, confidence, recipients_notified);

        // Check and insert under one lock.
        let mut records = self.lock()?;
        if records.iter().any(|r| r.key == record.key) {
            return Err(AlertError::DuplicateAlert { key: record.key });
        }
        records.push(record.clone());

        debug!("Recorded alert {}", record.key);
        Ok(record)
    }

    async fn history(
        &self,
        threat_type_prefix: Option<&str>,
    ) -> Result<Vec<AlertRecord>, AlertError> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|r| threat_type_prefix.map_or(true, |p| r.threat_type.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn prune(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize, AlertError> {
        let cutoff = retention_cutoff(retention_days, now);
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| r.day() >= cutoff.as_str());
        Ok(before - records.len())
    }

    async fn clear(&self) -> Result<(), AlertError> {
        self.lock()?.clear();
        Ok(())
    }
}
