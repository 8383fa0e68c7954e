//! SQLite alert history

use crate::StorageError;
use alerting::{
    day_key, iso_day, retention_cutoff, AlertError, AlertHistoryStore, AlertRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    threat_type TEXT NOT NULL,
    day TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL,
    confidence REAL NOT NULL,
    recipients_notified INTEGER NOT NULL
)";

const SELECT_COLUMNS: &str =
    "SELECT key, threat_type, timestamp_ms, confidence, recipients_notified FROM alert_history";

fn store_error(err: sqlx::Error) -> AlertError {
    AlertError::Store(err.to_string())
}

/// Alert history in a SQLite database
#[derive(Clone)]
pub struct SqliteAlertHistory {
    pool: SqlitePool,
}

impl SqliteAlertHistory {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite://alerts.db` or `sqlite::memory:`
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::InvalidUrl(e.to_string()))?
            .create_if_missing(true);

        let pool = Self::pool_options(url).connect_with(options).await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened SQLite alert history at {}", url);
        Ok(store)
    }

    fn pool_options(url: &str) -> SqlitePoolOptions {
        if url.contains(":memory:") {
            // An in-memory database lives and dies with its one connection,
            // so that connection must never be reaped.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alert_history_day ON alert_history (day)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<AlertRecord, AlertError> {
        let timestamp_ms: i64 = row.try_get("timestamp_ms").map_err(store_error)?;
        let recipients: i64 = row.try_get("recipients_notified").map_err(store_error)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .ok_or_else(|| AlertError::Store(format!("Invalid timestamp: {}", timestamp_ms)))?;

        Ok(AlertRecord {
            key: row.try_get("key").map_err(store_error)?,
            timestamp,
            threat_type: row.try_get("threat_type").map_err(store_error)?,
            confidence: row.try_get("confidence").map_err(store_error)?,
            recipients_notified: usize::try_from(recipients).unwrap_or(0),
        })
    }
}

#[async_trait]
impl AlertHistoryStore for SqliteAlertHistory {
    async fn get(&self, key: &str) -> Result<Option<AlertRecord>, AlertError> {
        let row = sqlx::query(&format!("{} WHERE key = ?1", SELECT_COLUMNS))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn record(
        &self,
        threat_type: &str,
        now: DateTime<Utc>,
        confidence: f64,
        recipients_notified: usize,
    ) -> Result<AlertRecord, AlertError> {
        let key = day_key(threat_type, now);
        let result = sqlx::query(
            "INSERT INTO alert_history \
             (key, threat_type, day, timestamp_ms, confidence, recipients_notified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(key) DO NOTHING",
        )
        .bind(&key)
        .bind(threat_type)
        .bind(iso_day(now))
        .bind(now.timestamp_millis())
        .bind(confidence)
        .bind(i64::try_from(recipients_notified).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        if result.rows_affected() == 0 {
            return Err(AlertError::DuplicateAlert { key });
        }

        debug!("Recorded alert {}", key);
        Ok(AlertRecord {
            key,
            timestamp: now,
            threat_type: threat_type.to_string(),
            confidence,
            recipients_notified,
        })
    }

    async fn history(
        &self,
        threat_type_prefix: Option<&str>,
    ) -> Result<Vec<AlertRecord>, AlertError> {
        let rows = match threat_type_prefix {
            // substr rather than LIKE: threat types contain '_' wildcards
            Some(prefix) => sqlx::query(&format!(
                "{} WHERE substr(threat_type, 1, length(?1)) = ?1 ORDER BY id",
                SELECT_COLUMNS
            ))
            .bind(prefix)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(&format!("{} ORDER BY id", SELECT_COLUMNS))
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(store_error)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn prune(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize, AlertError> {
        let cutoff = retention_cutoff(retention_days, now);
        let result = sqlx::query("DELETE FROM alert_history WHERE day < ?1")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() as usize)
    }

    async fn clear(&self) -> Result<(), AlertError> {
        sqlx::query("DELETE FROM alert_history")
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    async fn store() -> SqliteAlertHistory {
        SqliteAlertHistory::connect("sqlite::memory:").await.unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_its_connection() {
        let store = store().await;
        let options = store.pool.options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_min_connections(), 1);
        assert!(options.get_idle_timeout().is_none());
        assert!(options.get_max_lifetime().is_none());

        let file = SqliteAlertHistory::pool_options("sqlite://alerts.db");
        assert_eq!(file.get_max_connections(), 5);
        assert!(file.get_idle_timeout().is_some());
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let store = store().await;
        let record = store.record("ALGAL_BLOOM", at(3, 7), 0.66, 12).await.unwrap();
        assert_eq!(record.key, "ALGAL_BLOOM_2024-09-03");

        let loaded = store.get(&record.key).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(store.has_alerted("ALGAL_BLOOM", at(3, 23)).await.unwrap());
        assert!(!store.has_alerted("ALGAL_BLOOM", at(4, 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_conditional_insert() {
        let store = store().await;
        store.record("CYCLONE", at(3, 7), 0.8, 4).await.unwrap();

        let err = store.record("CYCLONE", at(3, 18), 0.95, 7).await.unwrap_err();
        assert!(matches!(err, AlertError::DuplicateAlert { .. }));

        let history = store.history(None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].recipients_notified, 4);
    }

    #[tokio::test]
    async fn test_shared_database_single_winner() {
        let dir = std::env::temp_dir().join(format!("blueguard-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let url = format!("sqlite://{}", dir.join("shared.db").display());

        let a = SqliteAlertHistory::connect(&url).await.unwrap();
        let b = SqliteAlertHistory::connect(&url).await.unwrap();
        a.clear().await.unwrap();

        let first = a.record("EROSION", at(5, 9), 0.7, 2).await;
        let second = b.record("EROSION", at(5, 10), 0.7, 3).await;
        assert!(first.is_ok());
        assert!(matches!(second, Err(AlertError::DuplicateAlert { .. })));

        drop((a, b));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_prefix_filter_is_literal() {
        let store = store().await;
        store.record("SEA_LEVEL", at(1, 1), 0.9, 1).await.unwrap();
        store.record("SEAXLEVEL", at(1, 1), 0.9, 1).await.unwrap();
        store.record("CYCLONE", at(1, 1), 0.9, 1).await.unwrap();

        let filtered = store.history(Some("SEA_")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].threat_type, "SEA_LEVEL");

        let order: Vec<_> = store
            .history(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.threat_type)
            .collect();
        assert_eq!(order, vec!["SEA_LEVEL", "SEAXLEVEL", "CYCLONE"]);
    }

    #[tokio::test]
    async fn test_prune_and_clear() {
        let store = store().await;
        let now = at(20, 12);
        store.record("EROSION", now - Duration::days(8), 0.7, 1).await.unwrap();
        store.record("CYCLONE", now - Duration::days(7), 0.7, 1).await.unwrap();
        store.record("SEA_LEVEL", now, 0.9, 1).await.unwrap();

        assert_eq!(store.prune(7, now).await.unwrap(), 1);
        let remaining: Vec<_> = store
            .history(None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.threat_type)
            .collect();
        assert_eq!(remaining, vec!["CYCLONE", "SEA_LEVEL"]);

        store.clear().await.unwrap();
        assert!(store.history(None).await.unwrap().is_empty());
    }
}
