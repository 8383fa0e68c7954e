//! BlueGuard API Server
//!
//! Administrative REST API over the threat evaluator: prediction intake,
//! alert status and history, threat configuration, and test alerts.

use alerting::{
    AlertHistoryStore, Clock, InMemoryAlertHistory, SystemClock, ThreatConfigRegistry,
    ThreatConfigUpdate, ThreatEvaluator,
};
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use notify::{InMemoryRecipients, LogNotifier, NotificationFanOut, Notifier, SmsGatewayNotifier};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteAlertHistory;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod error;
mod rate_limit;
mod routes;
pub mod settings;

pub use error::{ApiError, ApiResult};
pub use rate_limit::{create_governor_config, spawn_limiter_cleanup, RateLimitConfig};
pub use settings::{LoggingSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub evaluator: Arc<ThreatEvaluator>,
    /// Directory backing the fan-out, seeded from settings
    pub recipients: Arc<InMemoryRecipients>,
    pub clock: Arc<dyn Clock>,
    /// Name of the active notifier (`sms-gateway` or `log`)
    pub notifier: String,
    /// Prometheus handle, present once the recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        evaluator: Arc<ThreatEvaluator>,
        recipients: Arc<InMemoryRecipients>,
        clock: Arc<dyn Clock>,
        notifier: impl Into<String>,
    ) -> Self {
        Self {
            evaluator,
            recipients,
            clock,
            notifier: notifier.into(),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Wire the evaluator from settings.
///
/// Without complete SMS credentials alerts go to the log notifier; without a
/// database URL history lives in memory.
pub async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    settings.validate()?;

    let notifier: Arc<dyn Notifier> = match settings.sms.gateway_config() {
        Some(gateway) => Arc::new(SmsGatewayNotifier::new(gateway)?),
        None => {
            warn!("SMS gateway credentials not configured, alerts will only be logged");
            Arc::new(LogNotifier::new())
        }
    };

    let history: Arc<dyn AlertHistoryStore> = match &settings.storage.database_url {
        Some(url) => Arc::new(
            SqliteAlertHistory::connect(url)
                .await
                .with_context(|| format!("opening alert history at {}", url))?,
        ),
        None => {
            info!("No database configured, keeping alert history in memory");
            Arc::new(InMemoryAlertHistory::new())
        }
    };

    let registry = Arc::new(ThreatConfigRegistry::with_defaults());
    for (threat_type, threshold) in &settings.alerting.thresholds {
        // Environment sources lowercase map keys.
        let threat_type = threat_type.to_uppercase();
        registry
            .update(&threat_type, ThreatConfigUpdate::threshold(*threshold))
            .with_context(|| format!("applying threshold override for {}", threat_type))?;
    }

    let recipients = Arc::new(InMemoryRecipients::new());
    for recipient in &settings.recipients {
        recipients
            .insert(recipient.clone())
            .with_context(|| format!("seeding recipient {}", recipient.phone_number))?;
    }
    info!("Seeded {} recipients", recipients.len());

    let notifier_name = notifier.name().to_string();
    let fanout = Arc::new(NotificationFanOut::new(
        recipients.clone(),
        notifier,
        settings.alerting.template(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let evaluator = Arc::new(ThreatEvaluator::new(
        registry,
        history,
        fanout,
        clock.clone(),
        settings.alerting.evaluator_config(),
    ));

    Ok(AppState::new(evaluator, recipients, clock, notifier_name))
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub notifier: String,
    pub recipients: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/threats/process", post(routes::threats::process))
        .route("/api/v1/threats/status", get(routes::threats::status))
        .route("/api/v1/threats/test-alert", post(routes::threats::test_alert))
        .route(
            "/api/v1/threats/history",
            get(routes::history::get_history).delete(routes::history::clear_history),
        )
        .route(
            "/api/v1/threats/history/:threat_type",
            get(routes::history::get_history_for),
        )
        .route("/api/v1/threats/config", get(routes::config::get_configs))
        .route(
            "/api/v1/threats/config/:threat_type",
            put(routes::config::update_config),
        )
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "BlueGuard Threat Alerts".to_string(),
        version: state.version.clone(),
        timestamp: state.clock.now(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        notifier: state.notifier.clone(),
        recipients: state.recipients.len(),
    })
}

/// Prometheus text exposition
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

fn describe_metrics() {
    describe_counter!("blueguard_alerts_sent_total", "Alert waves sent, by threat type");
    describe_counter!(
        "blueguard_alerts_skipped_total",
        "Actionable threats not alerted, by threat type"
    );
    describe_counter!("blueguard_sms_sent_total", "Individual SMS deliveries");
    describe_counter!("blueguard_sms_failed_total", "Failed SMS deliveries");
    describe_counter!(
        "blueguard_history_pruned_total",
        "Alert history records removed by retention"
    );
}

/// Initialize logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .with_context(|| format!("invalid log level {:?}", settings.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
    } else {
        registry
            .with(fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
    }
}

/// Run the server
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
    describe_metrics();

    let state = Arc::new(build_state(&settings).await?.with_metrics(handle));
    let mut app = create_router(state);

    match create_governor_config(&settings.rate_limit) {
        Some(config) => {
            spawn_limiter_cleanup(&config, Duration::from_secs(60));
            app = app.layer(GovernorLayer { config });
        }
        None => warn!("Rate limiting disabled: invalid rate_limit settings"),
    }

    info!("Starting API server on {}", settings.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.server.bind_addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::FixedClock;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::TimeZone;
    use notify::{AlertTemplate, NewRecipient, Recipient};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        notifier: Arc<LogNotifier>,
        clock: Arc<FixedClock>,
        recipient: Recipient,
    }

    fn test_app() -> TestApp {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap(),
        ));
        let notifier = Arc::new(LogNotifier::new());
        let recipients = Arc::new(InMemoryRecipients::new());
        let recipient = recipients
            .insert(NewRecipient {
                id: None,
                phone_number: "(555) 010-2000".to_string(),
                display_name: "Dana".to_string(),
                verified: true,
                alert_opt_in: true,
            })
            .unwrap();

        let fanout = Arc::new(NotificationFanOut::new(
            recipients.clone(),
            notifier.clone(),
            AlertTemplate::default(),
        ));
        let evaluator = Arc::new(ThreatEvaluator::new(
            Arc::new(ThreatConfigRegistry::with_defaults()),
            Arc::new(InMemoryAlertHistory::new()),
            fanout,
            clock.clone(),
            Default::default(),
        ));
        let state = AppState::new(evaluator, recipients, clock.clone(), "log");

        TestApp {
            router: create_router(Arc::new(state)),
            notifier,
            clock,
            recipient,
        }
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn erosion_batch(confidence: f64) -> Value {
        json!({
            "predictions": {
                "EROSION": {"status": "THREAT", "confidence": confidence, "level": "High"}
            },
            "input_data": {"LOCATION": "Miami Beach", "COASTAL EROSION_RISK": 75}
        })
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let (status, body) = call(&app.router, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["notifier"], "log");
        assert_eq!(body["recipients"], 1);
    }

    #[tokio::test]
    async fn test_process_then_dedup() {
        let app = test_app();

        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/v1/threats/process",
            Some(erosion_batch(0.85)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["results"]["alerts_sent"][0]["threat_type"], "EROSION");
        assert_eq!(body["results"]["alerts_sent"][0]["recipients_notified"], 1);
        assert_eq!(app.notifier.sent_count(), 1);

        let (_, body) = call(
            &app.router,
            Method::POST,
            "/api/v1/threats/process",
            Some(erosion_batch(0.9)),
        )
        .await;
        assert_eq!(body["results"]["alerts_sent"].as_array().unwrap().len(), 0);
        assert_eq!(
            body["results"]["alerts_skipped"][0]["reason"],
            "Already alerted today"
        );
        assert_eq!(app.notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_camel_case_input_data() {
        let app = test_app();
        let request = json!({
            "predictions": {"CYCLONE": {"status": "THREAT", "confidence": 0.75}},
            "inputData": {"REGION": "Gulf Coast"}
        });

        let (status, body) =
            call(&app.router, Method::POST, "/api/v1/threats/process", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"]["alerts_sent"][0]["threat_type"], "CYCLONE");
        assert!(app.notifier.outbox()[0].body.contains("Gulf Coast"));
    }

    #[tokio::test]
    async fn test_status_and_history() {
        let app = test_app();
        call(
            &app.router,
            Method::POST,
            "/api/v1/threats/process",
            Some(erosion_batch(0.85)),
        )
        .await;

        let (status, body) = call(&app.router, Method::GET, "/api/v1/threats/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["threat_status"]["EROSION"]["has_alerted_today"], true);
        assert_eq!(body["threat_status"]["CYCLONE"]["has_alerted_today"], false);
        assert_eq!(body["alert_history"].as_array().unwrap().len(), 1);

        let (_, body) = call(
            &app.router,
            Method::GET,
            "/api/v1/threats/history/EROSION",
            None,
        )
        .await;
        assert_eq!(body["history"][0]["key"], "EROSION_2026-03-10");

        let (_, body) = call(
            &app.router,
            Method::GET,
            "/api/v1/threats/history/CYCLONE",
            None,
        )
        .await;
        assert!(body["history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_history_allows_realert() {
        let app = test_app();
        let uri = "/api/v1/threats/process";
        call(&app.router, Method::POST, uri, Some(erosion_batch(0.85))).await;

        let (status, body) =
            call(&app.router, Method::DELETE, "/api/v1/threats/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        call(&app.router, Method::POST, uri, Some(erosion_batch(0.85))).await;
        assert_eq!(app.notifier.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_next_day_alerts_again() {
        let app = test_app();
        let uri = "/api/v1/threats/process";
        call(&app.router, Method::POST, uri, Some(erosion_batch(0.85))).await;
        app.clock.advance(chrono::Duration::days(1));

        let (_, body) = call(&app.router, Method::POST, uri, Some(erosion_batch(0.85))).await;
        assert_eq!(body["results"]["alerts_sent"][0]["threat_type"], "EROSION");
        assert_eq!(app.notifier.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_update_config() {
        let app = test_app();

        let (status, body) = call(
            &app.router,
            Method::PUT,
            "/api/v1/threats/config/CYCLONE",
            Some(json!({"threshold": 0.9})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["threshold"], 0.9);

        let request = json!({
            "predictions": {"CYCLONE": {"status": "THREAT", "confidence": 0.75}},
            "input_data": {}
        });
        let (_, body) =
            call(&app.router, Method::POST, "/api/v1/threats/process", Some(request)).await;
        assert!(body["results"]["threats_detected"].as_array().unwrap().is_empty());
        assert_eq!(app.notifier.sent_count(), 0);

        let (_, body) = call(&app.router, Method::GET, "/api/v1/threats/config", None).await;
        assert_eq!(body["configs"]["CYCLONE"]["threshold"], 0.9);
        assert_eq!(body["configs"]["EROSION"]["threshold"], 0.5);
    }

    #[tokio::test]
    async fn test_update_config_errors() {
        let app = test_app();

        let (status, body) = call(
            &app.router,
            Method::PUT,
            "/api/v1/threats/config/TSUNAMI",
            Some(json!({"threshold": 0.5})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(
            &app.router,
            Method::PUT,
            "/api/v1/threats/config/EROSION",
            Some(json!({"threshold": 1.5})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_test_alert() {
        let app = test_app();
        let request = json!({
            "recipient_id": app.recipient.id,
            "threat_type": "ALGAL_BLOOM",
        });

        let (status, body) = call(
            &app.router,
            Method::POST,
            "/api/v1/threats/test-alert",
            Some(request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["success"], true);

        // Test alerts bypass dedup and leave no history.
        call(&app.router, Method::POST, "/api/v1/threats/test-alert", Some(request)).await;
        assert_eq!(app.notifier.sent_count(), 2);
        let outbox = app.notifier.outbox();
        assert_eq!(outbox[0].destination, "+15550102000");
        assert!(outbox[0].body.contains("Test Coastal Area"));

        let (_, body) = call(&app.router, Method::GET, "/api/v1/threats/history", None).await;
        assert!(body["history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_test_alert_errors() {
        let app = test_app();

        let (status, _) = call(
            &app.router,
            Method::POST,
            "/api/v1/threats/test-alert",
            Some(json!({"recipient_id": uuid::Uuid::new_v4(), "threat_type": "EROSION"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app.router,
            Method::POST,
            "/api/v1/threats/test-alert",
            Some(json!({"recipient_id": app.recipient.id, "threat_type": "TSUNAMI"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.notifier.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = test_app();
        let (status, _) = call(&app.router, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_build_state_from_settings() {
        let settings = Settings::from_toml(
            r#"
            [alerting.thresholds]
            cyclone = 0.95

            [[recipients]]
            phone_number = "555-010-3000"
            verified = true
            "#,
        )
        .unwrap();

        let state = build_state(&settings).await.unwrap();
        assert_eq!(state.notifier, "log");
        assert_eq!(state.recipients.len(), 1);
        let configs = state.evaluator.threat_configs().unwrap();
        assert_eq!(configs["CYCLONE"].threshold, 0.95);
    }

    #[tokio::test]
    async fn test_build_state_rejects_unknown_override() {
        let settings = Settings::from_toml(
            r#"
            [alerting.thresholds]
            TSUNAMI = 0.5
            "#,
        )
        .unwrap();
        assert!(build_state(&settings).await.is_err());
    }
}
