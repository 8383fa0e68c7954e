//! Threat processing routes

use alerting::{AlertRecord, InputData, Prediction, ProcessingReport, ThreatData, ThreatStatus};
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use notify::SendReceipt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{ApiResult, AppState};

/// Prediction batch from the model service
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub predictions: HashMap<String, Prediction>,
    #[serde(alias = "inputData")]
    pub input_data: InputData,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    pub results: ProcessingReport,
}

/// Evaluate predictions and send any due alerts
pub async fn process(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    info!("Processing threat predictions from API");
    let results = state
        .evaluator
        .process_threat_predictions(&request.predictions, &request.input_data)
        .await?;

    Ok(Json(ProcessResponse {
        success: true,
        message: "Threat processing complete".to_string(),
        results,
    }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub threat_status: BTreeMap<String, ThreatStatus>,
    pub alert_history: Vec<AlertRecord>,
    pub timestamp: DateTime<Utc>,
}

/// Today's alert state per threat type plus the retained history
pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let threat_status = state.evaluator.current_threat_status().await?;
    let alert_history = state.evaluator.alert_history(None).await?;

    Ok(Json(StatusResponse {
        success: true,
        threat_status,
        alert_history,
        timestamp: state.clock.now(),
    }))
}

/// Targeted test alert request
#[derive(Debug, Deserialize)]
pub struct TestAlertRequest {
    pub recipient_id: Uuid,
    pub threat_type: String,
}

#[derive(Debug, Serialize)]
pub struct TestAlertResponse {
    pub success: bool,
    pub message: String,
    pub result: SendReceipt,
}

/// Send the sample threat to one recipient, ignoring daily dedup
pub async fn test_alert(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestAlertRequest>,
) -> ApiResult<Json<TestAlertResponse>> {
    let result = state
        .evaluator
        .send_personalized_threat_alert(
            request.recipient_id,
            &request.threat_type,
            &ThreatData::test_sample(),
        )
        .await?;

    Ok(Json(TestAlertResponse {
        success: true,
        message: "Test threat alert sent successfully".to_string(),
        result,
    }))
}
