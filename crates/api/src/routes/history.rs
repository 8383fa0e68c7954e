//! Alert history routes

use alerting::AlertRecord;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub threat_type: Option<String>,
    pub history: Vec<AlertRecord>,
    pub timestamp: DateTime<Utc>,
}

/// All retained alert records
pub async fn get_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<HistoryResponse>> {
    let history = state.evaluator.alert_history(None).await?;
    Ok(Json(HistoryResponse {
        success: true,
        threat_type: None,
        history,
        timestamp: state.clock.now(),
    }))
}

/// Records whose threat type starts with the path segment
pub async fn get_history_for(
    State(state): State<Arc<AppState>>,
    Path(threat_type): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let history = state.evaluator.alert_history(Some(&threat_type)).await?;
    Ok(Json(HistoryResponse {
        success: true,
        threat_type: Some(threat_type),
        history,
        timestamp: state.clock.now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> ApiResult<Json<ClearResponse>> {
    state.evaluator.clear_alert_history().await?;
    Ok(Json(ClearResponse {
        success: true,
        message: "Alert history cleared successfully".to_string(),
    }))
}
