//! Threat configuration routes

use alerting::{ThreatConfig, ThreatConfigUpdate};
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ConfigsResponse {
    pub success: bool,
    pub configs: BTreeMap<String, ThreatConfig>,
    pub timestamp: DateTime<Utc>,
}

pub async fn get_configs(State(state): State<Arc<AppState>>) -> ApiResult<Json<ConfigsResponse>> {
    Ok(Json(ConfigsResponse {
        success: true,
        configs: state.evaluator.threat_configs()?,
        timestamp: state.clock.now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub message: String,
    pub config: ThreatConfig,
}

/// Merge a partial update into an existing threat type
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Path(threat_type): Path<String>,
    Json(update): Json<ThreatConfigUpdate>,
) -> ApiResult<Json<UpdateResponse>> {
    let config = state.evaluator.update_threat_config(&threat_type, update)?;
    Ok(Json(UpdateResponse {
        success: true,
        message: format!("Threat configuration updated for {}", threat_type),
        config,
    }))
}
