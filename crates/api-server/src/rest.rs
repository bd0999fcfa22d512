//! REST API handlers for campaign automation and operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, warn};
use uuid::Uuid;

use leadflow_core::types::{Campaign, CampaignStats, Prospect};
use leadflow_core::EngineError;
use leadflow_engine::AutomationEngine;

/// Maximum string field length (campaign name, prospect names, etc.).
const MAX_FIELD_LEN: usize = 256;

/// Maximum prospects accepted in one import request.
const MAX_IMPORT_BATCH: usize = 1_000;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AutomationEngine,
    pub default_daily_limit: u32,
    pub start_time: Instant,
}

#[derive(Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub daily_limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct ProspectImport {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub company_name: String,
    pub job_title: String,
}

#[derive(Deserialize)]
pub struct AutomationRequest {
    pub campaign_id: Uuid,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub prospect_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct AutomationResponse {
    pub campaign_id: Uuid,
    pub running: bool,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: message.into(),
        }),
    )
}

fn engine_error(e: EngineError) -> ApiError {
    let (status, error) = match &e {
        EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        EngineError::Config(_) => (StatusCode::BAD_REQUEST, "configuration_error"),
        EngineError::StaleState { .. } | EngineError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "conflict")
        }
        _ => {
            error!(error = %e, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: e.to_string(),
        }),
    )
}

/// POST /api/campaigns — register a campaign with the engine.
pub async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    if request.name.is_empty() {
        return Err(bad_request("campaign 'name' must not be empty"));
    }
    if request.name.len() > MAX_FIELD_LEN {
        return Err(bad_request("campaign 'name' exceeds maximum length"));
    }
    let daily_limit = request.daily_limit.unwrap_or(state.default_daily_limit);
    if daily_limit == 0 {
        return Err(bad_request("'daily_limit' must be at least 1"));
    }

    let campaign = Campaign::new(request.name, request.description, daily_limit);
    let id = state.engine.store().insert_campaign(campaign);
    metrics::counter!("api.campaigns_created").increment(1);

    // The freshly inserted campaign is always present.
    state
        .engine
        .store()
        .campaign(&id)
        .map(Json)
        .ok_or_else(|| engine_error(EngineError::NotFound(format!("campaign {id}"))))
}

/// POST /api/campaigns/:id/prospects — prospect import feed.
pub async fn import_prospects(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(imports): Json<Vec<ProspectImport>>,
) -> Result<Json<ImportResponse>, ApiError> {
    if imports.is_empty() {
        return Err(bad_request("import batch must not be empty"));
    }
    if imports.len() > MAX_IMPORT_BATCH {
        return Err(bad_request("import batch exceeds maximum size"));
    }
    for import in &imports {
        if import.first_name.is_empty() || import.company_name.is_empty() {
            return Err(bad_request(
                "prospect 'first_name' and 'company_name' must not be empty",
            ));
        }
        if import.first_name.len() > MAX_FIELD_LEN
            || import.company_name.len() > MAX_FIELD_LEN
            || import.job_title.len() > MAX_FIELD_LEN
        {
            return Err(bad_request("prospect field exceeds maximum length"));
        }
    }

    let mut prospect_ids = Vec::with_capacity(imports.len());
    for import in imports {
        let prospect = Prospect::new(
            campaign_id,
            import.first_name,
            import.last_name,
            import.company_name,
            import.job_title,
        );
        let id = state.engine.enroll_prospect(prospect).map_err(engine_error)?;
        prospect_ids.push(id);
    }
    metrics::counter!("api.prospects_imported").increment(prospect_ids.len() as u64);

    Ok(Json(ImportResponse {
        imported: prospect_ids.len(),
        prospect_ids,
    }))
}

/// GET /api/campaigns/:id/prospects — ordered prospect listing.
pub async fn list_prospects(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<Vec<Prospect>>, ApiError> {
    if state.engine.store().campaign(&campaign_id).is_none() {
        return Err(engine_error(EngineError::NotFound(format!(
            "campaign {campaign_id}"
        ))));
    }
    Ok(Json(state.engine.store().prospects_for(&campaign_id)))
}

/// GET /api/campaigns/:id/stats — dashboard counters.
pub async fn campaign_stats(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignStats>, ApiError> {
    if state.engine.store().campaign(&campaign_id).is_none() {
        return Err(engine_error(EngineError::NotFound(format!(
            "campaign {campaign_id}"
        ))));
    }
    Ok(Json(state.engine.stats().campaign_stats(&campaign_id)))
}

/// POST /api/automation/start
pub async fn start_automation(
    State(state): State<AppState>,
    Json(request): Json<AutomationRequest>,
) -> Result<Json<AutomationResponse>, ApiError> {
    state
        .engine
        .start_automation(&request.campaign_id)
        .map_err(engine_error)?;
    Ok(Json(AutomationResponse {
        campaign_id: request.campaign_id,
        running: true,
    }))
}

/// POST /api/automation/stop
pub async fn stop_automation(
    State(state): State<AppState>,
    Json(request): Json<AutomationRequest>,
) -> Result<Json<AutomationResponse>, ApiError> {
    state
        .engine
        .stop_automation(&request.campaign_id)
        .map_err(engine_error)?;
    Ok(Json(AutomationResponse {
        campaign_id: request.campaign_id,
        running: false,
    }))
}

/// POST /api/prospects/:id/accepted — simulated acceptance signal.
pub async fn mark_accepted(
    State(state): State<AppState>,
    Path(prospect_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .store()
        .mark_accepted(&prospect_id, Utc::now())
        .map_err(|e| {
            warn!(prospect_id = %prospect_id, error = %e, "Accept signal rejected");
            engine_error(e)
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/prospects/:id/replied — external reply-received signal.
pub async fn mark_replied(
    State(state): State<AppState>,
    Path(prospect_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .store()
        .mark_replied(&prospect_id, Utc::now())
        .map_err(|e| {
            warn!(prospect_id = %prospect_id, error = %e, "Reply signal rejected");
            engine_error(e)
        })?;
    metrics::counter!("api.replies_received").increment(1);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/inbox — replied prospects across campaigns, newest first.
pub async fn inbox(State(state): State<AppState>) -> Json<Vec<Prospect>> {
    Json(state.engine.store().replied_inbox())
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
