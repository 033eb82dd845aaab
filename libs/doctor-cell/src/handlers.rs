// libs/doctor-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::DoctorSearchQuery;
use crate::services::profile::DoctorProfileService;

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    // Directory reads go through the anon key; no caller token involved.
    let profile_service = DoctorProfileService::new(&state);

    let doctors = profile_service.list_doctors(query).await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let total = doctors.len();

    Ok(Json(json!({
        "doctors": doctors,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let profile_service = DoctorProfileService::new(&state);

    let profile = profile_service.get_doctor_public(doctor_id).await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))?;

    Ok(Json(json!(profile)))
}
