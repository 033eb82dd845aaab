// libs/patient-cell/src/handlers.rs
use std::sync::Arc;
use axum::{
    extract::{State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::services::PatientProfileService;

#[axum::debug_handler]
pub async fn get_my_profile(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid patient ID".to_string()))?;

    let service = PatientProfileService::new(&config);

    let patient = service.get_patient(patient_id, auth.token())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Patient profile not found".to_string()))?;

    Ok(Json(json!(patient)))
}
