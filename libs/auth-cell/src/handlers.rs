// libs/auth-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{State, Json},
    http::{HeaderMap, StatusCode},
};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::TokenResponse;
use shared_models::error::AppError;
use shared_utils::jwt;

use crate::models::{AuthError, LoginRequest, RegisterDoctorRequest, RegisterPatientRequest};
use crate::services::AccountService;

// Helper function to extract token
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth("Invalid authorization header format".to_string()));
    }

    Ok(auth_value[7..].to_string())
}

fn map_auth_error(error: AuthError) -> AppError {
    match error {
        AuthError::InvalidCredentials => AppError::Auth(error.to_string()),
        AuthError::EmailTaken(_) => AppError::BadRequest(error.to_string()),
        AuthError::ValidationError(_) => AppError::BadRequest(error.to_string()),
        AuthError::DatabaseError(message) => AppError::Database(message),
        AuthError::Internal(message) => AppError::Internal(message),
    }
}

#[axum::debug_handler]
pub async fn register_doctor(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = AccountService::new(&config);

    let (token, doctor) = service.register_doctor(request).await
        .map_err(map_auth_error)?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "token": token,
        "doctor": doctor
    }))))
}

#[axum::debug_handler]
pub async fn login_doctor(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AccountService::new(&config);

    let (token, doctor) = service.login_doctor(request).await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn register_patient(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = AccountService::new(&config);

    let (token, patient) = service.register_patient(request).await
        .map_err(map_auth_error)?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "token": token,
        "patient": patient
    }))))
}

#[axum::debug_handler]
pub async fn login_patient(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AccountService::new(&config);

    let (token, patient) = service.login_patient(request).await
        .map_err(map_auth_error)?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "patient": patient
    })))
}

pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;

    match jwt::validate_token(&token, &config.supabase_jwt_secret) {
        Ok(user) => {
            let response = TokenResponse {
                valid: true,
                user_id: user.id,
                email: user.email,
                role: user.role,
            };

            Ok(Json(response))
        },
        Err(err) => {
            Err(AppError::Auth(err))
        }
    }
}
