// libs/auth-cell/src/services/account.rs
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::{StoreError, SupabaseClient};
use shared_utils::jwt;
use shared_utils::password::{hash_password, verify_password};

use crate::models::{AuthError, LoginRequest, RegisterDoctorRequest, RegisterPatientRequest};

/// Registration and login for both account tables. Tokens are minted locally
/// with the shared JWT secret; account rows live in the doctors and patients
/// tables alongside their argon2 password hashes.
pub struct AccountService {
    supabase: SupabaseClient,
    jwt_secret: String,
    token_ttl_hours: i64,
}

impl AccountService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            jwt_secret: config.supabase_jwt_secret.clone(),
            token_ttl_hours: config.token_ttl_hours,
        }
    }

    pub async fn register_doctor(
        &self,
        request: RegisterDoctorRequest,
    ) -> Result<(String, Value), AuthError> {
        debug!("Registering doctor account for: {}", request.email);

        validate_registration(&request.name, &request.email, &request.password)?;
        if request.consultation_fee < 0.0 {
            return Err(AuthError::ValidationError(
                "consultation_fee must not be negative".to_string(),
            ));
        }

        self.ensure_email_free("doctors", &request.email).await?;

        let password_hash = hash_password(&request.password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let doctor_data = json!({
            "name": request.name,
            "email": request.email,
            "password_hash": password_hash,
            "specialization": request.specialization,
            "consultation_fee": request.consultation_fee,
            "rating": 0.0,
            "total_patients": 0,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let row = self.insert_account("doctors", &request.email, doctor_data).await?;
        self.finish_login(row, "doctor")
    }

    pub async fn register_patient(
        &self,
        request: RegisterPatientRequest,
    ) -> Result<(String, Value), AuthError> {
        debug!("Registering patient account for: {}", request.email);

        validate_registration(&request.name, &request.email, &request.password)?;
        if request.phone.trim().is_empty() {
            return Err(AuthError::ValidationError(
                "phone must not be empty".to_string(),
            ));
        }

        self.ensure_email_free("patients", &request.email).await?;

        let password_hash = hash_password(&request.password)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let patient_data = json!({
            "name": request.name,
            "email": request.email,
            "password_hash": password_hash,
            "phone": request.phone,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let row = self.insert_account("patients", &request.email, patient_data).await?;
        self.finish_login(row, "patient")
    }

    pub async fn login_doctor(&self, request: LoginRequest) -> Result<(String, Value), AuthError> {
        self.login(request, "doctors", "doctor").await
    }

    pub async fn login_patient(&self, request: LoginRequest) -> Result<(String, Value), AuthError> {
        self.login(request, "patients", "patient").await
    }

    async fn login(
        &self,
        request: LoginRequest,
        table: &str,
        role: &str,
    ) -> Result<(String, Value), AuthError> {
        debug!("Logging in {} account for: {}", role, request.email);

        // Unknown email and wrong password collapse into the same error.
        let row = self.find_by_email(table, &request.email).await?
            .ok_or(AuthError::InvalidCredentials)?;

        let stored_hash = row["password_hash"].as_str().unwrap_or_default().to_string();

        let password_matches = verify_password(&request.password, &stored_hash)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        if !password_matches {
            warn!("Password mismatch for {} account: {}", role, request.email);
            return Err(AuthError::InvalidCredentials);
        }

        self.finish_login(row, role)
    }

    async fn find_by_email(&self, table: &str, email: &str) -> Result<Option<Value>, AuthError> {
        let path = format!("/rest/v1/{}?email=eq.{}", table, urlencoding::encode(email));
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await.map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    async fn ensure_email_free(&self, table: &str, email: &str) -> Result<(), AuthError> {
        if self.find_by_email(table, email).await?.is_some() {
            return Err(AuthError::EmailTaken(email.to_string()));
        }
        Ok(())
    }

    async fn insert_account(
        &self,
        table: &str,
        email: &str,
        data: Value,
    ) -> Result<Value, AuthError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let path = format!("/rest/v1/{}", table);
        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            &path,
            None,
            Some(data),
            Some(headers),
        ).await.map_err(|e| match e {
            // The unique index on email closes the check-then-insert race.
            StoreError::Conflict(_) => AuthError::EmailTaken(email.to_string()),
            other => AuthError::DatabaseError(other.to_string()),
        })?;

        result.into_iter().next()
            .ok_or_else(|| AuthError::DatabaseError("Failed to create account".to_string()))
    }

    fn finish_login(&self, row: Value, role: &str) -> Result<(String, Value), AuthError> {
        let id = row["id"].as_str().unwrap_or_default().to_string();
        let email = row["email"].as_str().unwrap_or_default().to_string();

        if id.is_empty() {
            return Err(AuthError::DatabaseError("Account row is missing an id".to_string()));
        }

        let token = jwt::issue_token(&id, &email, role, &self.jwt_secret, self.token_ttl_hours)
            .map_err(AuthError::Internal)?;

        Ok((token, sanitize_account(row)))
    }
}

// Account rows cross the API boundary after login; the hash never does.
fn sanitize_account(mut row: Value) -> Value {
    if let Some(object) = row.as_object_mut() {
        object.remove("password_hash");
    }
    row
}

fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), AuthError> {
    if name.trim().is_empty() {
        return Err(AuthError::ValidationError("name must not be empty".to_string()));
    }
    if email.trim().is_empty() || !email.contains('@') {
        return Err(AuthError::ValidationError("a valid email address is required".to_string()));
    }
    if password.len() < 8 {
        return Err(AuthError::ValidationError("password must be at least 8 characters".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_registration_accepts_normal_input() {
        assert!(validate_registration("Asha Rao", "asha@example.com", "long-enough-pw").is_ok());
    }

    #[test]
    fn test_validate_registration_rejects_blank_name() {
        let result = validate_registration("   ", "asha@example.com", "long-enough-pw");
        assert!(matches!(result, Err(AuthError::ValidationError(_))));
    }

    #[test]
    fn test_validate_registration_rejects_invalid_email() {
        let result = validate_registration("Asha Rao", "not-an-email", "long-enough-pw");
        assert!(matches!(result, Err(AuthError::ValidationError(_))));
    }

    #[test]
    fn test_validate_registration_rejects_short_password() {
        let result = validate_registration("Asha Rao", "asha@example.com", "short");
        assert!(matches!(result, Err(AuthError::ValidationError(_))));
    }

    #[test]
    fn test_sanitize_account_strips_password_hash() {
        let row = serde_json::json!({
            "id": "abc",
            "email": "asha@example.com",
            "password_hash": "$argon2id$v=19$..."
        });

        let sanitized = sanitize_account(row);

        assert!(sanitized.get("password_hash").is_none());
        assert_eq!(sanitized["email"], "asha@example.com");
    }
}
