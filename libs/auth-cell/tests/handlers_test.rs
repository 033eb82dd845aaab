// libs/auth-cell/tests/handlers_test.rs
use std::sync::Arc;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use auth_cell::handlers::{login_patient, register_doctor, register_patient, validate_token};
use auth_cell::models::{LoginRequest, RegisterDoctorRequest, RegisterPatientRequest};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::jwt;
use shared_utils::password::hash_password;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn mock_backed_config(mock_server: &MockServer) -> AppConfig {
    let mut config = create_test_config();
    config.supabase_url = mock_server.uri();
    config
}

fn create_auth_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

fn doctor_account_row(id: Uuid, email: &str, password_hash: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Dr. Asha Rao",
        "email": email,
        "password_hash": password_hash,
        "specialization": "Cardiology",
        "consultation_fee": 150.0,
        "rating": 0.0,
        "total_patients": 0,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn patient_account_row(id: Uuid, email: &str, password_hash: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Test Patient",
        "email": email,
        "password_hash": password_hash,
        "phone": "+15550100",
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

#[tokio::test]
async fn test_validate_token_success() {
    let config = Arc::new(create_test_config());
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let headers = create_auth_header(&token);

    let result = validate_token(State(config), headers).await;

    assert!(result.is_ok());
    let response = result.unwrap().0;
    assert_eq!(response.valid, true);
    assert_eq!(response.user_id, user.id);
    assert_eq!(response.email, Some(user.email));
    assert_eq!(response.role, Some(user.role));
}

#[tokio::test]
async fn test_validate_token_missing_header() {
    let config = Arc::new(create_test_config());
    let headers = HeaderMap::new();

    let result = validate_token(State(config), headers).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Auth(msg) => assert_eq!(msg, "Missing authorization header"),
        _ => panic!("Expected Auth error"),
    }
}

#[tokio::test]
async fn test_validate_token_expired() {
    let config = Arc::new(create_test_config());
    let user = TestUser::default();
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);
    let headers = create_auth_header(&token);

    let result = validate_token(State(config), headers).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Auth(_) => {}, // Expected
        _ => panic!("Expected Auth error"),
    }
}

#[tokio::test]
async fn test_register_doctor_success() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let doctor_id = Uuid::new_v4();

    // Duplicate-email check finds nothing.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            doctor_account_row(doctor_id, "asha@example.com", "$argon2id$v=19$stub")
        ])))
        .mount(&mock_server)
        .await;

    let jwt_secret = config.supabase_jwt_secret.clone();
    let result = register_doctor(
        State(Arc::new(config)),
        Json(RegisterDoctorRequest {
            name: "Dr. Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: "long-enough-pw".to_string(),
            specialization: "Cardiology".to_string(),
            consultation_fee: 150.0,
        }),
    ).await;

    assert!(result.is_ok(), "Expected register_doctor to succeed, but got error: {:?}", result.err());
    let (status, Json(body)) = result.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["doctor"]["id"], doctor_id.to_string());
    assert!(body["doctor"].get("password_hash").is_none(), "hash must not leak in responses");

    let token = body["token"].as_str().expect("token missing from response");
    let user = jwt::validate_token(token, &jwt_secret).expect("issued token should validate");
    assert_eq!(user.id, doctor_id.to_string());
    assert_eq!(user.role, Some("doctor".to_string()));
}

#[tokio::test]
async fn test_register_doctor_duplicate_email() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            doctor_account_row(Uuid::new_v4(), "asha@example.com", "$argon2id$v=19$stub")
        ])))
        .mount(&mock_server)
        .await;

    let result = register_doctor(
        State(Arc::new(config)),
        Json(RegisterDoctorRequest {
            name: "Dr. Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: "long-enough-pw".to_string(),
            specialization: "Cardiology".to_string(),
            consultation_fee: 150.0,
        }),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("already exists")),
        other => panic!("Expected BadRequest error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_register_patient_rejects_short_password() {
    let config = Arc::new(create_test_config());

    let result = register_patient(
        State(config),
        Json(RegisterPatientRequest {
            name: "Test Patient".to_string(),
            email: "patient@example.com".to_string(),
            password: "short".to_string(),
            phone: "+15550100".to_string(),
        }),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::BadRequest(msg) => assert!(msg.contains("at least 8")),
        other => panic!("Expected BadRequest error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_login_patient_success() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let patient_id = Uuid::new_v4();

    let password = "correct-horse-battery";
    let password_hash = hash_password(password).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            patient_account_row(patient_id, "patient@example.com", &password_hash)
        ])))
        .mount(&mock_server)
        .await;

    let jwt_secret = config.supabase_jwt_secret.clone();
    let result = login_patient(
        State(Arc::new(config)),
        Json(LoginRequest {
            email: "patient@example.com".to_string(),
            password: password.to_string(),
        }),
    ).await;

    assert!(result.is_ok(), "Expected login_patient to succeed, but got error: {:?}", result.err());
    let body = result.unwrap().0;
    assert_eq!(body["success"], true);
    assert!(body["patient"].get("password_hash").is_none());

    let token = body["token"].as_str().expect("token missing from response");
    let user = jwt::validate_token(token, &jwt_secret).expect("issued token should validate");
    assert_eq!(user.id, patient_id.to_string());
    assert_eq!(user.role, Some("patient".to_string()));
}

#[tokio::test]
async fn test_login_patient_wrong_password() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);

    let password_hash = hash_password("the-real-password").unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            patient_account_row(Uuid::new_v4(), "patient@example.com", &password_hash)
        ])))
        .mount(&mock_server)
        .await;

    let result = login_patient(
        State(Arc::new(config)),
        Json(LoginRequest {
            email: "patient@example.com".to_string(),
            password: "a-wrong-guess".to_string(),
        }),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Auth(msg) => assert!(msg.contains("Invalid email or password")),
        other => panic!("Expected Auth error, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_login_patient_unknown_email() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = login_patient(
        State(Arc::new(config)),
        Json(LoginRequest {
            email: "nobody@example.com".to_string(),
            password: "whatever-password".to_string(),
        }),
    ).await;

    assert!(result.is_err());
    match result.unwrap_err() {
        AppError::Auth(msg) => assert!(msg.contains("Invalid email or password")),
        other => panic!("Expected Auth error, got: {:?}", other),
    }
}
