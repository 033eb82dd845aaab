// libs/auth-cell/tests/integration_test.rs
use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use auth_cell::router::auth_routes;
use shared_config::AppConfig;
use shared_utils::jwt;
use shared_utils::password::hash_password;
use shared_utils::test_utils::{TestConfig, TestUser, JwtTestUtils};

async fn create_test_app(config: AppConfig) -> Router {
    auth_routes(Arc::new(config))
}

fn mock_backed_config(mock_server: &MockServer) -> AppConfig {
    let mut config = TestConfig::default().to_app_config();
    config.supabase_url = mock_server.uri();
    config
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_validate_token_endpoint() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config.clone()).await;

    let user = TestUser::patient("test@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));

    let request = Request::builder()
        .method("POST")
        .uri("/validate")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json_response["valid"], true);
    assert_eq!(json_response["user_id"], user.id);
    assert_eq!(json_response["email"], user.email);
    assert_eq!(json_response["role"], user.role);
}

#[tokio::test]
async fn test_validate_token_endpoint_unauthorized() {
    let config = TestConfig::default().to_app_config();
    let app = create_test_app(config).await;

    let request = Request::builder()
        .method("POST")
        .uri("/validate")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_patient_endpoint() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let jwt_secret = config.supabase_jwt_secret.clone();
    let app = create_test_app(config).await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": patient_id,
            "name": "Test Patient",
            "email": "patient@example.com",
            "password_hash": "$argon2id$v=19$stub",
            "phone": "+15550100",
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let request = json_request("/patients/register", json!({
        "name": "Test Patient",
        "email": "patient@example.com",
        "password": "long-enough-pw",
        "phone": "+15550100"
    }));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json_response["success"], true);
    assert!(json_response["patient"].get("password_hash").is_none());

    let token = json_response["token"].as_str().expect("token missing");
    let user = jwt::validate_token(token, &jwt_secret).expect("issued token should validate");
    assert_eq!(user.role, Some("patient".to_string()));
}

#[tokio::test]
async fn test_register_duplicate_email_endpoint() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let app = create_test_app(config).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "email": "patient@example.com"
        }])))
        .mount(&mock_server)
        .await;

    let request = json_request("/patients/register", json!({
        "name": "Test Patient",
        "email": "patient@example.com",
        "password": "long-enough-pw",
        "phone": "+15550100"
    }));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_doctor_endpoint() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let jwt_secret = config.supabase_jwt_secret.clone();
    let app = create_test_app(config).await;
    let doctor_id = Uuid::new_v4();

    let password = "correct-horse-battery";
    let password_hash = hash_password(password).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": doctor_id,
            "name": "Dr. Asha Rao",
            "email": "asha@example.com",
            "password_hash": password_hash,
            "specialization": "Cardiology",
            "consultation_fee": 150.0,
            "rating": 4.5,
            "total_patients": 12,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let request = json_request("/doctors/login", json!({
        "email": "asha@example.com",
        "password": password
    }));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: serde_json::Value = serde_json::from_slice(&body).unwrap();

    let token = json_response["token"].as_str().expect("token missing");
    let user = jwt::validate_token(token, &jwt_secret).expect("issued token should validate");
    assert_eq!(user.id, doctor_id.to_string());
    assert_eq!(user.role, Some("doctor".to_string()));
}

#[tokio::test]
async fn test_login_wrong_password_endpoint() {
    let mock_server = MockServer::start().await;
    let config = mock_backed_config(&mock_server);
    let app = create_test_app(config).await;

    let password_hash = hash_password("the-real-password").unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "email": "asha@example.com",
            "password_hash": password_hash
        }])))
        .mount(&mock_server)
        .await;

    let request = json_request("/doctors/login", json!({
        "email": "asha@example.com",
        "password": "a-wrong-guess"
    }));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
