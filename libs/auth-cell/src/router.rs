// libs/auth-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::post,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn auth_routes(state: Arc<AppConfig>) -> Router {
    // Every route here is reachable without a token; /validate reads its
    // Bearer header directly instead of going through the auth middleware.
    Router::new()
        .route("/doctors/register", post(handlers::register_doctor))
        .route("/doctors/login", post(handlers::login_doctor))
        .route("/patients/register", post(handlers::register_patient))
        .route("/patients/login", post(handlers::login_patient))
        .route("/validate", post(handlers::validate_token))
        .with_state(state)
}
