// libs/doctor-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use shared_config::AppConfig;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    // Directory routes are public. Profile mutations (booking counter, rating)
    // happen inside the appointment flow, not over HTTP.
    Router::new()
        .route("/", get(handlers::list_doctors))
        .route("/{doctor_id}", get(handlers::get_doctor_public))
        .with_state(state)
}
