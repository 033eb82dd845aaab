// libs/appointment-cell/src/services/rating.rs
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use doctor_cell::services::DoctorProfileService;

use crate::models::{
    Appointment, AppointmentError, AppointmentRating, AppointmentStatus, RateAppointmentRequest,
};

/// Stores patient ratings and keeps the doctor's aggregate in step.
pub struct AppointmentRatingService {
    supabase: Arc<SupabaseClient>,
    doctor_service: DoctorProfileService,
}

impl AppointmentRatingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            doctor_service: DoctorProfileService::new(config),
        }
    }

    /// Record a rating for a completed appointment.
    ///
    /// Returns the updated appointment and the doctor's recomputed rating.
    pub async fn rate_appointment(
        &self,
        appointment: &Appointment,
        request: RateAppointmentRequest,
        auth_token: &str,
    ) -> Result<(Appointment, f64), AppointmentError> {
        if appointment.status != AppointmentStatus::Completed {
            return Err(AppointmentError::ValidationError(
                "Only completed appointments can be rated".to_string(),
            ));
        }
        if appointment.rating.is_some() {
            // A repeat rating replaces the stored score; the doctor aggregate
            // below is recomputed from the store, not incrementally adjusted.
            debug!("Overwriting existing rating for appointment {}", appointment.id);
        }
        if !(1..=5).contains(&request.score) {
            return Err(AppointmentError::ValidationError(
                "Rating score must be between 1 and 5".to_string(),
            ));
        }

        let rating = AppointmentRating {
            score: request.score,
            feedback: request.feedback,
        };

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let body = json!({
            "rating": rating,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let updated: Appointment = serde_json::from_value(
            result.into_iter().next().ok_or(AppointmentError::NotFound)?,
        )
        .map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })?;

        let doctor_rating = self
            .recompute_doctor_rating(appointment.doctor_id, auth_token)
            .await?;
        self.doctor_service
            .store_rating(appointment.doctor_id, doctor_rating, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!(
            "Appointment {} rated {}, doctor {} now at {}",
            appointment.id, request.score, appointment.doctor_id, doctor_rating
        );

        Ok((updated, doctor_rating))
    }

    /// Recompute the doctor's rating as the mean over all rated,
    /// completed appointments.
    async fn recompute_doctor_rating(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<f64, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=eq.completed&rating=not.is.null&select=rating",
            doctor_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let scores: Vec<i64> = rows
            .iter()
            .filter_map(|row| {
                row.get("rating")
                    .and_then(|rating| rating.get("score"))
                    .and_then(|score| score.as_i64())
            })
            .collect();

        Ok(mean_to_one_decimal(&scores))
    }
}

/// Mean score rounded to one decimal place; 0.0 when nothing is rated.
fn mean_to_one_decimal(scores: &[i64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}
