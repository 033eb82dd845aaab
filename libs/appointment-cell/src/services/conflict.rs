// libs/appointment-cell/src/services/conflict.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use std::sync::Arc;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Detects double bookings before an appointment row is written.
///
/// A slot is taken when another appointment exists for the same party on
/// the same calendar day with the same time slot, in a status that still
/// occupies the doctor's calendar.
pub struct SlotConflictService {
    supabase: Arc<SupabaseClient>,
}

impl SlotConflictService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Check whether the doctor already has an appointment in this slot.
    pub async fn doctor_slot_taken(
        &self,
        doctor_id: Uuid,
        appointment_date: DateTime<Utc>,
        time_slot: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking doctor {} for conflicts on {} at {}",
            doctor_id,
            appointment_date.date_naive(),
            time_slot
        );

        self.slot_taken(
            "doctor_id",
            doctor_id,
            appointment_date,
            time_slot,
            "status=in.(scheduled,ongoing)",
            auth_token,
        )
        .await
    }

    /// Check whether the patient already has an appointment in this slot.
    pub async fn patient_slot_taken(
        &self,
        patient_id: Uuid,
        appointment_date: DateTime<Utc>,
        time_slot: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking patient {} for conflicts on {} at {}",
            patient_id,
            appointment_date.date_naive(),
            time_slot
        );

        // The confirmed status predates the current lifecycle; rows migrated
        // from the old scheme may still carry it, so it stays in the filter.
        self.slot_taken(
            "patient_id",
            patient_id,
            appointment_date,
            time_slot,
            "status=in.(scheduled,ongoing,confirmed)",
            auth_token,
        )
        .await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn slot_taken(
        &self,
        owner_column: &str,
        owner_id: Uuid,
        appointment_date: DateTime<Utc>,
        time_slot: &str,
        status_filter: &str,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let (start_of_day, end_of_day) = Self::day_bounds(appointment_date);

        // Use URL-encoded RFC3339 format for Supabase
        let query_parts = vec![
            "select=id".to_string(),
            format!("{}=eq.{}", owner_column, owner_id),
            format!(
                "appointment_date=gte.{}",
                urlencoding::encode(&start_of_day.to_rfc3339())
            ),
            format!(
                "appointment_date=lte.{}",
                urlencoding::encode(&end_of_day.to_rfc3339())
            ),
            format!("time_slot=eq.{}", urlencoding::encode(time_slot)),
            status_filter.to_string(),
            "limit=1".to_string(),
        ];

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let taken = !result.is_empty();
        if taken {
            warn!(
                "Slot conflict: {}={} already booked at {} on {}",
                owner_column,
                owner_id,
                time_slot,
                appointment_date.date_naive()
            );
        }

        Ok(taken)
    }

    fn day_bounds(appointment_date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        // and_hms_opt cannot fail for these constants.
        let start = appointment_date
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let end = appointment_date
            .date_naive()
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap()
            .and_utc();
        (start, end)
    }
}
