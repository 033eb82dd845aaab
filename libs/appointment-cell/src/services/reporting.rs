// libs/appointment-cell/src/services/reporting.rs
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use std::collections::HashMap;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStats, AppointmentStatus, DoctorScheduleEntry,
    PaginatedAppointments, PatientSummary,
};

/// Read-only aggregation over appointment rows.
pub struct AppointmentReportingService {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentReportingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Count appointments per status for one patient or one doctor.
    pub async fn get_appointment_stats(
        &self,
        patient_id: Option<Uuid>,
        doctor_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<AppointmentStats, AppointmentError> {
        let mut query_parts = vec!["select=status".to_string()];
        if let Some(id) = patient_id {
            query_parts.push(format!("patient_id=eq.{}", id));
        }
        if let Some(id) = doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", id));
        }

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // Rows still carrying pre-migration statuses count toward the total
        // only.
        let mut stats = AppointmentStats {
            total: rows.len() as i64,
            ..Default::default()
        };
        for row in &rows {
            match row.get("status").and_then(|status| status.as_str()) {
                Some("scheduled") => stats.scheduled += 1,
                Some("ongoing") => stats.ongoing += 1,
                Some("completed") => stats.completed += 1,
                Some("cancelled") => stats.cancelled += 1,
                Some("no-show") => stats.no_show += 1,
                _ => {}
            }
        }

        Ok(stats)
    }

    /// One page of a doctor's schedule, ordered by date then slot, with
    /// each appointment's patient summary attached.
    pub async fn get_doctor_appointments(
        &self,
        doctor_id: Uuid,
        status: Option<AppointmentStatus>,
        page: i64,
        limit: i64,
        auth_token: &str,
    ) -> Result<PaginatedAppointments, AppointmentError> {
        debug!(
            "Listing appointments for doctor {} (page {}, limit {})",
            doctor_id, page, limit
        );

        let mut filter_parts = vec![format!("doctor_id=eq.{}", doctor_id)];
        if let Some(status) = status {
            filter_parts.push(format!("status=eq.{}", status));
        }
        let filters = filter_parts.join("&");

        let count_path = format!("/rest/v1/appointments?{}&select=id", filters);
        let count_rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &count_path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        let total = count_rows.len() as i64;

        let offset = (page - 1) * limit;
        let page_path = format!(
            "/rest/v1/appointments?{}&order=appointment_date.asc,time_slot.asc&limit={}&offset={}",
            filters, limit, offset
        );
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &page_path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e))
            })?;

        let patients = self
            .fetch_patients_by_ids(&appointments, auth_token)
            .await?;

        let entries = appointments
            .into_iter()
            .map(|appointment| {
                let patient = patients.get(&appointment.patient_id).cloned();
                DoctorScheduleEntry {
                    appointment,
                    patient,
                }
            })
            .collect();

        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };

        Ok(PaginatedAppointments {
            appointments: entries,
            page,
            limit,
            total,
            total_pages,
        })
    }

    /// Batch-fetch the patient summaries for a page of appointments.
    async fn fetch_patients_by_ids(
        &self,
        appointments: &[Appointment],
        auth_token: &str,
    ) -> Result<HashMap<Uuid, PatientSummary>, AppointmentError> {
        if appointments.is_empty() {
            return Ok(HashMap::new());
        }

        let mut ids: Vec<String> = appointments
            .iter()
            .map(|appointment| appointment.patient_id.to_string())
            .collect();
        ids.sort();
        ids.dedup();

        let path = format!(
            "/rest/v1/patients?id=in.({})&select=id,name,email,phone",
            ids.join(",")
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let mut patients = HashMap::new();
        for row in rows {
            let patient: PatientSummary = serde_json::from_value(row).map_err(|e| {
                AppointmentError::DatabaseError(format!("Failed to parse patient: {}", e))
            })?;
            patients.insert(patient.id, patient);
        }

        Ok(patients)
    }
}
