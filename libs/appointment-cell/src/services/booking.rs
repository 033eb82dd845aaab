// libs/appointment-cell/src/services/booking.rs
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::{StoreError, SupabaseClient};
use doctor_cell::services::DoctorProfileService;

use crate::models::{
    Appointment, AppointmentDetails, AppointmentError, AppointmentStatus,
    BookAppointmentRequest, ConsultationType, DoctorSummary, PatientSummary, UpdateActor,
    UpdateAppointmentRequest,
};
use crate::services::conflict::SlotConflictService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::notify::{deliver_booking_confirmation, WhatsAppNotifier};

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: SlotConflictService,
    lifecycle_service: AppointmentLifecycleService,
    doctor_service: DoctorProfileService,
    notifier: WhatsAppNotifier,
    meeting_link_base_url: String,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        let conflict_service = SlotConflictService::new(Arc::clone(&supabase));
        let lifecycle_service = AppointmentLifecycleService::new();
        let doctor_service = DoctorProfileService::new(config);
        let notifier = WhatsAppNotifier::new(config);

        Self {
            conflict_service,
            lifecycle_service,
            doctor_service,
            notifier,
            supabase,
            meeting_link_base_url: config.meeting_link_base_url.clone(),
        }
    }

    /// Book an appointment for a patient with a specific doctor.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<AppointmentDetails, AppointmentError> {
        info!(
            "Booking appointment for patient {} with doctor {}",
            request.patient_id, request.doctor_id
        );

        // **Step 1: Validate the requested slot**
        self.lifecycle_service.validate_time_slot(&request.time_slot)?;
        self.lifecycle_service
            .validate_booking_date(request.appointment_date, Utc::now())?;
        if request.symptoms.trim().is_empty() {
            return Err(AppointmentError::ValidationError(
                "Symptoms are required when booking".to_string(),
            ));
        }

        // **Step 2: Resolve the doctor and patient**
        let doctor = self
            .doctor_service
            .get_doctor(request.doctor_id, Some(auth_token))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .ok_or(AppointmentError::DoctorNotFound)?;
        let patient = self
            .fetch_patient_summary(request.patient_id, auth_token)
            .await?
            .ok_or(AppointmentError::PatientNotFound)?;

        // **Step 3: Conflict Detection**
        // The doctor's calendar is checked first so a clash on both sides
        // reports the doctor slot, which is the one the patient can rebook
        // around.
        let doctor_taken = self
            .conflict_service
            .doctor_slot_taken(
                request.doctor_id,
                request.appointment_date,
                &request.time_slot,
                auth_token,
            )
            .await?;
        if doctor_taken {
            return Err(AppointmentError::DoctorSlotTaken);
        }

        let patient_taken = self
            .conflict_service
            .patient_slot_taken(
                request.patient_id,
                request.appointment_date,
                &request.time_slot,
                auth_token,
            )
            .await?;
        if patient_taken {
            return Err(AppointmentError::PatientSlotTaken);
        }

        // **Step 4: Create the Appointment Record**
        let meeting_link = match request.consultation_type {
            ConsultationType::Video => Some(format!(
                "{}/room/{}",
                self.meeting_link_base_url.trim_end_matches('/'),
                Uuid::new_v4()
            )),
            ConsultationType::InPerson | ConsultationType::Phone => None,
        };

        let now = Utc::now();
        let body = json!({
            "doctor_id": request.doctor_id,
            "patient_id": request.patient_id,
            "appointment_date": request.appointment_date.to_rfc3339(),
            "time_slot": request.time_slot,
            "status": AppointmentStatus::Scheduled,
            "consultation_type": request.consultation_type,
            "symptoms": request.symptoms,
            "meeting_link": meeting_link,
            "whatsapp_sent": false,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339(),
        });

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = match self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await
        {
            Ok(rows) => rows,
            // The unique slot index closes the race between the conflict
            // check above and this insert.
            Err(StoreError::Conflict(_)) => {
                warn!(
                    "Insert lost the slot race for doctor {} at {}",
                    request.doctor_id, request.time_slot
                );
                return Err(AppointmentError::DoctorSlotTaken);
            }
            Err(e) => return Err(AppointmentError::DatabaseError(e.to_string())),
        };

        let appointment: Appointment = serde_json::from_value(
            result
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppointmentError::DatabaseError("Failed to create appointment".to_string())
                })?,
        )
        .map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })?;

        // **Step 5: Update the Doctor's Booking Counter**
        self.doctor_service
            .increment_total_patients(request.doctor_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // **Step 6: Fire the Confirmation Message**
        // Delivery runs detached; the booking response never waits on the
        // WhatsApp gateway.
        tokio::spawn(deliver_booking_confirmation(
            self.notifier.clone(),
            Arc::clone(&self.supabase),
            appointment.clone(),
            patient.phone.clone(),
            doctor.name.clone(),
            auth_token.to_string(),
        ));

        info!(
            "Appointment {} booked for patient {} with doctor {}",
            appointment.id, request.patient_id, request.doctor_id
        );

        Ok(AppointmentDetails {
            appointment,
            doctor: DoctorSummary {
                id: doctor.id,
                name: doctor.name,
                specialization: doctor.specialization,
                consultation_fee: doctor.consultation_fee,
            },
            patient,
        })
    }

    /// Fetch a single appointment row.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })
    }

    /// Fetch an appointment together with its doctor and patient summaries.
    pub async fn get_appointment_details(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<AppointmentDetails, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let doctor = self
            .fetch_doctor_summary(appointment.doctor_id, auth_token)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)?;
        let patient = self
            .fetch_patient_summary(appointment.patient_id, auth_token)
            .await?
            .ok_or(AppointmentError::PatientNotFound)?;

        Ok(AppointmentDetails {
            appointment,
            doctor,
            patient,
        })
    }

    /// Apply a partial update on behalf of one side of the appointment.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        actor: UpdateActor,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.status.is_terminal() {
            return Err(AppointmentError::AppointmentTerminal(appointment.status));
        }

        self.lifecycle_service
            .validate_update_fields(&request, actor)?;

        if let Some(new_status) = request.status {
            self.lifecycle_service
                .validate_status_transition(appointment.status, new_status)?;
        }

        let mut changes = Map::new();
        if let Some(status) = request.status {
            changes.insert("status".to_string(), json!(status));
        }
        if let Some(symptoms) = request.symptoms {
            changes.insert("symptoms".to_string(), json!(symptoms));
        }
        if let Some(consultation_type) = request.consultation_type {
            changes.insert("consultation_type".to_string(), json!(consultation_type));
        }
        if let Some(meeting_link) = request.meeting_link {
            changes.insert("meeting_link".to_string(), json!(meeting_link));
        }

        if changes.is_empty() {
            return Err(AppointmentError::ValidationError(
                "No updatable fields provided".to_string(),
            ));
        }
        changes.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch_appointment(appointment_id, Value::Object(changes), auth_token)
            .await
    }

    /// Cancel an appointment, subject to the status transition rules.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle_service
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let body = json!({
            "status": AppointmentStatus::Cancelled,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let cancelled = self
            .patch_appointment(appointment_id, body, auth_token)
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

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

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| {
            AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e))
        })
    }

    async fn fetch_doctor_summary(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DoctorSummary>, AppointmentError> {
        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,name,specialization,consultation_fee",
            doctor_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let doctor = serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse doctor: {}", e))
                })?;
                Ok(Some(doctor))
            }
            None => Ok(None),
        }
    }

    async fn fetch_patient_summary(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<PatientSummary>, AppointmentError> {
        let path = format!(
            "/rest/v1/patients?id=eq.{}&select=id,name,email,phone",
            patient_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => {
                let patient = serde_json::from_value(row).map_err(|e| {
                    AppointmentError::DatabaseError(format!("Failed to parse patient: {}", e))
                })?;
                Ok(Some(patient))
            }
            None => Ok(None),
        }
    }
}
