// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, NaiveTime, Utc};
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus, UpdateActor, UpdateAppointmentRequest};

/// Pure state-machine rules for the appointment lifecycle.
///
/// Holds no connection state, so handlers can construct it freely.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating status transition from {} to {}",
            current_status, new_status
        );

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(&new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(
                current_status,
                new_status,
            ));
        }

        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Ongoing,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Ongoing => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled, // Emergency cancellation
            ],
            // A no-show can still be voided by either party.
            AppointmentStatus::NoShow => vec![AppointmentStatus::Cancelled],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Check which fields a caller may touch in an update.
    ///
    /// Patients own the clinical intake (symptoms, consultation type);
    /// doctors own the consultation logistics (status, meeting link,
    /// consultation type). Anything outside the caller's set is rejected
    /// before the update reaches storage.
    pub fn validate_update_fields(
        &self,
        request: &UpdateAppointmentRequest,
        actor: UpdateActor,
    ) -> Result<(), AppointmentError> {
        match actor {
            UpdateActor::Patient => {
                if request.status.is_some() {
                    return Err(AppointmentError::Forbidden(
                        "Patients cannot change the appointment status".to_string(),
                    ));
                }
                if request.meeting_link.is_some() {
                    return Err(AppointmentError::Forbidden(
                        "Patients cannot change the meeting link".to_string(),
                    ));
                }
            }
            UpdateActor::Doctor => {
                if request.symptoms.is_some() {
                    return Err(AppointmentError::Forbidden(
                        "Doctors cannot edit the patient's symptoms".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Reject bookings that are not strictly in the future.
    pub fn validate_booking_date(
        &self,
        appointment_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if appointment_date <= now {
            return Err(AppointmentError::InvalidDate(
                "Appointment date must be in the future".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate an "HH:MM-HH:MM" time slot.
    pub fn validate_time_slot(&self, time_slot: &str) -> Result<(), AppointmentError> {
        let (start, end) = time_slot.split_once('-').ok_or_else(|| {
            AppointmentError::ValidationError(
                "Time slot must use the HH:MM-HH:MM format".to_string(),
            )
        })?;

        let start = NaiveTime::parse_from_str(start, "%H:%M").map_err(|_| {
            AppointmentError::ValidationError(format!("Invalid slot start time: {}", start))
        })?;
        let end = NaiveTime::parse_from_str(end, "%H:%M").map_err(|_| {
            AppointmentError::ValidationError(format!("Invalid slot end time: {}", end))
        })?;

        if start >= end {
            return Err(AppointmentError::ValidationError(
                "Slot start time must be before its end time".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> AppointmentLifecycleService {
        AppointmentLifecycleService::new()
    }

    #[test]
    fn test_scheduled_transitions() {
        let service = service();

        assert!(service
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Ongoing)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::NoShow)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::Scheduled, AppointmentStatus::Completed)
            .is_err());
    }

    #[test]
    fn test_ongoing_transitions() {
        let service = service();

        assert!(service
            .validate_status_transition(AppointmentStatus::Ongoing, AppointmentStatus::Completed)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::Ongoing, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::Ongoing, AppointmentStatus::NoShow)
            .is_err());
    }

    #[test]
    fn test_terminal_states_allow_nothing() {
        let service = service();

        assert!(service
            .get_valid_transitions(AppointmentStatus::Completed)
            .is_empty());
        assert!(service
            .get_valid_transitions(AppointmentStatus::Cancelled)
            .is_empty());

        let result = service
            .validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Ongoing);
        assert!(matches!(
            result,
            Err(AppointmentError::InvalidStatusTransition(
                AppointmentStatus::Completed,
                AppointmentStatus::Ongoing,
            ))
        ));
    }

    #[test]
    fn test_no_show_can_be_cancelled() {
        let service = service();

        assert!(service
            .validate_status_transition(AppointmentStatus::NoShow, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(service
            .validate_status_transition(AppointmentStatus::NoShow, AppointmentStatus::Scheduled)
            .is_err());
    }

    #[test]
    fn test_patient_update_fields() {
        let service = service();

        let allowed = UpdateAppointmentRequest {
            status: None,
            symptoms: Some("Persistent cough".to_string()),
            consultation_type: Some(crate::models::ConsultationType::Phone),
            meeting_link: None,
        };
        assert!(service
            .validate_update_fields(&allowed, UpdateActor::Patient)
            .is_ok());

        let status_change = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Completed),
            symptoms: None,
            consultation_type: None,
            meeting_link: None,
        };
        assert!(matches!(
            service.validate_update_fields(&status_change, UpdateActor::Patient),
            Err(AppointmentError::Forbidden(_))
        ));

        let link_change = UpdateAppointmentRequest {
            status: None,
            symptoms: None,
            consultation_type: None,
            meeting_link: Some("https://meet.example.com/room/1".to_string()),
        };
        assert!(matches!(
            service.validate_update_fields(&link_change, UpdateActor::Patient),
            Err(AppointmentError::Forbidden(_))
        ));
    }

    #[test]
    fn test_doctor_update_fields() {
        let service = service();

        let allowed = UpdateAppointmentRequest {
            status: Some(AppointmentStatus::Ongoing),
            symptoms: None,
            consultation_type: Some(crate::models::ConsultationType::Video),
            meeting_link: Some("https://meet.example.com/room/2".to_string()),
        };
        assert!(service
            .validate_update_fields(&allowed, UpdateActor::Doctor)
            .is_ok());

        let symptom_edit = UpdateAppointmentRequest {
            status: None,
            symptoms: Some("Rewritten by doctor".to_string()),
            consultation_type: None,
            meeting_link: None,
        };
        assert!(matches!(
            service.validate_update_fields(&symptom_edit, UpdateActor::Doctor),
            Err(AppointmentError::Forbidden(_))
        ));
    }

    #[test]
    fn test_booking_date_must_be_future() {
        let service = service();
        let now = Utc::now();

        assert!(service
            .validate_booking_date(now + Duration::days(1), now)
            .is_ok());
        assert!(service.validate_booking_date(now, now).is_err());
        assert!(matches!(
            service.validate_booking_date(now - Duration::hours(1), now),
            Err(AppointmentError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_time_slot_parsing() {
        let service = service();

        assert!(service.validate_time_slot("09:00-09:30").is_ok());
        assert!(service.validate_time_slot("23:30-23:45").is_ok());

        assert!(service.validate_time_slot("9am-10am").is_err());
        assert!(service.validate_time_slot("09:00").is_err());
        assert!(service.validate_time_slot("09:00-08:30").is_err());
        assert!(service.validate_time_slot("10:00-10:00").is_err());
        assert!(service.validate_time_slot("25:00-26:00").is_err());
    }
}
