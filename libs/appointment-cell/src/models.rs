// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    /// Wire format "HH:MM-HH:MM", start strictly before end.
    pub time_slot: String,
    pub status: AppointmentStatus,
    pub consultation_type: ConsultationType,
    pub symptoms: String,
    pub rating: Option<AppointmentRating>,
    pub meeting_link: Option<String>,
    pub whatsapp_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Patient feedback stored on the appointment row as jsonb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRating {
    pub score: i32,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Completed and cancelled appointments accept no further changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Ongoing => write!(f, "ongoing"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no-show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationType {
    Video,
    InPerson,
    Phone,
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationType::Video => write!(f, "video"),
            ConsultationType::InPerson => write!(f, "in_person"),
            ConsultationType::Phone => write!(f, "phone"),
        }
    }
}

/// Which side of the appointment is asking for a change. Each side may touch
/// a different set of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateActor {
    Patient,
    Doctor,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub time_slot: String,
    pub symptoms: String,
    pub consultation_type: ConsultationType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub symptoms: Option<String>,
    pub consultation_type: Option<ConsultationType>,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateAppointmentRequest {
    pub score: i32,
    pub feedback: Option<String>,
}

/// The slice of the doctors row that rides along with appointment responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub consultation_fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub appointment: Appointment,
    pub doctor: DoctorSummary,
    pub patient: PatientSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorScheduleEntry {
    pub appointment: Appointment,
    pub patient: Option<PatientSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedAppointments {
    pub appointments: Vec<DoctorScheduleEntry>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

// ==============================================================================
// STATISTICS MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentStats {
    pub total: i64,
    pub scheduled: i64,
    pub ongoing: i64,
    pub completed: i64,
    pub cancelled: i64,
    #[serde(rename = "no-show")]
    pub no_show: i64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Invalid appointment date: {0}")]
    InvalidDate(String),

    #[error("Doctor already has an appointment in this time slot")]
    DoctorSlotTaken,

    #[error("Patient already has an appointment in this time slot")]
    PatientSlotTaken,

    #[error("Invalid status transition from {0} to {1}")]
    InvalidStatusTransition(AppointmentStatus, AppointmentStatus),

    #[error("Appointment in status {0} can no longer be modified")]
    AppointmentTerminal(AppointmentStatus),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),
}
