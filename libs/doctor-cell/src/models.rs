// libs/doctor-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub specialization: String,
    pub consultation_fee: f64,
    pub rating: f64,
    pub total_patients: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Directory-facing subset of the doctors row. Email and credentials stay out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorPublicProfile {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub consultation_fee: f64,
    pub rating: f64,
}

impl From<&Doctor> for DoctorPublicProfile {
    fn from(doctor: &Doctor) -> Self {
        DoctorPublicProfile {
            id: doctor.id,
            name: doctor.name.clone(),
            specialization: doctor.specialization.clone(),
            consultation_fee: doctor.consultation_fee,
            rating: doctor.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSearchQuery {
    pub specialization: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
