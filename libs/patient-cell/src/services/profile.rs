// libs/patient-cell/src/services/profile.rs
use anyhow::Result;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::Patient;

pub struct PatientProfileService {
    supabase: SupabaseClient,
}

impl PatientProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Fetch a patient row by ID. Returns None when no such patient exists.
    pub async fn get_patient(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Patient>> {
        debug!("Fetching patient profile: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        if result.is_empty() {
            return Ok(None);
        }

        let patient: Patient = serde_json::from_value(result[0].clone())?;
        Ok(Some(patient))
    }
}
