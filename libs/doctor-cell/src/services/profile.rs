// libs/doctor-cell/src/services/profile.rs
use anyhow::{Result, anyhow};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;
use chrono::Utc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Doctor, DoctorPublicProfile, DoctorSearchQuery};

pub struct DoctorProfileService {
    supabase: SupabaseClient,
}

impl DoctorProfileService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Get the full doctor row by ID. Returns None when no such doctor exists.
    pub async fn get_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Option<Doctor>> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            auth_token,
            None,
        ).await?;

        if result.is_empty() {
            return Ok(None);
        }

        let doctor: Doctor = serde_json::from_value(result[0].clone())?;
        Ok(Some(doctor))
    }

    /// Get the directory-facing profile for a single doctor.
    pub async fn get_doctor_public(
        &self,
        doctor_id: Uuid,
    ) -> Result<Option<DoctorPublicProfile>> {
        debug!("Fetching public doctor profile: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctors?id=eq.{}&select=id,name,specialization,consultation_fee,rating",
            doctor_id
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await?;

        if result.is_empty() {
            return Ok(None);
        }

        let profile: DoctorPublicProfile = serde_json::from_value(result[0].clone())?;
        Ok(Some(profile))
    }

    /// List the doctor directory, best-rated first.
    pub async fn list_doctors(
        &self,
        query: DoctorSearchQuery,
    ) -> Result<Vec<DoctorPublicProfile>> {
        debug!("Listing doctors with query: {:?}", query);

        let mut query_parts = vec![
            "select=id,name,specialization,consultation_fee,rating".to_string(),
        ];

        if let Some(specialization) = query.specialization {
            query_parts.push(format!("specialization=ilike.%{}%", specialization));
        }

        let mut path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        path.push_str("&order=rating.desc,total_patients.desc");

        if let Some(limit_val) = query.limit {
            path.push_str(&format!("&limit={}", limit_val));
        }
        if let Some(offset_val) = query.offset {
            path.push_str(&format!("&offset={}", offset_val));
        }

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            None,
            None,
        ).await?;

        let doctors: Vec<DoctorPublicProfile> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<DoctorPublicProfile>, _>>()?;

        Ok(doctors)
    }

    /// Bump the doctor's lifetime booking counter by one and return the new value.
    pub async fn increment_total_patients(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<i64> {
        debug!("Incrementing total_patients for doctor: {}", doctor_id);

        let doctor = self.get_doctor(doctor_id, Some(auth_token)).await?
            .ok_or_else(|| anyhow!("Doctor not found: {}", doctor_id))?;

        let next_total = doctor.total_patients + 1;

        let update_data = json!({
            "total_patients": next_total,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await?;

        if result.is_empty() {
            return Err(anyhow!("Failed to update doctor booking counter"));
        }

        Ok(next_total)
    }

    /// Persist a recomputed aggregate rating on the doctors row.
    pub async fn store_rating(
        &self,
        doctor_id: Uuid,
        rating: f64,
        auth_token: &str,
    ) -> Result<()> {
        debug!("Storing aggregate rating {} for doctor: {}", rating, doctor_id);

        let update_data = json!({
            "rating": rating,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(update_data),
            Some(headers),
        ).await?;

        if result.is_empty() {
            return Err(anyhow!("Failed to store doctor rating"));
        }

        Ok(())
    }
}
