// libs/appointment-cell/src/services/notify.rs
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use std::sync::Arc;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

/// Client for the WhatsApp messaging gateway.
#[derive(Clone)]
pub struct WhatsAppNotifier {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
}

impl WhatsAppNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.whatsapp_api_url.clone(),
            api_token: config.whatsapp_api_token.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.api_token.is_empty()
    }

    /// Send the booking confirmation message for one appointment.
    pub async fn send_booking_confirmation(
        &self,
        phone: &str,
        doctor_name: &str,
        appointment_date: DateTime<Utc>,
        time_slot: &str,
        meeting_link: Option<&str>,
    ) -> Result<(), AppointmentError> {
        let mut message = format!(
            "Your appointment with Dr. {} is confirmed for {} at {}.",
            doctor_name,
            appointment_date.format("%Y-%m-%d"),
            time_slot
        );
        if let Some(link) = meeting_link {
            message.push_str(&format!(" Join here: {}", link));
        }

        let url = format!("{}/v1/messages", self.api_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&json!({
                "to": phone,
                "body": message,
            }))
            .send()
            .await
            .map_err(|e| AppointmentError::NotificationError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppointmentError::NotificationError(format!(
                "WhatsApp gateway returned {}",
                response.status()
            )));
        }

        debug!("Booking confirmation sent to {}", phone);
        Ok(())
    }
}

/// Deliver the booking confirmation and record the delivery on the row.
///
/// Runs detached from the booking request. Every failure path logs and
/// returns; a missed message never unwinds a stored appointment, and
/// whatsapp_sent stays false so the gap is visible.
pub async fn deliver_booking_confirmation(
    notifier: WhatsAppNotifier,
    supabase: Arc<SupabaseClient>,
    appointment: Appointment,
    patient_phone: String,
    doctor_name: String,
    auth_token: String,
) {
    if !notifier.is_configured() {
        debug!(
            "WhatsApp gateway not configured, skipping confirmation for appointment {}",
            appointment.id
        );
        return;
    }

    let send_result = notifier
        .send_booking_confirmation(
            &patient_phone,
            &doctor_name,
            appointment.appointment_date,
            &appointment.time_slot,
            appointment.meeting_link.as_deref(),
        )
        .await;

    match send_result {
        Ok(()) => {
            if let Err(e) = mark_whatsapp_sent(&supabase, &appointment, &auth_token).await {
                warn!(
                    "Confirmation for appointment {} sent but whatsapp_sent not recorded: {}",
                    appointment.id, e
                );
            }
        }
        Err(e) => {
            warn!(
                "Failed to send confirmation for appointment {}: {}",
                appointment.id, e
            );
        }
    }
}

async fn mark_whatsapp_sent(
    supabase: &SupabaseClient,
    appointment: &Appointment,
    auth_token: &str,
) -> Result<(), AppointmentError> {
    let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
    let body = json!({
        "whatsapp_sent": true,
        "updated_at": Utc::now().to_rfc3339(),
    });

    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));

    let _: Vec<Value> = supabase
        .request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(headers),
        )
        .await
        .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

    Ok(())
}
