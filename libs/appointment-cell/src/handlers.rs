// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, RateAppointmentRequest,
    UpdateActor, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::rating::AppointmentRatingService;
use crate::services::reporting::AppointmentReportingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorScheduleQuery {
    pub status: Option<AppointmentStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::InvalidDate(msg) => AppError::BadRequest(msg),
        AppointmentError::DoctorSlotTaken | AppointmentError::PatientSlotTaken => {
            AppError::BadRequest(e.to_string())
        }
        AppointmentError::InvalidStatusTransition(_, _)
        | AppointmentError::AppointmentTerminal(_) => AppError::BadRequest(e.to_string()),
        AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
        AppointmentError::ValidationError(msg) => AppError::BadRequest(msg),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        AppointmentError::NotificationError(msg) => AppError::Internal(msg),
    }
}

// ==============================================================================
// BOOKING AND LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();

    // Patients book for themselves only.
    if request.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to book appointments for this patient".to_string(),
        ));
    }

    let booking_service = AppointmentBookingService::new(&state);

    let details = booking_service
        .book_appointment(request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": details.appointment,
            "doctor": details.doctor,
            "patient": details.patient,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let details = booking_service
        .get_appointment_details(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    // Verify authorization - only the patient or doctor involved can view
    let is_patient = details.appointment.patient_id.to_string() == user.id;
    let is_doctor = details.appointment.doctor_id.to_string() == user.id;

    if !is_patient && !is_doctor {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!(details)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    // Get appointment to check authorization
    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;

    if !is_patient && !is_doctor {
        return Err(AppError::Forbidden(
            "Not authorized to update this appointment".to_string(),
        ));
    }

    // Which side of the appointment is calling decides the editable fields.
    let actor = if is_doctor {
        UpdateActor::Doctor
    } else {
        UpdateActor::Patient
    };

    let updated_appointment = booking_service
        .update_appointment(appointment_id, request, actor, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": updated_appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    // Get appointment to check authorization
    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    let is_patient = appointment.patient_id.to_string() == user.id;
    let is_doctor = appointment.doctor_id.to_string() == user.id;

    if !is_patient && !is_doctor {
        return Err(AppError::Forbidden(
            "Not authorized to cancel this appointment".to_string(),
        ));
    }

    let cancelled_appointment = booking_service
        .cancel_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled_appointment,
        "message": "Appointment cancelled successfully"
    })))
}

// ==============================================================================
// RATING AND REPORTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn rate_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    if appointment.patient_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Only the booking patient can rate this appointment".to_string(),
        ));
    }

    let rating_service = AppointmentRatingService::new(&state);

    let (rated_appointment, doctor_rating) = rating_service
        .rate_appointment(&appointment, request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": rated_appointment,
        "doctor_rating": doctor_rating,
        "message": "Thank you for your feedback"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment_stats(
    State(state): State<Arc<AppConfig>>,
    Query(params): Query<StatsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let requested_id = match (params.patient_id, params.doctor_id) {
        (Some(id), None) | (None, Some(id)) => id,
        _ => {
            return Err(AppError::BadRequest(
                "Provide exactly one of patient_id or doctor_id".to_string(),
            ))
        }
    };

    if requested_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Statistics are limited to your own appointments".to_string(),
        ));
    }

    let reporting_service = AppointmentReportingService::new(&state);

    let stats = reporting_service
        .get_appointment_stats(params.patient_id, params.doctor_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "stats": stats })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<DoctorScheduleQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Verify authorization - only the doctor themselves can view
    if doctor_id.to_string() != user.id {
        return Err(AppError::Forbidden(
            "Not authorized to view appointments for this doctor".to_string(),
        ));
    }

    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(10);
    if page < 1 || limit < 1 {
        return Err(AppError::BadRequest(
            "Page and limit must be positive".to_string(),
        ));
    }

    let reporting_service = AppointmentReportingService::new(&state);

    let schedule = reporting_service
        .get_doctor_appointments(doctor_id, params.status, page, limit, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "appointments": schedule.appointments,
        "page": schedule.page,
        "limit": schedule.limit,
        "total": schedule.total,
        "total_pages": schedule.total_pages
    })))
}
