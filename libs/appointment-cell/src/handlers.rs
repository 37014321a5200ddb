// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::{AppointmentBookingService, BookingDependencies, SchedulingConsistencyService};

/// Shared by every appointment handler.
pub struct AppointmentState {
    pub booking: AppointmentBookingService,
    pub consistency: SchedulingConsistencyService,
}

impl AppointmentState {
    pub fn new(deps: BookingDependencies, config: &AppConfig) -> Self {
        let consistency = SchedulingConsistencyService::new(
            Arc::clone(&deps.schedules),
            Arc::clone(&deps.appointments),
            Arc::clone(&deps.clock),
        );
        let booking = AppointmentBookingService::new(deps)
            .with_attempts(config.booking_code_attempts, config.ledger_release_attempts);
        Self { booking, consistency }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(BookingDependencies::from_config(config), config)
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let status = match &err {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::ScheduleNotFound => StatusCode::NOT_FOUND,
            AppointmentError::ScheduleClosed
            | AppointmentError::CapacityExceeded
            | AppointmentError::DuplicateBooking
            | AppointmentError::BookingCodeCollision
            | AppointmentError::InvalidState(_) => StatusCode::CONFLICT,
            AppointmentError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppointmentError::InvariantViolation(_) | AppointmentError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::rejected(status, err.kind(), err.to_string())
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DoctorAppointmentsQuery {
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// ACCESS CHECKS
// ==============================================================================

fn require_staff(user: &User) -> Result<(), AppError> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only clinic staff can perform this action".to_string()))
    }
}

/// Staff see everything; patients only their own records.
async fn ensure_patient_access(state: &AppointmentState, user: &User, patient_id: Uuid) -> Result<(), AppError> {
    if user.is_staff() {
        return Ok(());
    }
    match state.booking.resolve_patient(user).await? {
        Some(own) if own == patient_id => Ok(()),
        _ => Err(AppError::Forbidden(
            "Not authorized to access appointments of this patient".to_string(),
        )),
    }
}

async fn load_accessible(
    state: &AppointmentState,
    user: &User,
    appointment_id: Uuid,
) -> Result<Appointment, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;
    ensure_patient_access(state, user, appointment.patient_id).await?;
    Ok(appointment)
}

// ==============================================================================
// APPOINTMENT LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_patient_access(&state, &user, request.patient_id).await?;

    let appointment = state.booking.book_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    load_accessible(&state, &user, appointment_id).await?;

    let appointment = state.booking.update_appointment(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    load_accessible(&state, &user, appointment_id).await?;

    let appointment = state.booking.cancel_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointment = state.booking.complete_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

// ==============================================================================
// APPOINTMENT QUERY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = load_accessible(&state, &user, appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
    Query(mut query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_staff() {
        // Patients search within their own appointments only
        let own = state
            .booking
            .resolve_patient(&user)
            .await?
            .ok_or_else(|| AppError::Forbidden("No patient profile for this user".to_string()))?;
        query.patient_id = Some(own);
    }

    let appointments = state.booking.search_appointments(&query).await?;
    let total = appointments.len();

    Ok(Json(json!({
        "appointments": appointments,
        "total": total,
        "limit": query.limit,
        "offset": query.offset
    })))
}

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<Arc<AppointmentState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.my_appointments(&user).await?;
    let total = appointments.len();

    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(patient_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    ensure_patient_access(&state, &user, patient_id).await?;

    let appointments = state.booking.list_patient_appointments(patient_id).await?;
    let total = appointments.len();

    Ok(Json(json!({
        "patient_id": patient_id,
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<AppointmentState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Query(query): Query<DoctorAppointmentsQuery>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointments = state.booking.list_doctor_appointments(doctor_id, query.date).await?;
    let total = appointments.len();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn audit_schedule(
    State(state): State<Arc<AppointmentState>>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let audit = state.consistency.audit_schedule(schedule_id).await?;
    Ok(Json(json!(audit)))
}
