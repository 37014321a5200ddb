// libs/schedule-cell/src/handlers.rs
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

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    BatchCreateSchedulesRequest, CreateScheduleRequest, ScheduleError, ScheduleQuery, ScheduleView,
    UpdateScheduleRequest, UpdateScheduleStatusRequest,
};
use crate::services::ScheduleService;

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        let status = match &err {
            ScheduleError::NotFound | ScheduleError::DoctorNotFound => StatusCode::NOT_FOUND,
            ScheduleError::DuplicateSchedule
            | ScheduleError::ScheduleClosed
            | ScheduleError::CapacityExceeded
            | ScheduleError::InvalidState(_) => StatusCode::CONFLICT,
            ScheduleError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScheduleError::InvariantViolation(_) | ScheduleError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::rejected(status, err.kind(), err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct DoctorSchedulesQuery {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only administrators can manage schedules".to_string()))
    }
}

fn views(schedules: Vec<crate::models::Schedule>) -> Vec<ScheduleView> {
    schedules.into_iter().map(ScheduleView::from).collect()
}

// ==============================================================================
// ADMINISTRATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(service): State<Arc<ScheduleService>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;
    let schedule = service.create_schedule(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "schedule": ScheduleView::from(schedule),
            "message": "Schedule created successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn create_schedules_batch(
    State(service): State<Arc<ScheduleService>>,
    Extension(user): Extension<User>,
    Json(request): Json<BatchCreateSchedulesRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;
    let schedules = service.create_schedules_batch(request.schedules).await?;
    let created = schedules.len();

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "schedules": views(schedules),
            "created": created
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let schedule = service.update_schedule(schedule_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "schedule": ScheduleView::from(schedule)
    })))
}

#[axum::debug_handler]
pub async fn update_schedule_status(
    State(service): State<Arc<ScheduleService>>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleStatusRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    let schedule = service.update_schedule_status(schedule_id, request.status).await?;

    Ok(Json(json!({
        "success": true,
        "schedule": ScheduleView::from(schedule)
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path(schedule_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;
    service.delete_schedule(schedule_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule deleted"
    })))
}

// ==============================================================================
// QUERY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule(
    State(service): State<Arc<ScheduleService>>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = service.get_schedule(schedule_id).await?;
    Ok(Json(json!(ScheduleView::from(schedule))))
}

#[axum::debug_handler]
pub async fn list_schedules(
    State(service): State<Arc<ScheduleService>>,
    Query(query): Query<ScheduleQuery>,
) -> Result<Json<Value>, AppError> {
    let schedules = service.list_schedules(&query).await?;
    let total = schedules.len();

    Ok(Json(json!({
        "schedules": views(schedules),
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_schedules(
    State(service): State<Arc<ScheduleService>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorSchedulesQuery>,
) -> Result<Json<Value>, AppError> {
    let schedules = service
        .list_doctor_schedules(doctor_id, query.from_date, query.to_date)
        .await?;
    let total = schedules.len();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "schedules": views(schedules),
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_schedules_by_date(
    State(service): State<Arc<ScheduleService>>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Value>, AppError> {
    let schedules = service.list_schedules_by_date(date).await?;
    let total = schedules.len();

    Ok(Json(json!({
        "date": date,
        "schedules": views(schedules),
        "total": total
    })))
}
