// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use schedule_cell::{Schedule, ScheduleError, TimeSlot};
use shared_database::SupabaseError;

/// Longest symptom note accepted, in characters.
pub const MAX_SYMPTOMS_LENGTH: usize = 1000;

/// Unique constraint on the booking code.
pub const APPOINTMENT_NO_CONSTRAINT: &str = "appointments_appointment_no_key";
/// Partial unique index: one pending visit per (patient, doctor, date).
pub const PENDING_VISIT_CONSTRAINT: &str = "appointments_pending_visit_key";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    /// Human-readable booking code.
    pub appointment_no: String,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
    /// Copied from the schedule when booked or rescheduled.
    pub appointment_date: NaiveDate,
    pub time_slot: TimeSlot,
    #[serde(default)]
    pub symptoms: Option<String>,
    pub status: AppointmentStatus,
    /// Names the occupancy unit this appointment holds on its schedule. A new
    /// hold is taken on every booking and reschedule; releases quote it.
    pub quota_hold_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_pending(&self) -> bool {
        self.status == AppointmentStatus::Pending
    }

    /// True once the visit day is behind `today`. The day itself still counts as upcoming.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.appointment_date < today
    }
}

/// Stored as an integer: 0 cancelled, 1 pending, 2 completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i32", into = "i32")]
pub enum AppointmentStatus {
    Cancelled,
    Pending,
    Completed,
}

impl AppointmentStatus {
    pub fn code(self) -> i32 {
        match self {
            AppointmentStatus::Cancelled => 0,
            AppointmentStatus::Pending => 1,
            AppointmentStatus::Completed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AppointmentStatus::Pending)
    }
}

impl TryFrom<i32> for AppointmentStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AppointmentStatus::Cancelled),
            1 => Ok(AppointmentStatus::Pending),
            2 => Ok(AppointmentStatus::Completed),
            other => Err(format!("unknown appointment status {}", other)),
        }
    }
}

impl From<AppointmentStatus> for i32 {
    fn from(status: AppointmentStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// The schedule-derived part of an appointment, rewritten together on reschedule.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleBinding {
    pub schedule_id: Uuid,
    pub appointment_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub quota_hold_id: Uuid,
}

impl ScheduleBinding {
    /// Binding to `schedule` through a freshly reserved hold.
    pub fn new(schedule: &Schedule, quota_hold_id: Uuid) -> Self {
        Self {
            schedule_id: schedule.id,
            appointment_date: schedule.schedule_date,
            time_slot: schedule.time_slot,
            quota_hold_id,
        }
    }
}

impl From<&Appointment> for ScheduleBinding {
    fn from(appointment: &Appointment) -> Self {
        Self {
            schedule_id: appointment.schedule_id,
            appointment_date: appointment.appointment_date,
            time_slot: appointment.time_slot,
            quota_hold_id: appointment.quota_hold_id,
        }
    }
}

/// Occupancy of a schedule compared against the pending appointments bound to it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleAudit {
    pub schedule_id: Uuid,
    pub max_patients: i32,
    pub current_patients: i32,
    pub pending_appointments: i64,
    /// `current_patients - pending_appointments`; non-zero means a leaked or missing unit.
    pub drift: i64,
    pub consistent: bool,
    pub checked_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub schedule_id: Option<Uuid>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

impl AppointmentSearchQuery {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |p| appointment.patient_id == p)
            && self.doctor_id.map_or(true, |d| appointment.doctor_id == d)
            && self.schedule_id.map_or(true, |s| appointment.schedule_id == s)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.from_date.map_or(true, |d| appointment.appointment_date >= d)
            && self.to_date.map_or(true, |d| appointment.appointment_date <= d)
    }
}

/// Trim a symptom note; blank notes are stored as absent.
pub fn normalize_symptoms(symptoms: Option<String>) -> Result<Option<String>, AppointmentError> {
    let Some(raw) = symptoms else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_SYMPTOMS_LENGTH {
        return Err(AppointmentError::ValidationError(format!(
            "symptoms must be at most {} characters",
            MAX_SYMPTOMS_LENGTH
        )));
    }
    Ok(Some(trimmed.to_string()))
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error("Schedule is closed for booking")]
    ScheduleClosed,

    #[error("Schedule has no remaining quota")]
    CapacityExceeded,

    #[error("Patient already has a pending appointment with this doctor on that day")]
    DuplicateBooking,

    #[error("Generated booking code is already taken, please retry")]
    BookingCodeCollision,

    #[error("Invalid appointment state: {0}")]
    InvalidState(String),

    #[error("Quota invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppointmentError::NotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::ScheduleNotFound => "NOT_FOUND",
            AppointmentError::ScheduleClosed => "SCHEDULE_CLOSED",
            AppointmentError::CapacityExceeded => "CAPACITY_EXCEEDED",
            AppointmentError::DuplicateBooking | AppointmentError::BookingCodeCollision => "DUPLICATE_BOOKING",
            AppointmentError::InvalidState(_) => "INVALID_STATE",
            AppointmentError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            AppointmentError::ValidationError(_) => "VALIDATION_ERROR",
            AppointmentError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppointmentError::BookingCodeCollision | AppointmentError::DatabaseError(_)
        )
    }
}

impl From<ScheduleError> for AppointmentError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound => AppointmentError::ScheduleNotFound,
            ScheduleError::DoctorNotFound => AppointmentError::DoctorNotFound,
            ScheduleError::ScheduleClosed => AppointmentError::ScheduleClosed,
            ScheduleError::CapacityExceeded => AppointmentError::CapacityExceeded,
            ScheduleError::InvalidState(msg) => AppointmentError::InvalidState(msg),
            ScheduleError::InvariantViolation(msg) => AppointmentError::InvariantViolation(msg),
            ScheduleError::ValidationError(msg) => AppointmentError::ValidationError(msg),
            ScheduleError::DuplicateSchedule => {
                AppointmentError::InvalidState("schedule slot is already taken".to_string())
            }
            ScheduleError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

impl From<SupabaseError> for AppointmentError {
    fn from(err: SupabaseError) -> Self {
        if err.violates(APPOINTMENT_NO_CONSTRAINT) {
            return AppointmentError::BookingCodeCollision;
        }
        match err {
            SupabaseError::UniqueViolation { .. } => AppointmentError::DuplicateBooking,
            SupabaseError::ForeignKeyViolation(_) => AppointmentError::InvalidState(
                "referenced patient, doctor or schedule no longer exists".to_string(),
            ),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_round_trips_through_integers() {
        assert_eq!(serde_json::to_value(AppointmentStatus::Pending).unwrap(), json!(1));
        let cancelled: AppointmentStatus = serde_json::from_value(json!(0)).unwrap();
        assert_eq!(cancelled, AppointmentStatus::Cancelled);
        assert!(serde_json::from_value::<AppointmentStatus>(json!(7)).is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!AppointmentStatus::Pending.is_terminal());
        assert!(AppointmentStatus::Cancelled.is_terminal());
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn symptoms_are_trimmed_and_bounded() {
        assert_eq!(normalize_symptoms(Some("  fever ".to_string())).unwrap(), Some("fever".to_string()));
        assert_eq!(normalize_symptoms(Some("   ".to_string())).unwrap(), None);
        assert_eq!(normalize_symptoms(None).unwrap(), None);

        let long = "x".repeat(MAX_SYMPTOMS_LENGTH + 1);
        assert!(matches!(
            normalize_symptoms(Some(long)),
            Err(AppointmentError::ValidationError(_))
        ));
    }

    #[test]
    fn code_collisions_share_the_duplicate_kind_but_are_retryable() {
        assert_eq!(AppointmentError::BookingCodeCollision.kind(), "DUPLICATE_BOOKING");
        assert!(AppointmentError::BookingCodeCollision.is_retryable());
        assert!(!AppointmentError::DuplicateBooking.is_retryable());
    }

    #[test]
    fn store_violations_map_by_constraint() {
        let code = SupabaseError::UniqueViolation {
            constraint: Some(APPOINTMENT_NO_CONSTRAINT.to_string()),
            message: "duplicate".to_string(),
        };
        assert_eq!(AppointmentError::from(code), AppointmentError::BookingCodeCollision);

        let visit = SupabaseError::UniqueViolation {
            constraint: Some(PENDING_VISIT_CONSTRAINT.to_string()),
            message: "duplicate".to_string(),
        };
        assert_eq!(AppointmentError::from(visit), AppointmentError::DuplicateBooking);
    }

    #[test]
    fn ledger_errors_keep_their_kind() {
        assert_eq!(
            AppointmentError::from(ScheduleError::CapacityExceeded).kind(),
            ScheduleError::CapacityExceeded.kind()
        );
        assert_eq!(AppointmentError::from(ScheduleError::NotFound), AppointmentError::ScheduleNotFound);
    }
}
