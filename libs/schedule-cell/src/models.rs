// libs/schedule-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;

/// Upper bound accepted for a single work block's quota.
pub const MAX_PATIENTS_LIMIT: i32 = 500;

// ==============================================================================
// CORE SCHEDULE MODELS
// ==============================================================================

/// A doctor's bookable work block with a fixed patient quota.
///
/// `current_patients` is owned by the quota ledger; nothing else writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub max_patients: i32,
    pub current_patients: i32,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn remaining_quota(&self) -> i32 {
        (self.max_patients - self.current_patients).max(0)
    }

    pub fn is_open(&self) -> bool {
        self.status == ScheduleStatus::Open
    }

    pub fn has_free_quota(&self) -> bool {
        self.current_patients < self.max_patients
    }

    /// `0 <= current_patients <= max_patients`
    pub fn occupancy_in_bounds(&self) -> bool {
        self.current_patients >= 0 && self.current_patients <= self.max_patients
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlot {
    Morning,
    Afternoon,
    Evening,
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSlot::Morning => write!(f, "morning"),
            TimeSlot::Afternoon => write!(f, "afternoon"),
            TimeSlot::Evening => write!(f, "evening"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Open,
    Closed,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Open => write!(f, "open"),
            ScheduleStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Schedule as returned to callers, with the derived remaining quota.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub remaining_quota: i32,
}

impl From<Schedule> for ScheduleView {
    fn from(schedule: Schedule) -> Self {
        let remaining_quota = schedule.remaining_quota();
        Self { schedule, remaining_quota }
    }
}

// ==============================================================================
// REQUEST/QUERY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub schedule_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub max_patients: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCreateSchedulesRequest {
    pub schedules: Vec<CreateScheduleRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub doctor_id: Option<Uuid>,
    pub schedule_date: Option<NaiveDate>,
    pub time_slot: Option<TimeSlot>,
    pub max_patients: Option<i32>,
}

impl UpdateScheduleRequest {
    pub fn moves_slot(&self, current: &Schedule) -> bool {
        self.doctor_id.is_some_and(|d| d != current.doctor_id)
            || self.schedule_date.is_some_and(|d| d != current.schedule_date)
            || self.time_slot.is_some_and(|t| t != current.time_slot)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleStatusRequest {
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleQuery {
    pub doctor_id: Option<Uuid>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub time_slot: Option<TimeSlot>,
    pub status: Option<ScheduleStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

impl ScheduleQuery {
    pub fn matches(&self, schedule: &Schedule) -> bool {
        self.doctor_id.map_or(true, |d| schedule.doctor_id == d)
            && self.from_date.map_or(true, |d| schedule.schedule_date >= d)
            && self.to_date.map_or(true, |d| schedule.schedule_date <= d)
            && self.time_slot.map_or(true, |t| schedule.time_slot == t)
            && self.status.map_or(true, |s| schedule.status == s)
    }
}

/// Field changes applied by administrative edits. Occupancy is deliberately absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<TimeSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_patients: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ScheduleStatus>,
}

impl ScheduleChanges {
    pub fn apply_to(&self, schedule: &mut Schedule, now: DateTime<Utc>) {
        if let Some(doctor_id) = self.doctor_id {
            schedule.doctor_id = doctor_id;
        }
        if let Some(date) = self.schedule_date {
            schedule.schedule_date = date;
        }
        if let Some(slot) = self.time_slot {
            schedule.time_slot = slot;
        }
        if let Some(max) = self.max_patients {
            schedule.max_patients = max;
        }
        if let Some(status) = self.status {
            schedule.status = status;
        }
        schedule.updated_at = now;
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Doctor already has a schedule for this date and time slot")]
    DuplicateSchedule,

    #[error("Schedule is closed for booking")]
    ScheduleClosed,

    #[error("Schedule has no remaining quota")]
    CapacityExceeded,

    #[error("Invalid schedule state: {0}")]
    InvalidState(String),

    #[error("Quota invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl ScheduleError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::NotFound | ScheduleError::DoctorNotFound => "NOT_FOUND",
            ScheduleError::DuplicateSchedule => "DUPLICATE_SCHEDULE",
            ScheduleError::ScheduleClosed => "SCHEDULE_CLOSED",
            ScheduleError::CapacityExceeded => "CAPACITY_EXCEEDED",
            ScheduleError::InvalidState(_) => "INVALID_STATE",
            ScheduleError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            ScheduleError::ValidationError(_) => "VALIDATION_ERROR",
            ScheduleError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::DatabaseError(_))
    }
}

impl From<SupabaseError> for ScheduleError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::UniqueViolation { .. } => ScheduleError::DuplicateSchedule,
            SupabaseError::ForeignKeyViolation(_) => {
                ScheduleError::InvalidState("schedule is still referenced by appointments".to_string())
            }
            other => ScheduleError::DatabaseError(other.to_string()),
        }
    }
}
