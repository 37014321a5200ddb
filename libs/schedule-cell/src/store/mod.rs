//! Durable record of schedules.
//!
//! Occupancy changes go through `try_reserve` / `try_release`, which the quota
//! ledger is the only caller of. Both must be a single conditional write
//! against the stored row: a read followed by an unconditional write lets two
//! concurrent bookings pass the same check.

mod memory;
mod supabase;

pub use memory::InMemoryScheduleStore;
pub use supabase::SupabaseScheduleStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Schedule, ScheduleChanges, ScheduleError, ScheduleQuery, TimeSlot};

/// Occupancy precondition for an administrative write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyGuard {
    Any,
    Empty,
    AtMost(i32),
}

impl OccupancyGuard {
    pub fn admits(&self, current_patients: i32) -> bool {
        match self {
            OccupancyGuard::Any => true,
            OccupancyGuard::Empty => current_patients == 0,
            OccupancyGuard::AtMost(limit) => current_patients <= *limit,
        }
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T = Schedule> {
    Applied(T),
    /// The row exists but its state did not satisfy the condition; carries that state.
    Rejected(Schedule),
    Missing,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get(&self, schedule_id: Uuid) -> Result<Option<Schedule>, ScheduleError>;

    async fn find_by_slot(
        &self,
        doctor_id: Uuid,
        schedule_date: NaiveDate,
        time_slot: TimeSlot,
    ) -> Result<Option<Schedule>, ScheduleError>;

    async fn list(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>, ScheduleError>;

    /// Fails with `DuplicateSchedule` when the (doctor, date, slot) triple is taken.
    async fn insert(&self, schedule: Schedule) -> Result<Schedule, ScheduleError>;

    async fn update_guarded(
        &self,
        schedule_id: Uuid,
        changes: &ScheduleChanges,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome, ScheduleError>;

    async fn delete_guarded(
        &self,
        schedule_id: Uuid,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome<()>, ScheduleError>;

    /// Increment occupancy iff the schedule is open and below its quota.
    async fn try_reserve(&self, schedule_id: Uuid) -> Result<WriteOutcome, ScheduleError>;

    /// Decrement occupancy iff it is above zero and `hold_id` has not been
    /// released before. A repeated hold id reports `Applied` with the current
    /// row and changes nothing, so a retry after a lost response is safe.
    async fn try_release(&self, schedule_id: Uuid, hold_id: Uuid) -> Result<WriteOutcome, ScheduleError>;
}

/// Whether any appointment, in any status, still points at a schedule.
#[async_trait]
pub trait ScheduleReferences: Send + Sync {
    async fn is_referenced(&self, schedule_id: Uuid) -> Result<bool, ScheduleError>;
}
