// libs/schedule-cell/src/services/ledger.rs
//
// Quota ledger: the only code path that changes a schedule's occupancy.
//

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::models::{Schedule, ScheduleError};
use crate::store::{ScheduleStore, WriteOutcome};

const DEFAULT_RESERVE_ATTEMPTS: u32 = 3;

/// Keeps `0 <= current_patients <= max_patients` for every schedule.
///
/// Callers decide when a unit is taken or given back; the ledger only
/// guarantees the arithmetic. Every release names the hold it gives back, and
/// a hold is released at most once, so a caller may repeat a release whose
/// outcome it never saw.
pub struct QuotaLedger {
    store: Arc<dyn ScheduleStore>,
    reserve_attempts: u32,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn ScheduleStore>) -> Self {
        Self {
            store,
            reserve_attempts: DEFAULT_RESERVE_ATTEMPTS,
        }
    }

    pub fn with_reserve_attempts(store: Arc<dyn ScheduleStore>, reserve_attempts: u32) -> Self {
        Self {
            store,
            reserve_attempts: reserve_attempts.max(1),
        }
    }

    /// Take one occupancy unit. On failure nothing changes.
    #[instrument(skip(self))]
    pub async fn reserve(&self, schedule_id: Uuid) -> Result<Schedule, ScheduleError> {
        for attempt in 1..=self.reserve_attempts {
            match self.store.try_reserve(schedule_id).await? {
                WriteOutcome::Applied(schedule) => {
                    self.verify_bounds(&schedule, "reserve")?;
                    debug!(
                        "Reserved unit on schedule {} ({}/{})",
                        schedule_id, schedule.current_patients, schedule.max_patients
                    );
                    return Ok(schedule);
                }
                WriteOutcome::Missing => return Err(ScheduleError::NotFound),
                WriteOutcome::Rejected(schedule) if !schedule.is_open() => {
                    warn!("Reservation rejected, schedule {} is closed", schedule_id);
                    return Err(ScheduleError::ScheduleClosed);
                }
                WriteOutcome::Rejected(schedule) if !schedule.has_free_quota() => {
                    warn!(
                        "Reservation rejected, schedule {} is full ({}/{})",
                        schedule_id, schedule.current_patients, schedule.max_patients
                    );
                    return Err(ScheduleError::CapacityExceeded);
                }
                WriteOutcome::Rejected(_) => {
                    // A unit was freed between the conditional write and the follow-up read.
                    debug!(
                        "Reservation on schedule {} raced a release, attempt {}/{}",
                        schedule_id, attempt, self.reserve_attempts
                    );
                }
            }
        }

        warn!("Reservation on schedule {} kept racing, reporting it as full", schedule_id);
        Err(ScheduleError::CapacityExceeded)
    }

    /// Give back the unit taken for `hold_id`. Releasing an empty schedule is a caller bug.
    #[instrument(skip(self))]
    pub async fn release(&self, schedule_id: Uuid, hold_id: Uuid) -> Result<Schedule, ScheduleError> {
        match self.store.try_release(schedule_id, hold_id).await? {
            WriteOutcome::Applied(schedule) => {
                self.verify_bounds(&schedule, "release")?;
                debug!(
                    "Released unit on schedule {} ({}/{})",
                    schedule_id, schedule.current_patients, schedule.max_patients
                );
                Ok(schedule)
            }
            WriteOutcome::Missing => Err(ScheduleError::NotFound),
            WriteOutcome::Rejected(schedule) => {
                error!(
                    "Refusing to release schedule {} below zero (current {})",
                    schedule_id, schedule.current_patients
                );
                Err(ScheduleError::InvariantViolation(format!(
                    "release would take schedule {} below zero",
                    schedule_id
                )))
            }
        }
    }

    fn verify_bounds(&self, schedule: &Schedule, operation: &str) -> Result<(), ScheduleError> {
        if schedule.occupancy_in_bounds() {
            return Ok(());
        }
        error!(
            "Occupancy out of bounds after {} on schedule {}: {}/{}",
            operation, schedule.id, schedule.current_patients, schedule.max_patients
        );
        Err(ScheduleError::InvariantViolation(format!(
            "schedule {} holds {} of {} after {}",
            schedule.id, schedule.current_patients, schedule.max_patients, operation
        )))
    }
}
