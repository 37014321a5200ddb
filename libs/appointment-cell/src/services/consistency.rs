// libs/appointment-cell/src/services/consistency.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use schedule_cell::ScheduleStore;
use shared_utils::clock::Clock;

use crate::models::{AppointmentError, ScheduleAudit};
use crate::store::AppointmentStore;

/// Read-only check that a schedule's occupancy matches its pending appointments.
pub struct SchedulingConsistencyService {
    schedules: Arc<dyn ScheduleStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
}

impl SchedulingConsistencyService {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedules,
            appointments,
            clock,
        }
    }

    #[instrument(skip(self))]
    pub async fn audit_schedule(&self, schedule_id: Uuid) -> Result<ScheduleAudit, AppointmentError> {
        let schedule = self
            .schedules
            .get(schedule_id)
            .await?
            .ok_or(AppointmentError::ScheduleNotFound)?;
        let pending = self.appointments.count_pending_for_schedule(schedule_id).await?;

        let drift = i64::from(schedule.current_patients) - pending;
        let audit = ScheduleAudit {
            schedule_id,
            max_patients: schedule.max_patients,
            current_patients: schedule.current_patients,
            pending_appointments: pending,
            drift,
            consistent: drift == 0 && schedule.occupancy_in_bounds(),
            checked_at: self.clock.now(),
        };

        if audit.consistent {
            info!("Schedule {} is consistent ({} pending)", schedule_id, pending);
        } else {
            warn!(
                "Schedule {} drifted: occupancy {} vs {} pending appointments",
                schedule_id, schedule.current_patients, pending
            );
        }
        Ok(audit)
    }
}
