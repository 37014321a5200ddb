// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Appointment state machine: `Pending -> {Cancelled, Completed}`, both terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidState(format!(
                "cannot move a {} appointment to {}",
                current_status, new_status
            )));
        }
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![AppointmentStatus::Cancelled, AppointmentStatus::Completed],
            // Terminal states
            AppointmentStatus::Cancelled | AppointmentStatus::Completed => vec![],
        }
    }

    /// Cancellation needs a pending appointment whose day has not passed.
    pub fn ensure_cancellable(&self, appointment: &Appointment, today: NaiveDate) -> Result<(), AppointmentError> {
        self.validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;
        if appointment.is_past(today) {
            return Err(AppointmentError::InvalidState(
                "cannot cancel an appointment whose date has passed".to_string(),
            ));
        }
        Ok(())
    }

    /// Edits and reschedules follow the same window as cancellation.
    pub fn ensure_modifiable(&self, appointment: &Appointment, today: NaiveDate) -> Result<(), AppointmentError> {
        if !appointment.is_pending() {
            return Err(AppointmentError::InvalidState(format!(
                "only pending appointments can be changed, this one is {}",
                appointment.status
            )));
        }
        if appointment.is_past(today) {
            return Err(AppointmentError::InvalidState(
                "cannot change an appointment whose date has passed".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use schedule_cell::TimeSlot;
    use uuid::Uuid;

    fn appointment(status: AppointmentStatus, date: NaiveDate) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            appointment_no: "A20240601000001".to_string(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            appointment_date: date,
            time_slot: TimeSlot::Morning,
            symptoms: None,
            status,
            quota_hold_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn terminal_states_have_no_exits() {
        let lifecycle = AppointmentLifecycleService::new();
        for terminal in [AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert!(lifecycle.get_valid_transitions(terminal).is_empty());
            assert!(lifecycle
                .validate_status_transition(terminal, AppointmentStatus::Pending)
                .is_err());
        }
    }

    #[test]
    fn pending_can_be_cancelled_or_completed() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Completed)
            .is_ok());
    }

    #[test]
    fn cancellation_allowed_on_the_day_but_not_after() {
        let lifecycle = AppointmentLifecycleService::new();
        let booked = appointment(AppointmentStatus::Pending, day(5));

        assert!(lifecycle.ensure_cancellable(&booked, day(4)).is_ok());
        assert!(lifecycle.ensure_cancellable(&booked, day(5)).is_ok());
        assert!(matches!(
            lifecycle.ensure_cancellable(&booked, day(6)),
            Err(AppointmentError::InvalidState(_))
        ));
    }

    #[test]
    fn completed_appointments_cannot_be_modified() {
        let lifecycle = AppointmentLifecycleService::new();
        let done = appointment(AppointmentStatus::Completed, day(5));

        assert!(lifecycle.ensure_modifiable(&done, day(1)).is_err());
        assert!(lifecycle.ensure_cancellable(&done, day(1)).is_err());
    }
}
