//! Durable record of appointments.
//!
//! Status changes and schedule rebinds are conditional writes: they only apply
//! while the stored row still has the expected state, so two concurrent
//! cancellations cannot both succeed and free the same unit twice.

mod memory;
mod supabase;

pub use memory::InMemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, ScheduleBinding};

/// Result of a conditional appointment write.
#[derive(Debug, Clone, PartialEq)]
pub enum AppointmentWrite {
    Applied(Appointment),
    /// The row no longer matched the expected state; carries what is stored now.
    Stale(Appointment),
    Missing,
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Fails with `BookingCodeCollision` on a taken code and `DuplicateBooking`
    /// when the patient already has a pending visit with the doctor that day.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn find_pending(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, AppointmentError>;

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<AppointmentWrite, AppointmentError>;

    /// Applies only while the appointment is pending and still bound to `expected_schedule_id`.
    async fn rebind_schedule(
        &self,
        appointment_id: Uuid,
        expected_schedule_id: Uuid,
        binding: &ScheduleBinding,
    ) -> Result<AppointmentWrite, AppointmentError>;

    /// Applies only while the appointment is pending.
    async fn update_symptoms(
        &self,
        appointment_id: Uuid,
        symptoms: Option<String>,
    ) -> Result<AppointmentWrite, AppointmentError>;

    /// Newest first.
    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn count_pending_for_schedule(&self, schedule_id: Uuid) -> Result<i64, AppointmentError>;

    /// True when any appointment, whatever its status, is bound to the schedule.
    async fn any_for_schedule(&self, schedule_id: Uuid) -> Result<bool, AppointmentError>;
}
