use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use schedule_cell::{ScheduleError, ScheduleReferences};

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, ScheduleBinding};
use crate::store::{AppointmentStore, AppointmentWrite};

/// Appointment store kept in process memory. Uniqueness checks and
/// conditional writes run under one write-lock acquisition.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.appointments.read().await.is_empty()
    }
}

fn pending_visit_taken(
    appointments: &HashMap<Uuid, Appointment>,
    patient_id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    exclude: Option<Uuid>,
) -> bool {
    appointments.values().any(|a| {
        Some(a.id) != exclude
            && a.is_pending()
            && a.patient_id == patient_id
            && a.doctor_id == doctor_id
            && a.appointment_date == date
    })
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        if appointments.values().any(|a| a.appointment_no == appointment.appointment_no) {
            return Err(AppointmentError::BookingCodeCollision);
        }
        if appointment.is_pending()
            && pending_visit_taken(
                &appointments,
                appointment.patient_id,
                appointment.doctor_id,
                appointment.appointment_date,
                None,
            )
        {
            return Err(AppointmentError::DuplicateBooking);
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find_pending(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .find(|a| {
                Some(a.id) != exclude
                    && a.is_pending()
                    && a.patient_id == patient_id
                    && a.doctor_id == doctor_id
                    && a.appointment_date == date
            })
            .cloned())
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<AppointmentWrite, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let Some(current) = appointments.get(&appointment_id).cloned() else {
            return Ok(AppointmentWrite::Missing);
        };
        if current.status != from {
            return Ok(AppointmentWrite::Stale(current));
        }
        if to == AppointmentStatus::Pending
            && pending_visit_taken(
                &appointments,
                current.patient_id,
                current.doctor_id,
                current.appointment_date,
                Some(appointment_id),
            )
        {
            return Err(AppointmentError::DuplicateBooking);
        }

        let mut updated = current;
        updated.status = to;
        updated.updated_at = Utc::now();
        appointments.insert(appointment_id, updated.clone());
        Ok(AppointmentWrite::Applied(updated))
    }

    async fn rebind_schedule(
        &self,
        appointment_id: Uuid,
        expected_schedule_id: Uuid,
        binding: &ScheduleBinding,
    ) -> Result<AppointmentWrite, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let Some(current) = appointments.get(&appointment_id).cloned() else {
            return Ok(AppointmentWrite::Missing);
        };
        if !current.is_pending() || current.schedule_id != expected_schedule_id {
            return Ok(AppointmentWrite::Stale(current));
        }
        if pending_visit_taken(
            &appointments,
            current.patient_id,
            current.doctor_id,
            binding.appointment_date,
            Some(appointment_id),
        ) {
            return Err(AppointmentError::DuplicateBooking);
        }

        let mut updated = current;
        updated.schedule_id = binding.schedule_id;
        updated.appointment_date = binding.appointment_date;
        updated.time_slot = binding.time_slot;
        updated.quota_hold_id = binding.quota_hold_id;
        updated.updated_at = Utc::now();
        appointments.insert(appointment_id, updated.clone());
        Ok(AppointmentWrite::Applied(updated))
    }

    async fn update_symptoms(
        &self,
        appointment_id: Uuid,
        symptoms: Option<String>,
    ) -> Result<AppointmentWrite, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let Some(current) = appointments.get_mut(&appointment_id) else {
            return Ok(AppointmentWrite::Missing);
        };
        if !current.is_pending() {
            return Ok(AppointmentWrite::Stale(current.clone()));
        }
        current.symptoms = symptoms;
        current.updated_at = Utc::now();
        Ok(AppointmentWrite::Applied(current.clone()))
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut rows: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_pending_for_schedule(&self, schedule_id: Uuid) -> Result<i64, AppointmentError> {
        let count = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.schedule_id == schedule_id && a.is_pending())
            .count();
        Ok(count as i64)
    }

    async fn any_for_schedule(&self, schedule_id: Uuid) -> Result<bool, AppointmentError> {
        Ok(self
            .appointments
            .read()
            .await
            .values()
            .any(|a| a.schedule_id == schedule_id))
    }
}

#[async_trait]
impl ScheduleReferences for InMemoryAppointmentStore {
    async fn is_referenced(&self, schedule_id: Uuid) -> Result<bool, ScheduleError> {
        self.any_for_schedule(schedule_id)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }
}
