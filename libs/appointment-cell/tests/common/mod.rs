#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use appointment_cell::{
    AppointmentBookingService, AppointmentStore, BookingDependencies, CreateAppointmentRequest,
    InMemoryAppointmentStore, SchedulingConsistencyService,
};
use schedule_cell::{InMemoryScheduleStore, Schedule, ScheduleService, ScheduleStatus, ScheduleStore, TimeSlot};
use shared_database::InMemoryDirectory;
use shared_utils::clock::FixedClock;

pub fn day(month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, d).unwrap()
}

/// In-memory clinic with one doctor; the clock reads 2024-05-20.
pub struct Clinic {
    pub schedules: Arc<InMemoryScheduleStore>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub clock: Arc<FixedClock>,
    pub doctor_id: Uuid,
}

impl Clinic {
    pub async fn new() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let doctor = directory.add_doctor("Dr. Wang").await;
        Self {
            schedules: Arc::new(InMemoryScheduleStore::new()),
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            directory,
            clock: Arc::new(FixedClock::on(day(5, 20))),
            doctor_id: doctor.id,
        }
    }

    pub fn deps(&self) -> BookingDependencies {
        BookingDependencies {
            appointments: self.appointments.clone(),
            schedules: self.schedules.clone(),
            patients: self.directory.clone(),
            doctors: self.directory.clone(),
            clock: self.clock.clone(),
        }
    }

    pub fn booking(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(self.deps())
    }

    /// Schedule administration that sees this clinic's appointments.
    pub fn schedule_admin(&self) -> ScheduleService {
        ScheduleService::new(
            self.schedules.clone(),
            self.directory.clone(),
            self.appointments.clone(),
            self.clock.clone(),
        )
    }

    pub fn consistency(&self) -> SchedulingConsistencyService {
        SchedulingConsistencyService::new(self.schedules.clone(), self.appointments.clone(), self.clock.clone())
    }

    pub async fn schedule(&self, date: NaiveDate, slot: TimeSlot, max_patients: i32) -> Schedule {
        self.schedule_for(self.doctor_id, date, slot, max_patients).await
    }

    pub async fn schedule_for(&self, doctor_id: Uuid, date: NaiveDate, slot: TimeSlot, max_patients: i32) -> Schedule {
        let now = Utc::now();
        self.schedules
            .insert(Schedule {
                id: Uuid::new_v4(),
                doctor_id,
                schedule_date: date,
                time_slot: slot,
                max_patients,
                current_patients: 0,
                status: ScheduleStatus::Open,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub async fn patient(&self, name: &str) -> Uuid {
        self.directory.add_patient(name, None).await.id
    }

    pub fn request(&self, patient_id: Uuid, schedule: &Schedule) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id,
            doctor_id: schedule.doctor_id,
            schedule_id: schedule.id,
            symptoms: Some("persistent cough".to_string()),
        }
    }

    pub async fn occupancy(&self, schedule_id: Uuid) -> i32 {
        self.schedules.get(schedule_id).await.unwrap().unwrap().current_patients
    }

    pub async fn pending(&self, schedule_id: Uuid) -> i64 {
        self.appointments.count_pending_for_schedule(schedule_id).await.unwrap()
    }
}
