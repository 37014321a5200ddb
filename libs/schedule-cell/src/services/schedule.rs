// libs/schedule-cell/src/services/schedule.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{DoctorDirectory, SupabaseClient, SupabaseDirectory};
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    CreateScheduleRequest, Schedule, ScheduleChanges, ScheduleError, ScheduleQuery, ScheduleStatus,
    UpdateScheduleRequest, MAX_PATIENTS_LIMIT,
};
use crate::store::{OccupancyGuard, ScheduleReferences, ScheduleStore, SupabaseScheduleStore, WriteOutcome};

/// Administrative operations on schedules. Never touches occupancy.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    doctors: Arc<dyn DoctorDirectory>,
    references: Arc<dyn ScheduleReferences>,
    clock: Arc<dyn Clock>,
}

impl ScheduleService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        doctors: Arc<dyn DoctorDirectory>,
        references: Arc<dyn ScheduleReferences>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            doctors,
            references,
            clock,
        }
    }

    /// Service backed by Supabase using the store key. `references` answers
    /// for the appointments, which this cell does not own.
    pub fn from_config(config: &AppConfig, references: Arc<dyn ScheduleReferences>) -> Self {
        let supabase = Arc::new(SupabaseClient::with_service_role(config));
        Self::new(
            Arc::new(SupabaseScheduleStore::new(Arc::clone(&supabase))),
            Arc::new(SupabaseDirectory::new(supabase)),
            references,
            Arc::new(SystemClock),
        )
    }

    pub fn store(&self) -> Arc<dyn ScheduleStore> {
        Arc::clone(&self.store)
    }

    #[instrument(skip(self))]
    pub async fn create_schedule(&self, request: CreateScheduleRequest) -> Result<Schedule, ScheduleError> {
        validate_max_patients(request.max_patients)?;
        self.ensure_doctor_exists(request.doctor_id).await?;
        self.ensure_slot_free(request.doctor_id, request.schedule_date, request.time_slot, None)
            .await?;

        let schedule = self.store.insert(self.new_schedule(&request)).await?;
        info!(
            "Created schedule {} for doctor {} on {} {}",
            schedule.id, schedule.doctor_id, schedule.schedule_date, schedule.time_slot
        );
        Ok(schedule)
    }

    /// All-or-nothing: any failure removes the schedules already inserted by this call.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn create_schedules_batch(
        &self,
        requests: Vec<CreateScheduleRequest>,
    ) -> Result<Vec<Schedule>, ScheduleError> {
        if requests.is_empty() {
            return Err(ScheduleError::ValidationError("Batch contains no schedules".to_string()));
        }

        let mut seen = HashSet::new();
        for request in &requests {
            validate_max_patients(request.max_patients)?;
            if !seen.insert((request.doctor_id, request.schedule_date, request.time_slot)) {
                return Err(ScheduleError::DuplicateSchedule);
            }
        }
        let doctors: HashSet<Uuid> = requests.iter().map(|r| r.doctor_id).collect();
        for doctor_id in doctors {
            self.ensure_doctor_exists(doctor_id).await?;
        }
        for request in &requests {
            self.ensure_slot_free(request.doctor_id, request.schedule_date, request.time_slot, None)
                .await?;
        }

        let mut created = Vec::with_capacity(requests.len());
        for request in &requests {
            match self.store.insert(self.new_schedule(request)).await {
                Ok(schedule) => created.push(schedule),
                Err(err) => {
                    warn!("Batch insert failed after {} schedules, rolling back: {}", created.len(), err);
                    self.roll_back(&created).await;
                    return Err(err);
                }
            }
        }

        info!("Created {} schedules in batch", created.len());
        Ok(created)
    }

    pub async fn get_schedule(&self, schedule_id: Uuid) -> Result<Schedule, ScheduleError> {
        self.store.get(schedule_id).await?.ok_or(ScheduleError::NotFound)
    }

    pub async fn list_schedules(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>, ScheduleError> {
        debug!("Listing schedules with filters: {:?}", query);
        self.store.list(query).await
    }

    /// Open schedules of one doctor, optionally within a date range.
    pub async fn list_doctor_schedules(
        &self,
        doctor_id: Uuid,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<Vec<Schedule>, ScheduleError> {
        let query = ScheduleQuery {
            doctor_id: Some(doctor_id),
            from_date,
            to_date,
            status: Some(ScheduleStatus::Open),
            ..ScheduleQuery::default()
        };
        self.store.list(&query).await
    }

    /// Open schedules on a given day.
    pub async fn list_schedules_by_date(&self, date: NaiveDate) -> Result<Vec<Schedule>, ScheduleError> {
        let query = ScheduleQuery {
            from_date: Some(date),
            to_date: Some(date),
            status: Some(ScheduleStatus::Open),
            ..ScheduleQuery::default()
        };
        self.store.list(&query).await
    }

    #[instrument(skip(self))]
    pub async fn update_schedule(
        &self,
        schedule_id: Uuid,
        request: UpdateScheduleRequest,
    ) -> Result<Schedule, ScheduleError> {
        let existing = self.get_schedule(schedule_id).await?;

        if let Some(max) = request.max_patients {
            validate_max_patients(max)?;
            if max < existing.current_patients {
                return Err(ScheduleError::InvalidState(format!(
                    "max_patients {} is below the {} patients already booked",
                    max, existing.current_patients
                )));
            }
        }

        let moves_slot = request.moves_slot(&existing);
        if moves_slot {
            if existing.current_patients > 0 {
                return Err(ScheduleError::InvalidState(
                    "cannot move a schedule that already has bookings".to_string(),
                ));
            }
            let doctor_id = request.doctor_id.unwrap_or(existing.doctor_id);
            if doctor_id != existing.doctor_id {
                self.ensure_doctor_exists(doctor_id).await?;
            }
            self.ensure_slot_free(
                doctor_id,
                request.schedule_date.unwrap_or(existing.schedule_date),
                request.time_slot.unwrap_or(existing.time_slot),
                Some(schedule_id),
            )
            .await?;
        }

        let changes = ScheduleChanges {
            doctor_id: request.doctor_id,
            schedule_date: request.schedule_date,
            time_slot: request.time_slot,
            max_patients: request.max_patients,
            status: None,
        };
        // The guard re-checks occupancy inside the write so a booking landing
        // after the read above cannot be stranded.
        let guard = match (moves_slot, request.max_patients) {
            (true, _) => OccupancyGuard::Empty,
            (false, Some(max)) => OccupancyGuard::AtMost(max),
            (false, None) => OccupancyGuard::Any,
        };

        match self.store.update_guarded(schedule_id, &changes, guard).await? {
            WriteOutcome::Applied(schedule) => {
                info!("Updated schedule {}", schedule_id);
                Ok(schedule)
            }
            WriteOutcome::Missing => Err(ScheduleError::NotFound),
            WriteOutcome::Rejected(current) => Err(ScheduleError::InvalidState(format!(
                "schedule {} gained bookings during the update ({} booked)",
                schedule_id, current.current_patients
            ))),
        }
    }

    /// Reopening is always allowed; closing requires an empty schedule.
    #[instrument(skip(self))]
    pub async fn update_schedule_status(
        &self,
        schedule_id: Uuid,
        status: ScheduleStatus,
    ) -> Result<Schedule, ScheduleError> {
        let changes = ScheduleChanges {
            status: Some(status),
            ..ScheduleChanges::default()
        };
        let guard = match status {
            ScheduleStatus::Closed => OccupancyGuard::Empty,
            ScheduleStatus::Open => OccupancyGuard::Any,
        };

        match self.store.update_guarded(schedule_id, &changes, guard).await? {
            WriteOutcome::Applied(schedule) => {
                info!("Schedule {} is now {}", schedule_id, status);
                Ok(schedule)
            }
            WriteOutcome::Missing => Err(ScheduleError::NotFound),
            WriteOutcome::Rejected(current) => {
                warn!("Refusing to close schedule {} with {} bookings", schedule_id, current.current_patients);
                Err(ScheduleError::InvalidState(format!(
                    "schedule has {} active bookings and cannot be closed",
                    current.current_patients
                )))
            }
        }
    }

    pub async fn close_schedule(&self, schedule_id: Uuid) -> Result<Schedule, ScheduleError> {
        self.update_schedule_status(schedule_id, ScheduleStatus::Closed).await
    }

    /// Only schedules no appointment has ever been bound to can go; cancelled
    /// and completed appointments keep their schedule alive.
    #[instrument(skip(self))]
    pub async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), ScheduleError> {
        if self.references.is_referenced(schedule_id).await? {
            warn!("Refusing to delete schedule {} that appointments still reference", schedule_id);
            return Err(ScheduleError::InvalidState(
                "schedule is referenced by appointments and cannot be deleted".to_string(),
            ));
        }
        match self.store.delete_guarded(schedule_id, OccupancyGuard::Empty).await? {
            WriteOutcome::Applied(()) => {
                info!("Deleted schedule {}", schedule_id);
                Ok(())
            }
            WriteOutcome::Missing => Err(ScheduleError::NotFound),
            WriteOutcome::Rejected(current) => Err(ScheduleError::InvalidState(format!(
                "schedule has {} active bookings and cannot be deleted",
                current.current_patients
            ))),
        }
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn new_schedule(&self, request: &CreateScheduleRequest) -> Schedule {
        let now = self.clock.now();
        Schedule {
            id: Uuid::new_v4(),
            doctor_id: request.doctor_id,
            schedule_date: request.schedule_date,
            time_slot: request.time_slot,
            max_patients: request.max_patients,
            current_patients: 0,
            status: ScheduleStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    async fn ensure_doctor_exists(&self, doctor_id: Uuid) -> Result<(), ScheduleError> {
        match self.doctors.find_doctor(doctor_id).await? {
            Some(_) => Ok(()),
            None => Err(ScheduleError::DoctorNotFound),
        }
    }

    async fn ensure_slot_free(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time_slot: crate::models::TimeSlot,
        except: Option<Uuid>,
    ) -> Result<(), ScheduleError> {
        match self.store.find_by_slot(doctor_id, date, time_slot).await? {
            Some(existing) if Some(existing.id) != except => Err(ScheduleError::DuplicateSchedule),
            _ => Ok(()),
        }
    }

    async fn roll_back(&self, created: &[Schedule]) {
        for schedule in created {
            if let Err(e) = self.store.delete_guarded(schedule.id, OccupancyGuard::Empty).await {
                warn!("Failed to roll back schedule {}: {}", schedule.id, e);
            }
        }
    }
}

fn validate_max_patients(max_patients: i32) -> Result<(), ScheduleError> {
    if max_patients < 1 || max_patients > MAX_PATIENTS_LIMIT {
        return Err(ScheduleError::ValidationError(format!(
            "max_patients must be between 1 and {}",
            MAX_PATIENTS_LIMIT
        )));
    }
    Ok(())
}
