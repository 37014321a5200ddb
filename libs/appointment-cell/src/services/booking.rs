// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use schedule_cell::{QuotaLedger, Schedule, ScheduleStore, SupabaseScheduleStore};
use shared_config::AppConfig;
use shared_database::{DoctorDirectory, PatientDirectory, SupabaseClient, SupabaseDirectory};
use shared_models::auth::User;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    normalize_symptoms, Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus,
    CreateAppointmentRequest, ScheduleBinding, UpdateAppointmentRequest,
};
use crate::services::booking_code;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::{AppointmentStore, AppointmentWrite, SupabaseAppointmentStore};

const DEFAULT_BOOKING_CODE_ATTEMPTS: u32 = 3;
const DEFAULT_RELEASE_ATTEMPTS: u32 = 3;

/// Collaborators the booking service needs. Stores are shared with the
/// schedule cell so both sides see the same occupancy.
#[derive(Clone)]
pub struct BookingDependencies {
    pub appointments: Arc<dyn AppointmentStore>,
    pub schedules: Arc<dyn ScheduleStore>,
    pub patients: Arc<dyn PatientDirectory>,
    pub doctors: Arc<dyn DoctorDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl BookingDependencies {
    pub fn from_config(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::with_service_role(config));
        let directory = Arc::new(SupabaseDirectory::new(Arc::clone(&supabase)));
        Self {
            appointments: Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
            schedules: Arc::new(SupabaseScheduleStore::new(supabase)),
            patients: directory.clone(),
            doctors: directory,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Orchestrates the appointment lifecycle and keeps the quota ledger in step with it.
///
/// Every pending appointment holds exactly one unit of its schedule, named by
/// its `quota_hold_id`. Creation reserves before persisting and releases if
/// persisting fails; cancellation flips the status with a conditional write
/// first, so only the caller that won the flip releases; rescheduling reserves
/// the new unit before giving up the old one. Releases quote the hold id, so
/// retrying one whose response was lost cannot free a second unit.
pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    schedules: Arc<dyn ScheduleStore>,
    patients: Arc<dyn PatientDirectory>,
    doctors: Arc<dyn DoctorDirectory>,
    clock: Arc<dyn Clock>,
    ledger: QuotaLedger,
    lifecycle: AppointmentLifecycleService,
    booking_code_attempts: u32,
    release_attempts: u32,
}

impl AppointmentBookingService {
    pub fn new(deps: BookingDependencies) -> Self {
        Self {
            ledger: QuotaLedger::new(Arc::clone(&deps.schedules)),
            appointments: deps.appointments,
            schedules: deps.schedules,
            patients: deps.patients,
            doctors: deps.doctors,
            clock: deps.clock,
            lifecycle: AppointmentLifecycleService::new(),
            booking_code_attempts: DEFAULT_BOOKING_CODE_ATTEMPTS,
            release_attempts: DEFAULT_RELEASE_ATTEMPTS,
        }
    }

    pub fn with_attempts(mut self, booking_code_attempts: u32, release_attempts: u32) -> Self {
        self.booking_code_attempts = booking_code_attempts.max(1);
        self.release_attempts = release_attempts.max(1);
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(BookingDependencies::from_config(config))
            .with_attempts(config.booking_code_attempts, config.ledger_release_attempts)
    }

    // ==============================================================================
    // LIFECYCLE OPERATIONS
    // ==============================================================================

    #[instrument(skip(self, request), fields(patient_id = %request.patient_id, schedule_id = %request.schedule_id))]
    pub async fn book_appointment(&self, request: CreateAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let symptoms = normalize_symptoms(request.symptoms.clone())?;

        if self.patients.find_patient(request.patient_id).await?.is_none() {
            return Err(AppointmentError::PatientNotFound);
        }
        if self.doctors.find_doctor(request.doctor_id).await?.is_none() {
            return Err(AppointmentError::DoctorNotFound);
        }
        let schedule = self.load_schedule(request.schedule_id).await?;
        if schedule.doctor_id != request.doctor_id {
            return Err(AppointmentError::InvalidState(
                "schedule belongs to a different doctor".to_string(),
            ));
        }
        self.check_bookable(&schedule)?;

        if self
            .appointments
            .find_pending(request.patient_id, request.doctor_id, schedule.schedule_date, None)
            .await?
            .is_some()
        {
            warn!(
                "Patient {} already has a pending visit with doctor {} on {}",
                request.patient_id, request.doctor_id, schedule.schedule_date
            );
            return Err(AppointmentError::DuplicateBooking);
        }

        self.ledger.reserve(schedule.id).await?;
        let hold_id = Uuid::new_v4();

        match self.insert_with_fresh_code(&request, &schedule, hold_id, symptoms).await {
            Ok(appointment) => {
                info!(
                    "Booked appointment {} ({}) on schedule {}",
                    appointment.id, appointment.appointment_no, schedule.id
                );
                Ok(appointment)
            }
            Err(err) => {
                warn!("Persisting appointment failed, releasing reserved unit: {}", err);
                if let Err(release_err) = self.release_with_retry(schedule.id, hold_id).await {
                    error!(
                        "Compensating release on schedule {} failed, unit leaked: {}",
                        schedule.id, release_err
                    );
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle.ensure_cancellable(&appointment, self.clock.today())?;

        let cancelled = match self
            .appointments
            .transition_status(appointment_id, AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .await?
        {
            AppointmentWrite::Applied(cancelled) => cancelled,
            AppointmentWrite::Stale(current) => {
                return Err(AppointmentError::InvalidState(format!(
                    "appointment is already {}",
                    current.status
                )))
            }
            AppointmentWrite::Missing => return Err(AppointmentError::NotFound),
        };

        if let Err(err) = self
            .release_with_retry(cancelled.schedule_id, cancelled.quota_hold_id)
            .await
        {
            warn!("Release failed for cancelled appointment {}, restoring it: {}", appointment_id, err);
            self.restore_pending(appointment_id).await;
            return Err(err);
        }

        info!("Cancelled appointment {} and released its unit", appointment_id);
        Ok(cancelled)
    }

    /// The visit happened, so the unit stays spent.
    #[instrument(skip(self))]
    pub async fn complete_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Completed)?;

        match self
            .appointments
            .transition_status(appointment_id, AppointmentStatus::Pending, AppointmentStatus::Completed)
            .await?
        {
            AppointmentWrite::Applied(completed) => {
                info!("Completed appointment {}", appointment_id);
                Ok(completed)
            }
            AppointmentWrite::Stale(current) => Err(AppointmentError::InvalidState(format!(
                "appointment is already {}",
                current.status
            ))),
            AppointmentWrite::Missing => Err(AppointmentError::NotFound),
        }
    }

    #[instrument(skip(self, request))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get_appointment(appointment_id).await?;
        self.lifecycle.ensure_modifiable(&appointment, self.clock.today())?;
        let symptoms = match request.symptoms {
            Some(raw) => Some(normalize_symptoms(Some(raw))?),
            None => None,
        };

        if let Some(new_schedule_id) = request.schedule_id {
            if new_schedule_id != appointment.schedule_id {
                appointment = self.reschedule(appointment, new_schedule_id).await?;
            }
        }

        if let Some(symptoms) = symptoms {
            appointment = match self.appointments.update_symptoms(appointment_id, symptoms).await? {
                AppointmentWrite::Applied(updated) => updated,
                AppointmentWrite::Stale(current) => {
                    return Err(AppointmentError::InvalidState(format!(
                        "appointment is already {}",
                        current.status
                    )))
                }
                AppointmentWrite::Missing => return Err(AppointmentError::NotFound),
            };
        }

        Ok(appointment)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .get(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Searching appointments with filters: {:?}", query);
        self.appointments.search(query).await
    }

    pub async fn list_patient_appointments(&self, patient_id: Uuid) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentSearchQuery {
            patient_id: Some(patient_id),
            ..AppointmentSearchQuery::default()
        };
        self.appointments.search(&query).await
    }

    pub async fn list_doctor_appointments(
        &self,
        doctor_id: Uuid,
        date: Option<chrono::NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let query = AppointmentSearchQuery {
            doctor_id: Some(doctor_id),
            from_date: date,
            to_date: date,
            ..AppointmentSearchQuery::default()
        };
        self.appointments.search(&query).await
    }

    /// Patient record id of the caller, if the caller is a patient.
    pub async fn resolve_patient(&self, user: &User) -> Result<Option<Uuid>, AppointmentError> {
        Ok(self.patients.resolve_current_patient(user).await?)
    }

    pub async fn my_appointments(&self, user: &User) -> Result<Vec<Appointment>, AppointmentError> {
        let patient_id = self
            .resolve_patient(user)
            .await?
            .ok_or(AppointmentError::PatientNotFound)?;
        self.list_patient_appointments(patient_id).await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn load_schedule(&self, schedule_id: Uuid) -> Result<Schedule, AppointmentError> {
        self.schedules
            .get(schedule_id)
            .await?
            .ok_or(AppointmentError::ScheduleNotFound)
    }

    /// Advisory only; the ledger's conditional reserve is authoritative.
    fn check_bookable(&self, schedule: &Schedule) -> Result<(), AppointmentError> {
        if !schedule.is_open() {
            return Err(AppointmentError::ScheduleClosed);
        }
        if !schedule.has_free_quota() {
            return Err(AppointmentError::CapacityExceeded);
        }
        Ok(())
    }

    async fn insert_with_fresh_code(
        &self,
        request: &CreateAppointmentRequest,
        schedule: &Schedule,
        hold_id: Uuid,
        symptoms: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        for attempt in 1..=self.booking_code_attempts {
            let appointment = Appointment {
                id: Uuid::new_v4(),
                appointment_no: booking_code::generate(now.date_naive()),
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                schedule_id: schedule.id,
                appointment_date: schedule.schedule_date,
                time_slot: schedule.time_slot,
                symptoms: symptoms.clone(),
                status: AppointmentStatus::Pending,
                quota_hold_id: hold_id,
                created_at: now,
                updated_at: now,
            };

            match self.appointments.insert(appointment).await {
                Err(AppointmentError::BookingCodeCollision) => {
                    warn!(
                        "Booking code collision, attempt {}/{}",
                        attempt, self.booking_code_attempts
                    );
                }
                other => return other,
            }
        }
        Err(AppointmentError::BookingCodeCollision)
    }

    /// Binds a pending appointment to another schedule of the same doctor.
    async fn reschedule(
        &self,
        appointment: Appointment,
        new_schedule_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        let target = self.load_schedule(new_schedule_id).await?;
        if target.doctor_id != appointment.doctor_id {
            return Err(AppointmentError::InvalidState(
                "cannot move an appointment to another doctor's schedule".to_string(),
            ));
        }
        self.check_bookable(&target)?;
        if self
            .appointments
            .find_pending(
                appointment.patient_id,
                appointment.doctor_id,
                target.schedule_date,
                Some(appointment.id),
            )
            .await?
            .is_some()
        {
            return Err(AppointmentError::DuplicateBooking);
        }

        self.ledger.reserve(target.id).await?;
        let new_hold = Uuid::new_v4();

        let rebound = match self
            .appointments
            .rebind_schedule(
                appointment.id,
                appointment.schedule_id,
                &ScheduleBinding::new(&target, new_hold),
            )
            .await
        {
            Ok(AppointmentWrite::Applied(rebound)) => rebound,
            outcome => {
                self.compensate_release(target.id, new_hold).await;
                return Err(match outcome {
                    Err(err) => err,
                    Ok(AppointmentWrite::Missing) => AppointmentError::NotFound,
                    Ok(_) => AppointmentError::InvalidState(
                        "appointment changed while it was being rescheduled".to_string(),
                    ),
                });
            }
        };

        if let Err(err) = self
            .release_with_retry(appointment.schedule_id, appointment.quota_hold_id)
            .await
        {
            warn!(
                "Releasing old schedule {} failed, moving appointment {} back: {}",
                appointment.schedule_id, appointment.id, err
            );
            match self
                .appointments
                .rebind_schedule(appointment.id, target.id, &ScheduleBinding::from(&appointment))
                .await
            {
                Ok(AppointmentWrite::Applied(_)) => self.compensate_release(target.id, new_hold).await,
                other => error!(
                    "Could not move appointment {} back to schedule {}: {:?}",
                    appointment.id, appointment.schedule_id, other
                ),
            }
            return Err(err);
        }

        info!(
            "Rescheduled appointment {} from {} to {}",
            appointment.id, appointment.schedule_id, target.id
        );
        Ok(rebound)
    }

    /// Retries transient store failures with the same hold id, so an attempt
    /// that was applied but never answered is not applied again. Ledger
    /// rejections are returned at once.
    async fn release_with_retry(&self, schedule_id: Uuid, hold_id: Uuid) -> Result<(), AppointmentError> {
        let mut attempt = 1;
        loop {
            match self.ledger.release(schedule_id, hold_id).await {
                Ok(_) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < self.release_attempts => {
                    warn!(
                        "Release on schedule {} failed, attempt {}/{}: {}",
                        schedule_id, attempt, self.release_attempts, err
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn compensate_release(&self, schedule_id: Uuid, hold_id: Uuid) {
        warn!("Compensating: releasing unit on schedule {}", schedule_id);
        if let Err(err) = self.release_with_retry(schedule_id, hold_id).await {
            error!("Compensating release on schedule {} failed, unit leaked: {}", schedule_id, err);
        }
    }

    async fn restore_pending(&self, appointment_id: Uuid) {
        match self
            .appointments
            .transition_status(appointment_id, AppointmentStatus::Cancelled, AppointmentStatus::Pending)
            .await
        {
            Ok(AppointmentWrite::Applied(_)) => {
                warn!("Appointment {} restored to pending after failed release", appointment_id)
            }
            other => error!(
                "Appointment {} is cancelled but still holds its unit: {:?}",
                appointment_id, other
            ),
        }
    }
}
