use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::{Schedule, ScheduleChanges, ScheduleError, ScheduleQuery, ScheduleStatus, TimeSlot};
use crate::store::{OccupancyGuard, ScheduleStore, WriteOutcome};

/// Schedule store kept in process memory. Every conditional write checks and
/// mutates under one write-lock acquisition.
#[derive(Default)]
pub struct InMemoryScheduleStore {
    schedules: RwLock<HashMap<Uuid, Schedule>>,
    /// Hold ids already given back; only touched while `schedules` is write-locked.
    released_holds: Mutex<HashSet<Uuid>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.schedules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.schedules.read().await.is_empty()
    }
}

fn slot_taken(
    schedules: &HashMap<Uuid, Schedule>,
    doctor_id: Uuid,
    date: NaiveDate,
    slot: TimeSlot,
    except: Option<Uuid>,
) -> bool {
    schedules.values().any(|s| {
        Some(s.id) != except && s.doctor_id == doctor_id && s.schedule_date == date && s.time_slot == slot
    })
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn get(&self, schedule_id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        Ok(self.schedules.read().await.get(&schedule_id).cloned())
    }

    async fn find_by_slot(
        &self,
        doctor_id: Uuid,
        schedule_date: NaiveDate,
        time_slot: TimeSlot,
    ) -> Result<Option<Schedule>, ScheduleError> {
        Ok(self
            .schedules
            .read()
            .await
            .values()
            .find(|s| s.doctor_id == doctor_id && s.schedule_date == schedule_date && s.time_slot == time_slot)
            .cloned())
    }

    async fn list(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>, ScheduleError> {
        let mut rows: Vec<Schedule> = self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.schedule_date, a.time_slot, a.created_at).cmp(&(b.schedule_date, b.time_slot, b.created_at))
        });

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert(&self, schedule: Schedule) -> Result<Schedule, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        if slot_taken(&schedules, schedule.doctor_id, schedule.schedule_date, schedule.time_slot, None) {
            return Err(ScheduleError::DuplicateSchedule);
        }
        schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn update_guarded(
        &self,
        schedule_id: Uuid,
        changes: &ScheduleChanges,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        let Some(current) = schedules.get(&schedule_id).cloned() else {
            return Ok(WriteOutcome::Missing);
        };
        if !guard.admits(current.current_patients) {
            return Ok(WriteOutcome::Rejected(current));
        }

        let mut updated = current;
        changes.apply_to(&mut updated, Utc::now());
        if slot_taken(&schedules, updated.doctor_id, updated.schedule_date, updated.time_slot, Some(schedule_id)) {
            return Err(ScheduleError::DuplicateSchedule);
        }
        schedules.insert(schedule_id, updated.clone());
        Ok(WriteOutcome::Applied(updated))
    }

    async fn delete_guarded(
        &self,
        schedule_id: Uuid,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome<()>, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        match schedules.get(&schedule_id) {
            None => Ok(WriteOutcome::Missing),
            Some(current) if !guard.admits(current.current_patients) => Ok(WriteOutcome::Rejected(current.clone())),
            Some(_) => {
                schedules.remove(&schedule_id);
                Ok(WriteOutcome::Applied(()))
            }
        }
    }

    async fn try_reserve(&self, schedule_id: Uuid) -> Result<WriteOutcome, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&schedule_id) else {
            return Ok(WriteOutcome::Missing);
        };
        if schedule.status != ScheduleStatus::Open || schedule.current_patients >= schedule.max_patients {
            return Ok(WriteOutcome::Rejected(schedule.clone()));
        }
        schedule.current_patients += 1;
        schedule.updated_at = Utc::now();
        Ok(WriteOutcome::Applied(schedule.clone()))
    }

    async fn try_release(&self, schedule_id: Uuid, hold_id: Uuid) -> Result<WriteOutcome, ScheduleError> {
        let mut schedules = self.schedules.write().await;
        let Some(schedule) = schedules.get_mut(&schedule_id) else {
            return Ok(WriteOutcome::Missing);
        };
        let mut released = self.released_holds.lock().await;
        if released.contains(&hold_id) {
            return Ok(WriteOutcome::Applied(schedule.clone()));
        }
        if schedule.current_patients <= 0 {
            return Ok(WriteOutcome::Rejected(schedule.clone()));
        }
        schedule.current_patients -= 1;
        schedule.updated_at = Utc::now();
        released.insert(hold_id);
        Ok(WriteOutcome::Applied(schedule.clone()))
    }
}
