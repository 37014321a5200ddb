use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Schedule, ScheduleChanges, ScheduleError, ScheduleQuery, TimeSlot};
use crate::store::{OccupancyGuard, ScheduleStore, WriteOutcome};

const SCHEDULES: &str = "/rest/v1/schedules";

/// Schedule store backed by PostgREST.
///
/// Reservations call the `reserve_schedule_slot` / `release_schedule_slot`
/// functions, each one conditional `UPDATE ... RETURNING *`, so the check and
/// the increment happen inside a single statement. The release function also
/// records the hold id in the same transaction and skips holds it has seen.
pub struct SupabaseScheduleStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseScheduleStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn guard_filter(guard: OccupancyGuard) -> String {
        match guard {
            OccupancyGuard::Any => String::new(),
            OccupancyGuard::Empty => "&current_patients=eq.0".to_string(),
            OccupancyGuard::AtMost(limit) => format!("&current_patients=lte.{}", limit),
        }
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Schedule>, ScheduleError> {
        let rows: Vec<Schedule> = self.supabase.request(Method::GET, path, None, None).await?;
        Ok(rows)
    }

    /// Explains why a conditional write matched no row.
    async fn classify_miss<T>(&self, schedule_id: Uuid) -> Result<WriteOutcome<T>, ScheduleError> {
        Ok(match self.get(schedule_id).await? {
            Some(schedule) => WriteOutcome::Rejected(schedule),
            None => WriteOutcome::Missing,
        })
    }

    async fn call_ledger_function(
        &self,
        function: &str,
        schedule_id: Uuid,
        args: Value,
    ) -> Result<WriteOutcome, ScheduleError> {
        let path = format!("/rest/v1/rpc/{}", function);
        let mut rows: Vec<Schedule> = self.supabase.request(Method::POST, &path, None, Some(args)).await?;

        if rows.is_empty() {
            debug!("{} matched no row for schedule {}", function, schedule_id);
            return self.classify_miss(schedule_id).await;
        }
        Ok(WriteOutcome::Applied(rows.swap_remove(0)))
    }
}

#[async_trait]
impl ScheduleStore for SupabaseScheduleStore {
    async fn get(&self, schedule_id: Uuid) -> Result<Option<Schedule>, ScheduleError> {
        let mut rows = self.fetch(&format!("{}?id=eq.{}&limit=1", SCHEDULES, schedule_id)).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn find_by_slot(
        &self,
        doctor_id: Uuid,
        schedule_date: NaiveDate,
        time_slot: TimeSlot,
    ) -> Result<Option<Schedule>, ScheduleError> {
        let path = format!(
            "{}?doctor_id=eq.{}&schedule_date=eq.{}&time_slot=eq.{}&limit=1",
            SCHEDULES, doctor_id, schedule_date, time_slot
        );
        let mut rows = self.fetch(&path).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn list(&self, query: &ScheduleQuery) -> Result<Vec<Schedule>, ScheduleError> {
        let mut filters = Vec::new();
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(from) = query.from_date {
            filters.push(format!("schedule_date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            filters.push(format!("schedule_date=lte.{}", to));
        }
        if let Some(slot) = query.time_slot {
            filters.push(format!("time_slot=eq.{}", slot));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        filters.push("order=schedule_date.asc,time_slot.asc".to_string());
        if let Some(limit) = query.limit {
            filters.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.offset {
            filters.push(format!("offset={}", offset));
        }

        self.fetch(&format!("{}?{}", SCHEDULES, filters.join("&"))).await
    }

    async fn insert(&self, schedule: Schedule) -> Result<Schedule, ScheduleError> {
        let body = serde_json::to_value(&schedule)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to encode schedule: {}", e)))?;

        let mut rows: Vec<Schedule> = self
            .supabase
            .request_with_headers(
                Method::POST,
                SCHEDULES,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        if rows.is_empty() {
            return Err(ScheduleError::DatabaseError("Schedule insert returned no row".to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_guarded(
        &self,
        schedule_id: Uuid,
        changes: &ScheduleChanges,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome, ScheduleError> {
        let mut body = serde_json::to_value(changes)
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to encode changes: {}", e)))?;
        if let Value::Object(map) = &mut body {
            map.insert("updated_at".to_string(), json!(Utc::now()));
        }

        let path = format!("{}?id=eq.{}{}", SCHEDULES, schedule_id, Self::guard_filter(guard));
        let mut rows: Vec<Schedule> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        if rows.is_empty() {
            return self.classify_miss(schedule_id).await;
        }
        Ok(WriteOutcome::Applied(rows.swap_remove(0)))
    }

    async fn delete_guarded(
        &self,
        schedule_id: Uuid,
        guard: OccupancyGuard,
    ) -> Result<WriteOutcome<()>, ScheduleError> {
        let path = format!("{}?id=eq.{}{}", SCHEDULES, schedule_id, Self::guard_filter(guard));
        let rows: Vec<Schedule> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        if rows.is_empty() {
            return self.classify_miss(schedule_id).await;
        }
        Ok(WriteOutcome::Applied(()))
    }

    async fn try_reserve(&self, schedule_id: Uuid) -> Result<WriteOutcome, ScheduleError> {
        self.call_ledger_function("reserve_schedule_slot", schedule_id, json!({ "p_schedule_id": schedule_id }))
            .await
    }

    async fn try_release(&self, schedule_id: Uuid, hold_id: Uuid) -> Result<WriteOutcome, ScheduleError> {
        self.call_ledger_function(
            "release_schedule_slot",
            schedule_id,
            json!({ "p_schedule_id": schedule_id, "p_hold_id": hold_id }),
        )
        .await
    }
}
