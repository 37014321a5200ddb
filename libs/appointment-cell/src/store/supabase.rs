use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use schedule_cell::{ScheduleError, ScheduleReferences};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, ScheduleBinding};
use crate::store::{AppointmentStore, AppointmentWrite};

const APPOINTMENTS: &str = "/rest/v1/appointments";

/// Appointment store backed by PostgREST. Conditional writes are PATCHes
/// filtered on the expected state; an empty result means the filter missed.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(SupabaseClient::with_service_role(config)))
    }

    async fn fetch(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, path, None, None).await?;
        Ok(rows)
    }

    async fn patch(&self, filter: &str, mut body: Value) -> Result<Vec<Appointment>, AppointmentError> {
        if let Value::Object(map) = &mut body {
            map.insert("updated_at".to_string(), json!(Utc::now()));
        }
        let path = format!("{}?{}", APPOINTMENTS, filter);
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;
        Ok(rows)
    }

    async fn conditional_patch(
        &self,
        appointment_id: Uuid,
        conditions: &str,
        body: Value,
    ) -> Result<AppointmentWrite, AppointmentError> {
        let filter = format!("id=eq.{}{}", appointment_id, conditions);
        let mut rows = self.patch(&filter, body).await?;
        if !rows.is_empty() {
            return Ok(AppointmentWrite::Applied(rows.swap_remove(0)));
        }

        debug!("Conditional write on appointment {} matched no row", appointment_id);
        Ok(match self.get(appointment_id).await? {
            Some(current) => AppointmentWrite::Stale(current),
            None => AppointmentWrite::Missing,
        })
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let mut rows = self
            .fetch(&format!("{}?id=eq.{}&limit=1", APPOINTMENTS, appointment_id))
            .await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to encode appointment: {}", e)))?;

        let mut rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                APPOINTMENTS,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await?;

        if rows.is_empty() {
            return Err(AppointmentError::DatabaseError("Appointment insert returned no row".to_string()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn find_pending(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut path = format!(
            "{}?patient_id=eq.{}&doctor_id=eq.{}&appointment_date=eq.{}&status=eq.{}",
            APPOINTMENTS,
            patient_id,
            doctor_id,
            date,
            AppointmentStatus::Pending.code()
        );
        if let Some(excluded) = exclude {
            path.push_str(&format!("&id=neq.{}", excluded));
        }
        path.push_str("&limit=1");

        let mut rows = self.fetch(&path).await?;
        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<AppointmentWrite, AppointmentError> {
        self.conditional_patch(
            appointment_id,
            &format!("&status=eq.{}", from.code()),
            json!({ "status": to }),
        )
        .await
    }

    async fn rebind_schedule(
        &self,
        appointment_id: Uuid,
        expected_schedule_id: Uuid,
        binding: &ScheduleBinding,
    ) -> Result<AppointmentWrite, AppointmentError> {
        let body = serde_json::to_value(binding)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to encode binding: {}", e)))?;
        self.conditional_patch(
            appointment_id,
            &format!(
                "&status=eq.{}&schedule_id=eq.{}",
                AppointmentStatus::Pending.code(),
                expected_schedule_id
            ),
            body,
        )
        .await
    }

    async fn update_symptoms(
        &self,
        appointment_id: Uuid,
        symptoms: Option<String>,
    ) -> Result<AppointmentWrite, AppointmentError> {
        self.conditional_patch(
            appointment_id,
            &format!("&status=eq.{}", AppointmentStatus::Pending.code()),
            json!({ "symptoms": symptoms }),
        )
        .await
    }

    async fn search(&self, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Vec::new();
        if let Some(patient_id) = query.patient_id {
            filters.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(doctor_id) = query.doctor_id {
            filters.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(schedule_id) = query.schedule_id {
            filters.push(format!("schedule_id=eq.{}", schedule_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status.code()));
        }
        if let Some(from) = query.from_date {
            filters.push(format!("appointment_date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            filters.push(format!("appointment_date=lte.{}", to));
        }
        filters.push("order=created_at.desc".to_string());
        if let Some(limit) = query.limit {
            filters.push(format!("limit={}", limit));
        }
        if let Some(offset) = query.offset {
            filters.push(format!("offset={}", offset));
        }

        self.fetch(&format!("{}?{}", APPOINTMENTS, filters.join("&"))).await
    }

    async fn count_pending_for_schedule(&self, schedule_id: Uuid) -> Result<i64, AppointmentError> {
        let path = format!(
            "{}?schedule_id=eq.{}&status=eq.{}&select=id",
            APPOINTMENTS,
            schedule_id,
            AppointmentStatus::Pending.code()
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows.len() as i64)
    }

    async fn any_for_schedule(&self, schedule_id: Uuid) -> Result<bool, AppointmentError> {
        let path = format!("{}?schedule_id=eq.{}&select=id&limit=1", APPOINTMENTS, schedule_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl ScheduleReferences for SupabaseAppointmentStore {
    async fn is_referenced(&self, schedule_id: Uuid) -> Result<bool, ScheduleError> {
        self.any_for_schedule(schedule_id)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }
}
