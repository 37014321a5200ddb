//! Lookups against the patient and doctor records owned by other parts of the clinic.
//!
//! Booking and schedule administration only need to know that a patient or
//! doctor exists (plus a few display fields), so the collaborators are
//! reached through two narrow traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;

use crate::error::SupabaseError;
use crate::supabase::SupabaseClient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub department_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<PatientRecord>, SupabaseError>;

    /// Patient id belonging to the authenticated user, if the user is a patient.
    async fn resolve_current_patient(&self, user: &User) -> Result<Option<Uuid>, SupabaseError>;
}

#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRecord>, SupabaseError>;
}

pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn first_row<T>(&self, path: &str) -> Result<Option<T>, SupabaseError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut rows: Vec<T> = self.supabase.request(Method::GET, path, None, None).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.swap_remove(0)))
    }
}

#[async_trait]
impl PatientDirectory for SupabaseDirectory {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<PatientRecord>, SupabaseError> {
        debug!("Looking up patient {}", patient_id);
        self.first_row(&format!("/rest/v1/patients?id=eq.{}&limit=1", patient_id)).await
    }

    async fn resolve_current_patient(&self, user: &User) -> Result<Option<Uuid>, SupabaseError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}&limit=1", user.id);
        let patient: Option<PatientRecord> = self.first_row(&path).await?;
        Ok(patient.map(|p| p.id))
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRecord>, SupabaseError> {
        debug!("Looking up doctor {}", doctor_id);
        self.first_row(&format!("/rest/v1/doctors?id=eq.{}&limit=1", doctor_id)).await
    }
}

/// Directory held in memory, used by tests and local runs without a database.
#[derive(Default)]
pub struct InMemoryDirectory {
    patients: RwLock<HashMap<Uuid, PatientRecord>>,
    doctors: RwLock<HashMap<Uuid, DoctorRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, name: &str, user_id: Option<&str>) -> PatientRecord {
        let record = PatientRecord {
            id: Uuid::new_v4(),
            user_id: user_id.map(str::to_string),
            name: name.to_string(),
            phone: None,
        };
        self.patients.write().await.insert(record.id, record.clone());
        record
    }

    pub async fn add_doctor(&self, name: &str) -> DoctorRecord {
        let record = DoctorRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            department_id: None,
            title: None,
        };
        self.doctors.write().await.insert(record.id, record.clone());
        record
    }
}

#[async_trait]
impl PatientDirectory for InMemoryDirectory {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<PatientRecord>, SupabaseError> {
        Ok(self.patients.read().await.get(&patient_id).cloned())
    }

    async fn resolve_current_patient(&self, user: &User) -> Result<Option<Uuid>, SupabaseError> {
        Ok(self
            .patients
            .read()
            .await
            .values()
            .find(|p| p.user_id.as_deref() == Some(user.id.as_str()))
            .map(|p| p.id))
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDirectory {
    async fn find_doctor(&self, doctor_id: Uuid) -> Result<Option<DoctorRecord>, SupabaseError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }
}
