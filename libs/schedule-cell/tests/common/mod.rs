#![allow(dead_code)]

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use schedule_cell::{ScheduleError, ScheduleReferences};

/// Stands in for the appointment side: schedules marked here count as referenced.
#[derive(Default)]
pub struct ReferencedSchedules {
    ids: RwLock<HashSet<Uuid>>,
}

impl ReferencedSchedules {
    pub async fn mark(&self, schedule_id: Uuid) {
        self.ids.write().await.insert(schedule_id);
    }
}

#[async_trait]
impl ScheduleReferences for ReferencedSchedules {
    async fn is_referenced(&self, schedule_id: Uuid) -> Result<bool, ScheduleError> {
        Ok(self.ids.read().await.contains(&schedule_id))
    }
}
