use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use appointment_cell::SupabaseAppointmentStore;
use schedule_cell::router::schedule_routes;
use schedule_cell::ScheduleReferences;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let references: Arc<dyn ScheduleReferences> = Arc::new(SupabaseAppointmentStore::from_config(&state));

    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/schedules", schedule_routes(state.clone(), references))
        .nest("/appointments", appointment_routes(state))
}
