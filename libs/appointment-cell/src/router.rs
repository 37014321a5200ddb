// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    let state = Arc::new(AppointmentState::from_config(&config));
    appointment_routes_with_state(config, state)
}

pub fn appointment_routes_with_state(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/search", get(handlers::search_appointments))
        .route("/my", get(handlers::get_my_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).put(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", put(handlers::cancel_appointment))
        .route("/{appointment_id}/complete", put(handlers::complete_appointment))
        // Listings
        .route("/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_appointments))
        // Occupancy vs. pending appointments
        .route("/audit/schedules/{schedule_id}", get(handlers::audit_schedule))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
