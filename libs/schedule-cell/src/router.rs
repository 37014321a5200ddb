// libs/schedule-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::ScheduleService;
use crate::store::ScheduleReferences;

pub fn schedule_routes(config: Arc<AppConfig>, references: Arc<dyn ScheduleReferences>) -> Router {
    let service = Arc::new(ScheduleService::from_config(&config, references));
    schedule_routes_with_service(config, service)
}

pub fn schedule_routes_with_service(config: Arc<AppConfig>, service: Arc<ScheduleService>) -> Router {
    // Every route requires a caller; mutations additionally check for the admin role
    let protected_routes = Router::new()
        .route("/", post(handlers::create_schedule).get(handlers::list_schedules))
        .route("/batch", post(handlers::create_schedules_batch))
        .route(
            "/{schedule_id}",
            get(handlers::get_schedule)
                .put(handlers::update_schedule)
                .delete(handlers::delete_schedule),
        )
        .route("/{schedule_id}/status", put(handlers::update_schedule_status))
        .route("/doctors/{doctor_id}", get(handlers::get_doctor_schedules))
        .route("/date/{date}", get(handlers::get_schedules_by_date))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(service)
}
