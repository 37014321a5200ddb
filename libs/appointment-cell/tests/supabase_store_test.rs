use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentStore, AppointmentWrite, SupabaseAppointmentStore,
    APPOINTMENT_NO_CONSTRAINT, PENDING_VISIT_CONSTRAINT,
};
use schedule_cell::{ScheduleReferences, TimeSlot};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::test_utils::MockSupabaseResponses;

fn store_for(server: &MockServer) -> SupabaseAppointmentStore {
    let config = AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "anon".to_string(),
        supabase_service_role_key: "service".to_string(),
        ..AppConfig::default()
    };
    SupabaseAppointmentStore::new(Arc::new(SupabaseClient::with_service_role(&config)))
}

fn new_appointment() -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        appointment_no: "A20240520123456".to_string(),
        patient_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        schedule_id: Uuid::new_v4(),
        appointment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        time_slot: TimeSlot::Morning,
        symptoms: None,
        status: AppointmentStatus::Pending,
        quota_hold_id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn taken_booking_code_is_a_collision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::unique_violation(APPOINTMENT_NO_CONSTRAINT)),
        )
        .mount(&server)
        .await;

    let err = store_for(&server).insert(new_appointment()).await.unwrap_err();
    assert_eq!(err, AppointmentError::BookingCodeCollision);
}

#[tokio::test]
async fn second_pending_visit_is_a_duplicate_booking() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(MockSupabaseResponses::unique_violation(PENDING_VISIT_CONSTRAINT)),
        )
        .mount(&server)
        .await;

    assert_matches!(
        store_for(&server).insert(new_appointment()).await,
        Err(AppointmentError::DuplicateBooking)
    );
}

#[tokio::test]
async fn status_transition_is_filtered_on_the_expected_status() {
    let server = MockServer::start().await;
    let (appointment_id, patient_id, doctor_id, schedule_id) =
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .and(query_param("status", "eq.1"))
        .and(body_partial_json(json!({ "status": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(appointment_id, patient_id, doctor_id, schedule_id, "2024-06-01", 0)
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store_for(&server)
        .transition_status(appointment_id, AppointmentStatus::Pending, AppointmentStatus::Cancelled)
        .await
        .unwrap();
    assert_matches!(outcome, AppointmentWrite::Applied(a) if a.status == AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn missed_transition_reports_the_stored_state() {
    let server = MockServer::start().await;
    let (appointment_id, patient_id, doctor_id, schedule_id) =
        (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(appointment_id, patient_id, doctor_id, schedule_id, "2024-06-01", 2)
        ])))
        .mount(&server)
        .await;

    let outcome = store_for(&server)
        .transition_status(appointment_id, AppointmentStatus::Pending, AppointmentStatus::Cancelled)
        .await
        .unwrap();
    assert_matches!(outcome, AppointmentWrite::Stale(a) if a.status == AppointmentStatus::Completed);
}

#[tokio::test]
async fn pending_count_uses_schedule_and_status_filters() {
    let server = MockServer::start().await;
    let schedule_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("schedule_id", format!("eq.{}", schedule_id)))
        .and(query_param("status", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4() },
            { "id": Uuid::new_v4() }
        ])))
        .mount(&server)
        .await;

    let count = store_for(&server).count_pending_for_schedule(schedule_id).await.unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn schedule_reference_check_asks_for_any_bound_appointment() {
    let server = MockServer::start().await;
    let (referenced, unused) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("schedule_id", format!("eq.{}", referenced)))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": Uuid::new_v4() }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("schedule_id", format!("eq.{}", unused)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.is_referenced(referenced).await.unwrap());
    assert!(!store.is_referenced(unused).await.unwrap());
}
