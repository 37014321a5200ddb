mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use uuid::Uuid;

use schedule_cell::{
    CreateScheduleRequest, InMemoryScheduleStore, QuotaLedger, ScheduleError, ScheduleQuery, ScheduleService,
    ScheduleStatus, ScheduleStore, TimeSlot, UpdateScheduleRequest,
};
use shared_database::InMemoryDirectory;
use shared_utils::clock::FixedClock;

use common::ReferencedSchedules;

struct Fixture {
    store: Arc<InMemoryScheduleStore>,
    service: ScheduleService,
    ledger: QuotaLedger,
    references: Arc<ReferencedSchedules>,
    doctor_id: Uuid,
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

async fn fixture() -> Fixture {
    let store = Arc::new(InMemoryScheduleStore::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let doctor = directory.add_doctor("Dr. Zhang").await;
    let references = Arc::new(ReferencedSchedules::default());
    let service = ScheduleService::new(
        store.clone(),
        directory,
        references.clone(),
        Arc::new(FixedClock::on(day(1))),
    );
    let ledger = QuotaLedger::new(store.clone());

    Fixture {
        store,
        service,
        ledger,
        references,
        doctor_id: doctor.id,
    }
}

fn request(doctor_id: Uuid, date: NaiveDate, slot: TimeSlot, max_patients: i32) -> CreateScheduleRequest {
    CreateScheduleRequest {
        doctor_id,
        schedule_date: date,
        time_slot: slot,
        max_patients,
    }
}

#[tokio::test]
async fn create_schedule_starts_open_and_empty() {
    let f = fixture().await;

    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 20))
        .await
        .unwrap();

    assert_eq!(schedule.current_patients, 0);
    assert_eq!(schedule.status, ScheduleStatus::Open);
    assert_eq!(schedule.remaining_quota(), 20);
}

#[tokio::test]
async fn create_schedule_rejects_bad_quota() {
    let f = fixture().await;

    for max in [0, -3, 501] {
        assert_matches!(
            f.service.create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, max)).await,
            Err(ScheduleError::ValidationError(_))
        );
    }
    assert!(f.store.is_empty().await);
}

#[tokio::test]
async fn create_schedule_for_unknown_doctor_fails() {
    let f = fixture().await;

    assert_matches!(
        f.service.create_schedule(request(Uuid::new_v4(), day(3), TimeSlot::Morning, 5)).await,
        Err(ScheduleError::DoctorNotFound)
    );
}

#[tokio::test]
async fn same_doctor_date_and_slot_is_a_duplicate() {
    let f = fixture().await;
    f.service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();

    assert_matches!(
        f.service.create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 8)).await,
        Err(ScheduleError::DuplicateSchedule)
    );
    f.service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Afternoon, 8))
        .await
        .unwrap();
}

#[tokio::test]
async fn batch_create_is_all_or_nothing() {
    let f = fixture().await;
    f.service
        .create_schedule(request(f.doctor_id, day(5), TimeSlot::Evening, 5))
        .await
        .unwrap();

    let batch = vec![
        request(f.doctor_id, day(4), TimeSlot::Morning, 5),
        request(f.doctor_id, day(4), TimeSlot::Afternoon, 5),
        request(f.doctor_id, day(5), TimeSlot::Evening, 5),
    ];
    assert_matches!(f.service.create_schedules_batch(batch).await, Err(ScheduleError::DuplicateSchedule));
    assert_eq!(f.store.len().await, 1);

    let batch = vec![
        request(f.doctor_id, day(4), TimeSlot::Morning, 5),
        request(f.doctor_id, day(4), TimeSlot::Afternoon, 5),
    ];
    let created = f.service.create_schedules_batch(batch).await.unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(f.store.len().await, 3);
}

#[tokio::test]
async fn batch_with_internal_duplicate_is_rejected() {
    let f = fixture().await;
    let batch = vec![
        request(f.doctor_id, day(4), TimeSlot::Morning, 5),
        request(f.doctor_id, day(4), TimeSlot::Morning, 9),
    ];

    assert_matches!(f.service.create_schedules_batch(batch).await, Err(ScheduleError::DuplicateSchedule));
    assert!(f.store.is_empty().await);
}

#[tokio::test]
async fn lowering_quota_below_bookings_is_refused() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();

    let shrink = UpdateScheduleRequest {
        max_patients: Some(1),
        ..Default::default()
    };
    assert_matches!(
        f.service.update_schedule(schedule.id, shrink).await,
        Err(ScheduleError::InvalidState(_))
    );

    let shrink_to_fit = UpdateScheduleRequest {
        max_patients: Some(2),
        ..Default::default()
    };
    let updated = f.service.update_schedule(schedule.id, shrink_to_fit).await.unwrap();
    assert_eq!(updated.max_patients, 2);
    assert_eq!(updated.current_patients, 2);
    assert_eq!(updated.remaining_quota(), 0);
}

#[tokio::test]
async fn moving_a_booked_schedule_is_refused() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();

    let move_it = UpdateScheduleRequest {
        schedule_date: Some(day(4)),
        ..Default::default()
    };
    assert_matches!(
        f.service.update_schedule(schedule.id, move_it).await,
        Err(ScheduleError::InvalidState(_))
    );
}

#[tokio::test]
async fn moving_onto_a_taken_slot_is_a_duplicate() {
    let f = fixture().await;
    f.service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Afternoon, 5))
        .await
        .unwrap();
    let morning = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();

    let move_it = UpdateScheduleRequest {
        time_slot: Some(TimeSlot::Afternoon),
        ..Default::default()
    };
    assert_matches!(
        f.service.update_schedule(morning.id, move_it).await,
        Err(ScheduleError::DuplicateSchedule)
    );
}

#[tokio::test]
async fn closing_requires_an_empty_schedule_and_reopening_is_free() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();

    assert_matches!(f.service.close_schedule(schedule.id).await, Err(ScheduleError::InvalidState(_)));

    f.ledger.release(schedule.id, Uuid::new_v4()).await.unwrap();
    let closed = f.service.close_schedule(schedule.id).await.unwrap();
    assert_eq!(closed.status, ScheduleStatus::Closed);

    let reopened = f
        .service
        .update_schedule_status(schedule.id, ScheduleStatus::Open)
        .await
        .unwrap();
    assert!(reopened.is_open());
}

#[tokio::test]
async fn delete_requires_no_bookings() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();

    assert_matches!(f.service.delete_schedule(schedule.id).await, Err(ScheduleError::InvalidState(_)));

    f.ledger.release(schedule.id, Uuid::new_v4()).await.unwrap();
    f.service.delete_schedule(schedule.id).await.unwrap();
    assert_matches!(f.service.get_schedule(schedule.id).await, Err(ScheduleError::NotFound));
    assert_matches!(f.service.delete_schedule(schedule.id).await, Err(ScheduleError::NotFound));
}

#[tokio::test]
async fn referenced_schedule_cannot_be_deleted_even_when_empty() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.references.mark(schedule.id).await;

    assert_matches!(f.service.delete_schedule(schedule.id).await, Err(ScheduleError::InvalidState(_)));
    assert!(f.service.get_schedule(schedule.id).await.is_ok());
}

#[tokio::test]
async fn listings_only_show_open_schedules_in_day_order() {
    let f = fixture().await;
    let evening = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Evening, 5))
        .await
        .unwrap();
    let morning = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    let later = f
        .service
        .create_schedule(request(f.doctor_id, day(6), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.service.close_schedule(evening.id).await.unwrap();

    let by_date = f.service.list_schedules_by_date(day(3)).await.unwrap();
    assert_eq!(by_date.iter().map(|s| s.id).collect::<Vec<_>>(), vec![morning.id]);

    let by_doctor = f
        .service
        .list_doctor_schedules(f.doctor_id, Some(day(2)), None)
        .await
        .unwrap();
    assert_eq!(by_doctor.iter().map(|s| s.id).collect::<Vec<_>>(), vec![morning.id, later.id]);

    let everything = f.service.list_schedules(&ScheduleQuery::default()).await.unwrap();
    assert_eq!(everything.len(), 3);
    assert_eq!(everything[0].id, morning.id);
    assert_eq!(everything[1].id, evening.id);

    let paged = f
        .service
        .list_schedules(&ScheduleQuery {
            limit: Some(1),
            offset: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(paged[0].id, later.id);
}

#[tokio::test]
async fn admin_edits_never_touch_occupancy() {
    let f = fixture().await;
    let schedule = f
        .service
        .create_schedule(request(f.doctor_id, day(3), TimeSlot::Morning, 5))
        .await
        .unwrap();
    f.ledger.reserve(schedule.id).await.unwrap();

    let grow = UpdateScheduleRequest {
        max_patients: Some(10),
        ..Default::default()
    };
    f.service.update_schedule(schedule.id, grow).await.unwrap();

    let stored = f.store.get(schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.current_patients, 1);
    assert_eq!(stored.max_patients, 10);
}
