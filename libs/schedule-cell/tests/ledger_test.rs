use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use uuid::Uuid;

use schedule_cell::{
    InMemoryScheduleStore, QuotaLedger, Schedule, ScheduleChanges, ScheduleError, ScheduleStatus, ScheduleStore,
    TimeSlot, OccupancyGuard,
};

async fn seed(store: &InMemoryScheduleStore, max_patients: i32, current_patients: i32) -> Schedule {
    let now = Utc::now();
    store
        .insert(Schedule {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            schedule_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            time_slot: TimeSlot::Morning,
            max_patients,
            current_patients,
            status: ScheduleStatus::Open,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn reserve_takes_one_unit() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 2, 0).await;
    let ledger = QuotaLedger::new(store.clone());

    let after = ledger.reserve(schedule.id).await.unwrap();
    assert_eq!(after.current_patients, 1);
    assert_eq!(after.remaining_quota(), 1);
}

#[tokio::test]
async fn reserve_on_full_schedule_is_capacity_exceeded() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 2, 2).await;
    let ledger = QuotaLedger::new(store.clone());

    assert_matches!(ledger.reserve(schedule.id).await, Err(ScheduleError::CapacityExceeded));
    let unchanged = store.get(schedule.id).await.unwrap().unwrap();
    assert_eq!(unchanged.current_patients, 2);
}

#[tokio::test]
async fn reserve_on_closed_schedule_is_rejected() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 3, 0).await;
    let close = ScheduleChanges {
        status: Some(ScheduleStatus::Closed),
        ..Default::default()
    };
    store.update_guarded(schedule.id, &close, OccupancyGuard::Any).await.unwrap();
    let ledger = QuotaLedger::new(store.clone());

    assert_matches!(ledger.reserve(schedule.id).await, Err(ScheduleError::ScheduleClosed));
}

#[tokio::test]
async fn unknown_schedule_is_not_found() {
    let ledger = QuotaLedger::new(Arc::new(InMemoryScheduleStore::new()));

    assert_matches!(ledger.reserve(Uuid::new_v4()).await, Err(ScheduleError::NotFound));
    assert_matches!(ledger.release(Uuid::new_v4(), Uuid::new_v4()).await, Err(ScheduleError::NotFound));
}

#[tokio::test]
async fn release_below_zero_is_an_invariant_violation() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 2, 0).await;
    let ledger = QuotaLedger::new(store.clone());

    assert_matches!(ledger.release(schedule.id, Uuid::new_v4()).await, Err(ScheduleError::InvariantViolation(_)));
    assert_eq!(store.get(schedule.id).await.unwrap().unwrap().current_patients, 0);
}

#[tokio::test]
async fn release_is_allowed_on_closed_schedule() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 2, 1).await;
    let close = ScheduleChanges {
        status: Some(ScheduleStatus::Closed),
        ..Default::default()
    };
    store.update_guarded(schedule.id, &close, OccupancyGuard::Any).await.unwrap();
    let ledger = QuotaLedger::new(store.clone());

    let after = ledger.release(schedule.id, Uuid::new_v4()).await.unwrap();
    assert_eq!(after.current_patients, 0);
    assert_eq!(after.status, ScheduleStatus::Closed);
}

#[tokio::test]
async fn repeating_a_release_for_the_same_hold_frees_one_unit() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 3, 3).await;
    let ledger = QuotaLedger::new(store.clone());
    let hold = Uuid::new_v4();

    assert_eq!(ledger.release(schedule.id, hold).await.unwrap().current_patients, 2);
    assert_eq!(ledger.release(schedule.id, hold).await.unwrap().current_patients, 2);
    assert_eq!(ledger.release(schedule.id, Uuid::new_v4()).await.unwrap().current_patients, 1);
}

#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 5, 0).await;
    let ledger = Arc::new(QuotaLedger::new(store.clone()));

    let attempts = (0..12).map(|_| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { ledger.reserve(schedule.id).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

    let granted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(ScheduleError::CapacityExceeded)))
        .count();
    assert_eq!(granted, 5);
    assert_eq!(refused, 7);
    assert_eq!(store.get(schedule.id).await.unwrap().unwrap().current_patients, 5);
}

#[tokio::test]
async fn interleaved_reserve_and_release_stay_in_bounds() {
    let store = Arc::new(InMemoryScheduleStore::new());
    let schedule = seed(&store, 3, 3).await;
    let ledger = Arc::new(QuotaLedger::new(store.clone()));

    let mut tasks = Vec::new();
    for i in 0..10 {
        let ledger = Arc::clone(&ledger);
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                ledger.release(schedule.id, Uuid::new_v4()).await.map(|_| ())
            } else {
                ledger.reserve(schedule.id).await.map(|_| ())
            }
        }));
    }
    join_all(tasks).await;

    let after = store.get(schedule.id).await.unwrap().unwrap();
    assert!(after.occupancy_in_bounds());
}
