//! Tests for the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use prometheus_shift_slots::core::{
    AllocationStore, AllocationTx, Assignment, AssignmentMethod, AssignmentRecord, AssignmentRepository, AssignmentStatus,
    BusinessDayId, ErrorKind, EventId, Instance, InstanceRepository, MemberId, NewSlot, Position,
    PositionRepository, Slot, SlotId, SlotRepository, TenantId,
};
use prometheus_shift_slots::infra::InMemoryStore;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn slot(tenant_id: TenantId, business_day_id: BusinessDayId, name: &str, priority: i32) -> NewSlot {
    NewSlot {
        tenant_id,
        business_day_id,
        instance_id: None,
        slot_name: name.to_string(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        required_count: 2,
        priority,
    }
}

async fn insert_slot(store: &InMemoryStore, tenant_id: TenantId) -> Slot {
    let slot = Slot::new(t0(), slot(tenant_id, BusinessDayId::new(), "Gate", 1)).unwrap();
    store.insert(&slot).await.unwrap();
    slot
}

fn confirmed(tenant_id: TenantId, slot_id: SlotId, at: chrono::DateTime<Utc>) -> Assignment {
    Assignment::new(at, tenant_id, None, slot_id, MemberId::new(), AssignmentMethod::Manual, false).unwrap()
}

#[tokio::test]
async fn test_slots_ordered_by_priority_then_created_at() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let day = BusinessDayId::new();

    let late_high = Slot::new(t0() + ChronoDuration::minutes(5), slot(tenant_id, day, "late p1", 1)).unwrap();
    let early_high = Slot::new(t0(), slot(tenant_id, day, "early p1", 1)).unwrap();
    let low = Slot::new(t0() + ChronoDuration::minutes(10), slot(tenant_id, day, "p0", 0)).unwrap();
    let other_day = Slot::new(t0(), slot(tenant_id, BusinessDayId::new(), "other", 0)).unwrap();
    for s in [&late_high, &early_high, &low, &other_day] {
        store.insert(s).await.unwrap();
    }

    let names: Vec<String> = store
        .find_by_business_day_id(tenant_id, day)
        .await
        .unwrap()
        .iter()
        .map(|s| s.slot_name().to_string())
        .collect();
    assert_eq!(names, vec!["p0", "early p1", "late p1"]);
}

#[tokio::test]
async fn test_other_tenant_sees_not_found() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let err = SlotRepository::find_by_id(&store, TenantId::new(), slot.slot_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let mut tx = store.begin().await.unwrap();
    let err = tx.lock_slot(TenantId::new(), slot.slot_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_write_without_lock_is_rejected() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .save_assignment(&confirmed(tenant_id, slot.slot_id(), t0()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Backend);
}

#[tokio::test]
async fn test_staged_writes_visible_only_after_commit() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let mut tx = store.begin().await.unwrap();
    tx.lock_slot(tenant_id, slot.slot_id()).await.unwrap();
    tx.save_assignment(&confirmed(tenant_id, slot.slot_id(), t0())).await.unwrap();

    assert_eq!(tx.count_confirmed_by_slot_id(tenant_id, slot.slot_id()).await.unwrap(), 1);
    assert_eq!(store.count_confirmed_by_slot_id(tenant_id, slot.slot_id()).await.unwrap(), 0);

    tx.commit().await.unwrap();
    assert_eq!(store.count_confirmed_by_slot_id(tenant_id, slot.slot_id()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_rollback_and_drop_discard_writes() {
    let store = InMemoryStore::with_lock_timeout(Duration::from_millis(50));
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let mut tx = store.begin().await.unwrap();
    tx.lock_slot(tenant_id, slot.slot_id()).await.unwrap();
    tx.save_assignment(&confirmed(tenant_id, slot.slot_id(), t0())).await.unwrap();
    tx.rollback().await.unwrap();

    {
        let mut tx = store.begin().await.unwrap();
        tx.lock_slot(tenant_id, slot.slot_id()).await.unwrap();
        tx.save_assignment(&confirmed(tenant_id, slot.slot_id(), t0())).await.unwrap();
    }

    assert_eq!(store.assignment_row_count(), 0);
    // The lock was released by both paths.
    let mut tx = store.begin().await.unwrap();
    assert!(tx.lock_slot(tenant_id, slot.slot_id()).await.is_ok());
}

#[tokio::test]
async fn test_second_locker_times_out_with_conflict() {
    let store = InMemoryStore::with_lock_timeout(Duration::from_millis(30));
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let mut holder = store.begin().await.unwrap();
    holder.lock_slot(tenant_id, slot.slot_id()).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.lock_slot(tenant_id, slot.slot_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_history_excludes_deleted_and_keeps_cancelled() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let kept = confirmed(tenant_id, slot.slot_id(), t0());
    let mut cancelled = confirmed(tenant_id, slot.slot_id(), t0() + ChronoDuration::minutes(1));
    let mut deleted = confirmed(tenant_id, slot.slot_id(), t0() + ChronoDuration::minutes(2));
    cancelled.cancel(t0() + ChronoDuration::hours(1)).unwrap();
    deleted.delete(t0() + ChronoDuration::hours(1)).unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.lock_slot(tenant_id, slot.slot_id()).await.unwrap();
    for a in [&kept, &cancelled, &deleted] {
        tx.save_assignment(a).await.unwrap();
    }
    tx.commit().await.unwrap();

    let history = store.find_by_slot_id(tenant_id, slot.slot_id()).await.unwrap();
    let ids: Vec<_> = history.iter().map(Assignment::assignment_id).collect();
    assert_eq!(ids, vec![kept.assignment_id(), cancelled.assignment_id()]);

    let live = store.find_confirmed_by_slot_id(tenant_id, slot.slot_id()).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].assignment_id(), kept.assignment_id());

    let err = AssignmentRepository::find_by_id(&store, tenant_id, deleted.assignment_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_inconsistent_row_surfaces_as_invariant_violation() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let mut record: AssignmentRecord = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    record.status = AssignmentStatus::Cancelled;
    let assignment_id = record.assignment_id;
    store.seed_assignment_record(record).await.unwrap();

    let err = AssignmentRepository::find_by_id(&store, tenant_id, assignment_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
}

#[tokio::test]
async fn test_member_lookup_spans_slots() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let first = insert_slot(&store, tenant_id).await;
    let second = insert_slot(&store, tenant_id).await;
    let member_id = MemberId::new();

    for (slot_id, offset) in [(first.slot_id(), 0), (second.slot_id(), 1)] {
        let a = Assignment::new(
            t0() + ChronoDuration::minutes(offset),
            tenant_id,
            None,
            slot_id,
            member_id,
            AssignmentMethod::Auto,
            true,
        )
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.lock_slot(tenant_id, slot_id).await.unwrap();
        tx.save_assignment(&a).await.unwrap();
        tx.commit().await.unwrap();
    }

    let mine = store.find_by_member_id(tenant_id, member_id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].slot_id(), first.slot_id());
    assert!(store
        .exists_by_slot_id_and_member_id(tenant_id, second.slot_id(), member_id)
        .await
        .unwrap());
    assert!(store.find_by_member_id(TenantId::new(), member_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_instances_and_positions_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    let tenant_id = TenantId::new();
    let event_id = EventId::new();

    let second = Instance::new(t0(), tenant_id, event_id, "Hall B", 2, None).unwrap();
    let mut first = Instance::new(t0(), tenant_id, event_id, "Hall A", 1, Some(40)).unwrap();
    InstanceRepository::save(store.as_ref(), &second).await.unwrap();
    InstanceRepository::save(store.as_ref(), &first).await.unwrap();

    let names: Vec<String> = store
        .find_by_event_id(tenant_id, event_id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(names, vec!["Hall A", "Hall B"]);

    first.delete(t0() + ChronoDuration::days(1)).unwrap();
    InstanceRepository::save(store.as_ref(), &first).await.unwrap();
    assert_eq!(store.find_by_event_id(tenant_id, event_id).await.unwrap().len(), 1);

    let mut usher = Position::new(t0(), tenant_id, "Usher", "", 1).unwrap();
    let cook = Position::new(t0(), tenant_id, "Cook", "Kitchen", 0).unwrap();
    usher.deactivate(t0());
    PositionRepository::save(store.as_ref(), &usher).await.unwrap();
    PositionRepository::save(store.as_ref(), &cook).await.unwrap();

    assert_eq!(store.find_all(tenant_id, false).await.unwrap().len(), 2);
    let active = store.find_all(tenant_id, true).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].position_name(), "Cook");

    let err = PositionRepository::find_by_id(store.as_ref(), TenantId::new(), cook.position_id())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_seeded_records_respect_capacity_and_duplicates() {
    let store = InMemoryStore::new();
    let tenant_id = TenantId::new();
    let slot = insert_slot(&store, tenant_id).await;

    let first = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    let mut duplicate = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    duplicate.member_id = first.member_id;
    store.seed_assignment_record(first).await.unwrap();

    let err = store.seed_assignment_record(duplicate).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateAssignment);

    let second = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    store.seed_assignment_record(second).await.unwrap();

    let third = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    let err = store.seed_assignment_record(third).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    assert_eq!(store.count_confirmed_by_slot_id(tenant_id, slot.slot_id()).await.unwrap(), 2);

    // Cancelled history does not take a place.
    let mut cancelled = confirmed(tenant_id, slot.slot_id(), t0()).to_record();
    cancelled.status = AssignmentStatus::Cancelled;
    cancelled.cancelled_at = Some(t0());
    store.seed_assignment_record(cancelled).await.unwrap();
    assert_eq!(store.assignment_row_count(), 3);

    let orphan = confirmed(tenant_id, SlotId::new(), t0()).to_record();
    let err = store.seed_assignment_record(orphan).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
