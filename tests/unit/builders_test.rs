//! Tests for builder modules

use chrono::NaiveTime;
use prometheus_shift_slots::builders::{build_store, ServiceBuilder};
use prometheus_shift_slots::config::{AllocationConfig, StoreBackendConfig};
use prometheus_shift_slots::core::{
    AllocateMember, AssignmentMethod, AssignmentRepository, BusinessDayId, ErrorKind, MemberId, NewSlot,
    TenantId,
};

#[tokio::test]
async fn test_builder_wires_in_memory_services() {
    let services = ServiceBuilder::new(AllocationConfig::default()).build().await.unwrap();
    let tenant_id = TenantId::new();

    let slot = services
        .catalog
        .create_slot(NewSlot {
            tenant_id,
            business_day_id: BusinessDayId::new(),
            instance_id: None,
            slot_name: "Door".to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            required_count: 1,
            priority: 1,
        })
        .await
        .unwrap();

    let assignment = services
        .allocation
        .allocate(AllocateMember {
            tenant_id,
            slot_id: slot.slot_id(),
            member_id: MemberId::new(),
            plan_id: None,
            method: AssignmentMethod::Manual,
            is_outside_preference: false,
        })
        .await
        .unwrap();
    assert!(assignment.is_confirmed());

    // Both services see the same store.
    let count = services
        .store
        .count_confirmed_by_slot_id(tenant_id, slot.slot_id())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_build_store_rejects_invalid_config() {
    let cfg = AllocationConfig {
        lock_timeout_ms: 0,
        ..AllocationConfig::default()
    };
    let err = build_store(&cfg, false).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_build_store_postgres_without_url_fails_fast() {
    let cfg = AllocationConfig {
        backend: StoreBackendConfig::Postgres,
        database_url: None,
        ..AllocationConfig::default()
    };
    let err = ServiceBuilder::new(cfg).build().await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_builder_exposes_config() {
    let builder = ServiceBuilder::new(AllocationConfig::default()).with_migrations(true);
    assert_eq!(builder.config().backend, StoreBackendConfig::InMemory);
}
