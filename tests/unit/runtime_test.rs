//! Tests for the caller-facing API

use std::sync::Arc;

use chrono::NaiveTime;
use prometheus_shift_slots::core::{AllocationService, BusinessDayId, NewSlot, SlotCatalog, SlotId, TenantId};
use prometheus_shift_slots::infra::InMemoryStore;
use prometheus_shift_slots::runtime::{
    allocate_member, cancel_assignment, AllocationOutcome, AllocationRequest,
};

async fn setup(required_count: i32) -> (AllocationService<InMemoryStore>, TenantId, SlotId) {
    let store = Arc::new(InMemoryStore::new());
    let tenant_id = TenantId::new();
    let slot = SlotCatalog::new(Arc::clone(&store))
        .create_slot(NewSlot {
            tenant_id,
            business_day_id: BusinessDayId::new(),
            instance_id: None,
            slot_name: "Bar".to_string(),
            start_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            required_count,
            priority: 1,
        })
        .await
        .unwrap();
    (AllocationService::new(store), tenant_id, slot.slot_id())
}

fn request(tenant_id: TenantId, slot_id: SlotId, member: &str) -> AllocationRequest {
    AllocationRequest {
        tenant_id: tenant_id.to_string(),
        slot_id: slot_id.to_string(),
        member_id: member.to_string(),
        plan_id: None,
        method: prometheus_shift_slots::core::AssignmentMethod::Manual,
        is_outside_preference: false,
    }
}

#[tokio::test]
async fn test_full_slot_reports_fully_booked() {
    let (service, tenant_id, slot_id) = setup(1).await;

    let first = allocate_member(&service, &request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string())).await;
    assert_eq!(first.outcome, AllocationOutcome::Confirmed);
    assert!(first.assignment_id.is_some());

    let second = allocate_member(&service, &request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string())).await;
    assert_eq!(second.outcome, AllocationOutcome::FullyBooked);
    assert!(!second.retryable);
    assert!(second.reason.unwrap().contains("fully booked"));
}

#[tokio::test]
async fn test_duplicate_reports_already_assigned() {
    let (service, tenant_id, slot_id) = setup(3).await;
    let member = uuid::Uuid::new_v4().to_string();

    allocate_member(&service, &request(tenant_id, slot_id, &member)).await;
    let again = allocate_member(&service, &request(tenant_id, slot_id, &member)).await;
    assert_eq!(again.outcome, AllocationOutcome::AlreadyAssigned);
}

#[tokio::test]
async fn test_malformed_id_is_invalid() {
    let (service, tenant_id, slot_id) = setup(1).await;
    let response = allocate_member(&service, &request(tenant_id, slot_id, "not-a-uuid")).await;
    assert_eq!(response.outcome, AllocationOutcome::Invalid);
    assert!(response.reason.unwrap().contains("member_id"));
}

#[tokio::test]
async fn test_other_tenant_is_not_found() {
    let (service, _, slot_id) = setup(1).await;
    let response = allocate_member(
        &service,
        &request(TenantId::new(), slot_id, &uuid::Uuid::new_v4().to_string()),
    )
    .await;
    assert_eq!(response.outcome, AllocationOutcome::NotFound);
}

#[tokio::test]
async fn test_cancel_then_cancel_again() {
    let (service, tenant_id, slot_id) = setup(1).await;
    let booked = allocate_member(&service, &request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string())).await;
    let assignment_id = booked.assignment_id.unwrap().to_string();

    let cancelled = cancel_assignment(&service, &tenant_id.to_string(), &assignment_id).await;
    assert_eq!(cancelled.outcome, AllocationOutcome::Cancelled);

    let again = cancel_assignment(&service, &tenant_id.to_string(), &assignment_id).await;
    assert_eq!(again.outcome, AllocationOutcome::Invalid);
}

#[tokio::test]
async fn test_blank_plan_id_means_no_plan() {
    let (service, tenant_id, slot_id) = setup(3).await;

    let mut blank = request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string());
    blank.plan_id = Some(String::new());
    let booked = allocate_member(&service, &blank).await;
    assert_eq!(booked.outcome, AllocationOutcome::Confirmed);

    let mut planned = request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string());
    planned.plan_id = Some(uuid::Uuid::new_v4().to_string());
    assert_eq!(allocate_member(&service, &planned).await.outcome, AllocationOutcome::Confirmed);

    let mut malformed = request(tenant_id, slot_id, &uuid::Uuid::new_v4().to_string());
    malformed.plan_id = Some("not-a-plan".to_string());
    let rejected = allocate_member(&service, &malformed).await;
    assert_eq!(rejected.outcome, AllocationOutcome::Invalid);
    assert!(rejected.reason.unwrap().contains("plan_id"));
}

#[test]
fn test_request_deserializes_with_defaults() {
    let json = r#"{ "tenant_id": "t", "slot_id": "s", "member_id": "m" }"#;
    let req: AllocationRequest = serde_json::from_str(json).unwrap();
    assert!(req.plan_id.is_none());
    assert!(!req.is_outside_preference);
}

#[test]
fn test_outcome_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&AllocationOutcome::FullyBooked).unwrap(), "\"fully_booked\"");
}
