//! Tests for error types

use prometheus_shift_slots::core::{ErrorKind, SchedulingError};

#[test]
fn test_capacity_exceeded_message() {
    let err = SchedulingError::CapacityExceeded {
        slot_id: "s1".to_string(),
        required_count: 2,
        confirmed: 2,
    };
    assert_eq!(format!("{}", err), "slot s1 is fully booked (2/2 confirmed)");
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}

#[test]
fn test_capacity_distinct_from_validation() {
    let full = SchedulingError::CapacityExceeded {
        slot_id: "s1".to_string(),
        required_count: 1,
        confirmed: 1,
    };
    let invalid = SchedulingError::validation("required_count", "must be at least 1");
    assert_ne!(full.kind(), invalid.kind());
}

#[test]
fn test_duplicate_assignment_error() {
    let err = SchedulingError::DuplicateAssignment {
        slot_id: "s1".to_string(),
        member_id: "m1".to_string(),
    };
    assert_eq!(format!("{}", err), "member m1 is already confirmed on slot s1");
    assert_eq!(err.kind(), ErrorKind::DuplicateAssignment);
}

#[test]
fn test_not_found_error() {
    let err = SchedulingError::not_found("slot", "abc");
    assert_eq!(format!("{}", err), "slot abc not found");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_backend_error() {
    let err = SchedulingError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
    assert!(!err.is_retryable());
}

#[test]
fn test_conflict_is_retryable() {
    let err = SchedulingError::Conflict("lock timeout".to_string());
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());
}

#[test]
fn test_error_kind_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorKind::CapacityExceeded).unwrap();
    assert_eq!(json, "\"capacity_exceeded\"");
}

#[test]
fn test_converts_into_anyhow() {
    fn fails() -> prometheus_shift_slots::AppResult<()> {
        Err(SchedulingError::not_found("assignment", "x"))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<SchedulingError>().is_some());
}
