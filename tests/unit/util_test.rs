//! Tests for utility functions

use chrono::{Duration, TimeZone, Utc};
use prometheus_shift_slots::util::{init_tracing, Clock, FixedClock, SystemClock};

#[test]
fn test_fixed_clock_advances() {
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
    let clock = FixedClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::minutes(30));
    assert_eq!(clock.now(), start + Duration::minutes(30));
}

#[test]
fn test_fixed_clock_clones_share_time() {
    let start = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
    let clock = FixedClock::new(start);
    let other = clock.clone();
    clock.set(start + Duration::hours(2));
    assert_eq!(other.now(), start + Duration::hours(2));
}

#[test]
fn test_system_clock_moves_forward() {
    let clock = SystemClock;
    let first = clock.now();
    assert!(clock.now() >= first);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
