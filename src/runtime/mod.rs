//! Caller-facing API surface.

pub mod api;

pub use api::{allocate_member, cancel_assignment, AllocationOutcome, AllocationRequest, AllocationResponse};
