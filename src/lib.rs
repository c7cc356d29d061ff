//! # Prometheus Shift Slots
//!
//! Capacity allocation and assignment lifecycle for staff and volunteer shift
//! scheduling.
//!
//! A [`Slot`](core::Slot) is a time window on a business day that needs
//! `required_count` confirmed members. An [`Assignment`](core::Assignment) is
//! one member's claim against one slot. The crate guarantees that concurrent
//! requests never confirm more members on a slot than it has room for.
//!
//! ## Core Problem Solved
//!
//! Reading the confirmed count and inserting a new assignment are two steps.
//! Two requests that both read "one place left" would each insert, and the
//! slot would be over-booked. Every write that can change the confirmed count
//! therefore runs inside an [`AllocationTx`](core::AllocationTx) that first
//! takes the slot's exclusive lock and only then re-reads and decides.
//!
//! ## Key Features
//!
//! - **Per-slot serialization**: requests for different slots never wait on
//!   each other; lock timeouts surface as a retryable conflict.
//! - **Two-axis assignment state**: cancellation (kept as history) and
//!   administrative deletion (a tombstone) are independent.
//! - **Overnight windows**: a slot whose end time is not after its start time
//!   wraps past midnight.
//! - **Tenant isolation**: every query is tenant-scoped; foreign rows look
//!   exactly like missing ones.
//! - **Two backends**: an in-process store with per-slot async locks, and
//!   PostgreSQL with row locks (feature `postgres`).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_shift_slots::core::{AllocateMember, AllocationService, AssignmentMethod};
//! use prometheus_shift_slots::infra::InMemoryStore;
//!
//! let service = AllocationService::new(Arc::new(InMemoryStore::new()));
//! let assignment = service
//!     .allocate(AllocateMember {
//!         tenant_id,
//!         slot_id,
//!         member_id,
//!         plan_id: None,
//!         method: AssignmentMethod::Manual,
//!         is_outside_preference: false,
//!     })
//!     .await?;
//! ```
//!
//! For complete flows, see `tests/allocation_scenarios_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Entities, persistence contracts, and the allocation protocol.
pub mod core;
/// Configuration models for the store backend and lock timeouts.
pub mod config;
/// Builders to construct allocation services from configuration.
pub mod builders;
/// Store backends.
pub mod infra;
/// Caller-facing request and response models.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::core::{AppResult, SchedulingError};
