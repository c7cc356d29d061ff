//! Allocation protocol: the only code path that changes how many confirmed
//! assignments a slot holds.
//!
//! Every write follows the same shape:
//!
//! 1. open a transaction,
//! 2. take the slot lock,
//! 3. re-read the slot and the live confirmed count under the lock,
//! 4. decide,
//! 5. persist and commit, or roll back on any error.
//!
//! Locks are scoped per `(tenant, slot)`, so requests for different slots run
//! in parallel and requests for the same slot serialize. Lock timeouts surface
//! as [`SchedulingError::Conflict`]; retrying is left to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::assignment::{Assignment, AssignmentMethod};
use super::error::{Result, SchedulingError};
use super::ids::{AssignmentId, MemberId, PlanId, SlotId, TenantId};
use super::repository::{AllocationTx, AssignmentRepository, ShiftStore, SlotRepository};
use super::slot::Slot;
use crate::util::clock::{Clock, SystemClock};

/// Request to confirm a member on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateMember {
    /// Caller's tenant.
    pub tenant_id: TenantId,
    /// Target slot.
    pub slot_id: SlotId,
    /// Member to confirm.
    pub member_id: MemberId,
    /// Planning run, if the request comes from one.
    pub plan_id: Option<PlanId>,
    /// How the assignment is made.
    pub method: AssignmentMethod,
    /// Assigned against the member's stated preferences.
    pub is_outside_preference: bool,
}

/// Point-in-time capacity view of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    /// Slot id.
    pub slot_id: SlotId,
    /// Capacity.
    pub required_count: i32,
    /// Live confirmed assignments.
    pub confirmed: i64,
    /// Free places; zero when full or over-subscribed.
    pub remaining: i64,
}

impl SlotAvailability {
    fn new(slot: &Slot, confirmed: i64) -> Self {
        Self {
            slot_id: slot.slot_id(),
            required_count: slot.required_count(),
            confirmed,
            remaining: (i64::from(slot.required_count()) - confirmed).max(0),
        }
    }

    /// Whether no further allocation can succeed.
    pub const fn is_full(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of [`AllocationService::resize_slot`].
#[derive(Debug, Clone)]
pub struct ResizeOutcome {
    /// Slot after the change.
    pub slot: Slot,
    /// Live confirmed assignments at the time of the change, oldest first.
    pub confirmed: Vec<Assignment>,
    /// How many confirmed assignments exceed the new capacity. These are
    /// left in place; nothing is cancelled automatically.
    pub over_subscribed_by: i64,
}

/// Runs the allocation protocol against a store.
pub struct AllocationService<S: ShiftStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: ShiftStore + ?Sized> Clone for AllocationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ShiftStore + ?Sized> AllocationService<S> {
    /// Create a service using the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Underlying store, for read-side queries.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Confirm a member on a slot if capacity allows.
    ///
    /// Fails with [`SchedulingError::CapacityExceeded`] when the slot is
    /// full, [`SchedulingError::DuplicateAssignment`] when the member is
    /// already confirmed there, and [`SchedulingError::NotFound`] when the
    /// slot is missing, deleted, or belongs to another tenant.
    pub async fn allocate(&self, request: AllocateMember) -> Result<Assignment> {
        let mut tx = self.store.begin().await?;
        match self.allocate_locked(tx.as_mut(), &request).await {
            Ok(assignment) => {
                tx.commit().await?;
                tracing::info!(
                    tenant_id = %request.tenant_id,
                    slot_id = %request.slot_id,
                    member_id = %request.member_id,
                    assignment_id = %assignment.assignment_id(),
                    "assignment confirmed"
                );
                Ok(assignment)
            }
            Err(err) => Err(rollback(tx, err).await),
        }
    }

    async fn allocate_locked(&self, tx: &mut dyn AllocationTx, request: &AllocateMember) -> Result<Assignment> {
        let slot = tx.lock_slot(request.tenant_id, request.slot_id).await?;
        if slot.is_deleted() {
            return Err(SchedulingError::not_found("slot", request.slot_id));
        }

        let confirmed = tx
            .count_confirmed_by_slot_id(request.tenant_id, request.slot_id)
            .await?;
        if confirmed >= i64::from(slot.required_count()) {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                slot_id = %request.slot_id,
                member_id = %request.member_id,
                confirmed,
                required_count = slot.required_count(),
                "allocation rejected: slot is full"
            );
            return Err(SchedulingError::CapacityExceeded {
                slot_id: request.slot_id.to_string(),
                required_count: slot.required_count(),
                confirmed,
            });
        }

        if tx
            .exists_by_slot_id_and_member_id(request.tenant_id, request.slot_id, request.member_id)
            .await?
        {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                slot_id = %request.slot_id,
                member_id = %request.member_id,
                "allocation rejected: member already confirmed"
            );
            return Err(SchedulingError::DuplicateAssignment {
                slot_id: request.slot_id.to_string(),
                member_id: request.member_id.to_string(),
            });
        }

        let assignment = Assignment::new(
            self.clock.now(),
            request.tenant_id,
            request.plan_id,
            request.slot_id,
            request.member_id,
            request.method,
            request.is_outside_preference,
        )?;
        tx.save_assignment(&assignment).await?;
        Ok(assignment)
    }

    /// Cancel a confirmed assignment, freeing its place on the slot.
    ///
    /// A second cancel fails with [`SchedulingError::AlreadyCancelled`] and
    /// leaves the stored row untouched.
    pub async fn cancel(&self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        let assignment = self
            .mutate_assignment(tenant_id, assignment_id, |assignment, now| assignment.cancel(now))
            .await?;
        tracing::info!(
            tenant_id = %tenant_id,
            slot_id = %assignment.slot_id(),
            assignment_id = %assignment_id,
            "assignment cancelled"
        );
        Ok(assignment)
    }

    /// Administrative soft delete of an assignment in either status.
    pub async fn delete_assignment(&self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        let assignment = self
            .mutate_assignment(tenant_id, assignment_id, |assignment, now| assignment.delete(now))
            .await?;
        tracing::info!(
            tenant_id = %tenant_id,
            slot_id = %assignment.slot_id(),
            assignment_id = %assignment_id,
            was_confirmed = !assignment.is_cancelled(),
            "assignment deleted"
        );
        Ok(assignment)
    }

    async fn mutate_assignment<F>(&self, tenant_id: TenantId, assignment_id: AssignmentId, change: F) -> Result<Assignment>
    where
        F: FnOnce(&mut Assignment, DateTime<Utc>) -> Result<()> + Send,
    {
        // The slot id is needed to pick the lock; the row itself is re-read
        // once the lock is held.
        let slot_id = AssignmentRepository::find_by_id(self.store.as_ref(), tenant_id, assignment_id)
            .await?
            .slot_id();

        let mut tx = self.store.begin().await?;
        let result = async {
            tx.lock_slot(tenant_id, slot_id).await?;
            let mut assignment = tx.find_assignment(tenant_id, assignment_id).await?;
            change(&mut assignment, self.clock.now())?;
            tx.save_assignment(&assignment).await?;
            Ok::<_, SchedulingError>(assignment)
        }
        .await;

        match result {
            Ok(assignment) => {
                tx.commit().await?;
                Ok(assignment)
            }
            Err(err) => Err(rollback(tx, err).await),
        }
    }

    /// Change a slot's capacity under the slot lock.
    ///
    /// Shrinking below the live confirmed count is accepted. The surplus is
    /// reported in the outcome and logged, never resolved automatically.
    pub async fn resize_slot(&self, tenant_id: TenantId, slot_id: SlotId, required_count: i32) -> Result<ResizeOutcome> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut slot = tx.lock_slot(tenant_id, slot_id).await?;
            if slot.is_deleted() {
                return Err(SchedulingError::not_found("slot", slot_id));
            }
            slot.update_required_count(required_count, self.clock.now())?;
            let confirmed = tx.find_confirmed_by_slot_id_for_update(tenant_id, slot_id).await?;
            tx.save_slot(&slot).await?;
            Ok::<_, SchedulingError>((slot, confirmed))
        }
        .await;

        let (slot, confirmed) = match result {
            Ok(value) => value,
            Err(err) => return Err(rollback(tx, err).await),
        };
        tx.commit().await?;

        let confirmed_count = i64::try_from(confirmed.len()).unwrap_or(i64::MAX);
        let over_subscribed_by = (confirmed_count - i64::from(required_count)).max(0);
        if over_subscribed_by > 0 {
            tracing::warn!(
                tenant_id = %tenant_id,
                slot_id = %slot_id,
                required_count,
                confirmed = confirmed_count,
                over_subscribed_by,
                "slot capacity reduced below confirmed count"
            );
        } else {
            tracing::info!(tenant_id = %tenant_id, slot_id = %slot_id, required_count, "slot capacity changed");
        }
        Ok(ResizeOutcome {
            slot,
            confirmed,
            over_subscribed_by,
        })
    }

    /// Unlocked capacity snapshot; may be stale by the time it is read.
    pub async fn availability(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<SlotAvailability> {
        let slot = SlotRepository::find_by_id(self.store.as_ref(), tenant_id, slot_id).await?;
        let confirmed = self.store.count_confirmed_by_slot_id(tenant_id, slot_id).await?;
        Ok(SlotAvailability::new(&slot, confirmed))
    }
}

/// Roll back and hand the original error back. A failed rollback is logged;
/// the backend discards the transaction either way.
async fn rollback(tx: Box<dyn AllocationTx>, err: SchedulingError) -> SchedulingError {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
    }
    err
}
