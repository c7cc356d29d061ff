//! Assignment entity: one member's claim against one slot.
//!
//! Two independent axes describe an assignment:
//!
//! - `status` (`Confirmed` → `Cancelled`), driven by member or admin
//!   self-service and kept visible as history;
//! - `deleted_at`, an administrative tombstone that removes the row from
//!   both the capacity count and the history views.
//!
//! Neither transition is reversible. Re-booking a member always creates a new
//! assignment row.
//!
//! Constructing an assignment performs no capacity check. New assignments
//! must come from [`AllocationService`](crate::core::AllocationService), which
//! checks capacity while holding the slot lock.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulingError};
use super::ids::{AssignmentId, MemberId, PlanId, SlotId, TenantId};

/// Confirmation axis of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Counts toward the slot's capacity while not deleted.
    Confirmed,
    /// Released by the member or an admin.
    Cancelled,
}

impl AssignmentStatus {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SchedulingError::validation(
                "status",
                format!("unknown assignment status `{other}`"),
            )),
        }
    }
}

/// How the assignment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Produced by a planning run.
    Auto,
    /// Picked by an admin or by the member.
    Manual,
}

impl AssignmentMethod {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentMethod {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(SchedulingError::validation(
                "method",
                format!("unknown assignment method `{other}`"),
            )),
        }
    }
}

/// Persisted shape of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Assignment id.
    pub assignment_id: AssignmentId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Planning run that produced it, if any.
    pub plan_id: Option<PlanId>,
    /// Target slot.
    pub slot_id: SlotId,
    /// Assigned member.
    pub member_id: MemberId,
    /// Confirmation axis.
    pub status: AssignmentStatus,
    /// How it was made.
    pub method: AssignmentMethod,
    /// Assigned against the member's stated preferences.
    pub is_outside_preference: bool,
    /// When the claim was accepted.
    pub assigned_at: DateTime<Utc>,
    /// Set iff `status` is cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Administrative tombstone.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Assignment of a member to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    assignment_id: AssignmentId,
    tenant_id: TenantId,
    plan_id: Option<PlanId>,
    slot_id: SlotId,
    member_id: MemberId,
    status: AssignmentStatus,
    method: AssignmentMethod,
    is_outside_preference: bool,
    assigned_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Assignment {
    /// Create a confirmed assignment with `assigned_at = now`.
    pub fn new(
        now: DateTime<Utc>,
        tenant_id: TenantId,
        plan_id: Option<PlanId>,
        slot_id: SlotId,
        member_id: MemberId,
        method: AssignmentMethod,
        is_outside_preference: bool,
    ) -> Result<Self> {
        let assignment = Self {
            assignment_id: AssignmentId::new(),
            tenant_id: tenant_id.require()?,
            plan_id: plan_id.map(PlanId::require).transpose()?,
            slot_id: slot_id.require()?,
            member_id: member_id.require()?,
            status: AssignmentStatus::Confirmed,
            method,
            is_outside_preference,
            assigned_at: now,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assignment.check_invariants()?;
        Ok(assignment)
    }

    /// Rebuild an assignment from storage.
    ///
    /// Fails with an invariant violation when `status` and `cancelled_at`
    /// disagree.
    pub fn reconstruct(record: AssignmentRecord) -> Result<Self> {
        let assignment = Self {
            assignment_id: record.assignment_id,
            tenant_id: record.tenant_id,
            plan_id: record.plan_id,
            slot_id: record.slot_id,
            member_id: record.member_id,
            status: record.status,
            method: record.method,
            is_outside_preference: record.is_outside_preference,
            assigned_at: record.assigned_at,
            cancelled_at: record.cancelled_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        };
        assignment.check_invariants()?;
        Ok(assignment)
    }

    /// Persisted shape of this assignment.
    pub const fn to_record(&self) -> AssignmentRecord {
        AssignmentRecord {
            assignment_id: self.assignment_id,
            tenant_id: self.tenant_id,
            plan_id: self.plan_id,
            slot_id: self.slot_id,
            member_id: self.member_id,
            status: self.status,
            method: self.method,
            is_outside_preference: self.is_outside_preference,
            assigned_at: self.assigned_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    fn check_invariants(&self) -> Result<()> {
        let cancelled = self.status == AssignmentStatus::Cancelled;
        if cancelled != self.cancelled_at.is_some() {
            return Err(SchedulingError::InconsistentRecord {
                entity: "assignment",
                id: self.assignment_id.to_string(),
                message: format!(
                    "status `{}` does not match cancelled_at {:?}",
                    self.status, self.cancelled_at
                ),
            });
        }
        if self.assignment_id.is_nil() || self.tenant_id.is_nil() || self.slot_id.is_nil() || self.member_id.is_nil() {
            return Err(SchedulingError::InconsistentRecord {
                entity: "assignment",
                id: self.assignment_id.to_string(),
                message: "missing identifier".into(),
            });
        }
        Ok(())
    }

    /// `confirmed → cancelled`. The state is untouched when the call fails.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == AssignmentStatus::Cancelled {
            return Err(SchedulingError::AlreadyCancelled {
                assignment_id: self.assignment_id.to_string(),
            });
        }
        self.status = AssignmentStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Administrative soft delete, allowed from either status.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.deleted_at.is_some() {
            return Err(SchedulingError::AlreadyDeleted {
                entity: "assignment",
                id: self.assignment_id.to_string(),
            });
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Confirmed and not deleted; the only state that counts toward capacity.
    pub fn is_confirmed(&self) -> bool {
        self.status == AssignmentStatus::Confirmed && self.deleted_at.is_none()
    }

    /// Status is cancelled (regardless of the tombstone).
    pub fn is_cancelled(&self) -> bool {
        self.status == AssignmentStatus::Cancelled
    }

    /// Tombstoned by an admin.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Assignment id.
    pub const fn assignment_id(&self) -> AssignmentId {
        self.assignment_id
    }

    /// Owning tenant.
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Planning run, if any.
    pub const fn plan_id(&self) -> Option<PlanId> {
        self.plan_id
    }

    /// Target slot.
    pub const fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// Assigned member.
    pub const fn member_id(&self) -> MemberId {
        self.member_id
    }

    /// Confirmation axis.
    pub const fn status(&self) -> AssignmentStatus {
        self.status
    }

    /// How it was made.
    pub const fn method(&self) -> AssignmentMethod {
        self.method
    }

    /// Assigned against the member's preferences.
    pub const fn is_outside_preference(&self) -> bool {
        self.is_outside_preference
    }

    /// When the claim was accepted.
    pub const fn assigned_at(&self) -> DateTime<Utc> {
        self.assigned_at
    }

    /// When it was cancelled.
    pub const fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Creation instant.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation instant.
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Tombstone.
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
