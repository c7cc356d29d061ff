//! Caller-facing request/response models.
//!
//! Identifiers arrive as text and are parsed here, so a malformed id is a
//! validation outcome rather than a panic further in. Errors are folded into
//! an [`AllocationOutcome`] that a transport layer can render directly; in
//! particular a full slot is reported as `fully_booked`, never as a generic
//! validation failure.

use serde::{Deserialize, Serialize};

use crate::core::{
    AllocateMember, AllocationService, AssignmentId, AssignmentMethod, ErrorKind, MemberId, PlanId,
    SchedulingError, ShiftStore, SlotId, TenantId,
};

/// Allocation request as received from a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Caller's tenant.
    pub tenant_id: String,
    /// Target slot.
    pub slot_id: String,
    /// Member to confirm.
    pub member_id: String,
    /// Planning run, if any.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// How the assignment is made.
    #[serde(default = "default_method")]
    pub method: AssignmentMethod,
    /// Assigned against the member's stated preferences.
    #[serde(default)]
    pub is_outside_preference: bool,
}

const fn default_method() -> AssignmentMethod {
    AssignmentMethod::Manual
}

/// Result category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOutcome {
    /// The write was applied.
    Confirmed,
    /// Cancelled as requested.
    Cancelled,
    /// The slot has no free place.
    FullyBooked,
    /// The member is already confirmed on the slot.
    AlreadyAssigned,
    /// Slot or assignment does not exist for the tenant.
    NotFound,
    /// Malformed input or a rejected state transition.
    Invalid,
    /// Lock contention; safe to retry.
    Conflict,
    /// Backend failure.
    Failed,
}

impl From<ErrorKind> for AllocationOutcome {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CapacityExceeded => Self::FullyBooked,
            ErrorKind::DuplicateAssignment => Self::AlreadyAssigned,
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Validation | ErrorKind::InvariantViolation => Self::Invalid,
            ErrorKind::Conflict => Self::Conflict,
            ErrorKind::Backend => Self::Failed,
        }
    }
}

/// Response for allocation and cancellation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResponse {
    /// Result category.
    pub outcome: AllocationOutcome,
    /// Affected assignment, when the request succeeded.
    pub assignment_id: Option<AssignmentId>,
    /// Human-readable failure reason.
    pub reason: Option<String>,
    /// Whether resubmitting the same request may succeed.
    pub retryable: bool,
}

impl AllocationResponse {
    const fn success(outcome: AllocationOutcome, assignment_id: AssignmentId) -> Self {
        Self {
            outcome,
            assignment_id: Some(assignment_id),
            reason: None,
            retryable: false,
        }
    }

    fn from_error(err: &SchedulingError) -> Self {
        Self {
            outcome: err.kind().into(),
            assignment_id: None,
            reason: Some(err.to_string()),
            retryable: err.is_retryable(),
        }
    }
}

impl AllocationRequest {
    fn parse(&self) -> Result<AllocateMember, SchedulingError> {
        Ok(AllocateMember {
            tenant_id: TenantId::parse(&self.tenant_id)?.require()?,
            slot_id: SlotId::parse(&self.slot_id)?.require()?,
            member_id: MemberId::parse(&self.member_id)?.require()?,
            plan_id: self
                .plan_id
                .as_deref()
                .filter(|plan| !plan.trim().is_empty())
                .map(PlanId::parse)
                .transpose()?,
            method: self.method,
            is_outside_preference: self.is_outside_preference,
        })
    }
}

/// Run an allocation request and fold the result into a response.
pub async fn allocate_member<S>(service: &AllocationService<S>, request: &AllocationRequest) -> AllocationResponse
where
    S: ShiftStore + ?Sized,
{
    let result = match request.parse() {
        Ok(command) => service.allocate(command).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(assignment) => AllocationResponse::success(AllocationOutcome::Confirmed, assignment.assignment_id()),
        Err(err) => AllocationResponse::from_error(&err),
    }
}

/// Cancel an assignment on behalf of a caller.
pub async fn cancel_assignment<S>(service: &AllocationService<S>, tenant_id: &str, assignment_id: &str) -> AllocationResponse
where
    S: ShiftStore + ?Sized,
{
    let ids = TenantId::parse(tenant_id)
        .and_then(TenantId::require)
        .and_then(|tenant| Ok((tenant, AssignmentId::parse(assignment_id)?.require()?)));
    let result = match ids {
        Ok((tenant, assignment)) => service.cancel(tenant, assignment).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(assignment) => AllocationResponse::success(AllocationOutcome::Cancelled, assignment.assignment_id()),
        Err(err) => AllocationResponse::from_error(&err),
    }
}
