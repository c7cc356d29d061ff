//! Error types for slot allocation and assignment lifecycle operations.

use thiserror::Error;

/// Coarse classification of a [`SchedulingError`].
///
/// Callers branch on the kind rather than on individual variants, e.g. to
/// render "fully booked" for [`ErrorKind::CapacityExceeded`] or to decide
/// whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or out-of-range input.
    Validation,
    /// A state transition or stored record breaks an entity invariant.
    InvariantViolation,
    /// The slot already holds `required_count` confirmed assignments.
    CapacityExceeded,
    /// The member is already confirmed on the slot.
    DuplicateAssignment,
    /// The id does not resolve within the caller's tenant.
    NotFound,
    /// Lock or serialization conflict in the store; safe to retry.
    Conflict,
    /// Any other store failure.
    Backend,
}

/// Errors produced by entities, services, and store backends.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// Input failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Human readable reason.
        message: String,
    },
    /// Cancel was called on an assignment that is already cancelled.
    #[error("assignment {assignment_id} is already cancelled")]
    AlreadyCancelled {
        /// Assignment that rejected the transition.
        assignment_id: String,
    },
    /// Delete was called on an entity that is already soft-deleted.
    #[error("{entity} {id} is already deleted")]
    AlreadyDeleted {
        /// Entity type name.
        entity: &'static str,
        /// Entity identifier.
        id: String,
    },
    /// A record loaded from storage breaks an entity invariant.
    #[error("inconsistent {entity} record {id}: {message}")]
    InconsistentRecord {
        /// Entity type name.
        entity: &'static str,
        /// Entity identifier.
        id: String,
        /// Which invariant failed.
        message: String,
    },
    /// Allocation rejected because the slot is full.
    #[error("slot {slot_id} is fully booked ({confirmed}/{required_count} confirmed)")]
    CapacityExceeded {
        /// Target slot.
        slot_id: String,
        /// Capacity of the slot at decision time.
        required_count: i32,
        /// Live confirmed assignments at decision time.
        confirmed: i64,
    },
    /// Member already holds a live confirmed assignment on the slot.
    #[error("member {member_id} is already confirmed on slot {slot_id}")]
    DuplicateAssignment {
        /// Target slot.
        slot_id: String,
        /// Member that requested the allocation.
        member_id: String,
    },
    /// The referenced entity does not exist for the caller's tenant.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity type name.
        entity: &'static str,
        /// Entity identifier.
        id: String,
    },
    /// Lock acquisition timed out or the store reported a serialization conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulingError {
    /// Build a validation error for `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Build a not-found error for `entity` with the given id.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::AlreadyCancelled { .. }
            | Self::AlreadyDeleted { .. }
            | Self::InconsistentRecord { .. } => ErrorKind::InvariantViolation,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::DuplicateAssignment { .. } => ErrorKind::DuplicateAssignment,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    ///
    /// No retry happens inside this crate.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SchedulingError> = std::result::Result<T, E>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = std::result::Result<T, anyhow::Error>;
