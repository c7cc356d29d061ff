//! Typed identifiers.
//!
//! Every entity reference is a UUID wrapped in its own newtype so a slot id can
//! never be passed where a member id is expected. The nil UUID is treated as
//! "missing" and rejected by entity constructors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SchedulingError;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID.
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Whether the identifier is the nil UUID (unset).
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }

            /// Parse from text, reporting a validation error on malformed input.
            pub fn parse(input: &str) -> Result<Self, SchedulingError> {
                Uuid::parse_str(input.trim())
                    .map(Self)
                    .map_err(|e| SchedulingError::validation($field, format!("malformed id `{input}`: {e}")))
            }

            #[allow(dead_code)]
            pub(crate) fn require(self) -> Result<Self, SchedulingError> {
                if self.is_nil() {
                    return Err(SchedulingError::validation($field, "is required"));
                }
                Ok(self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = SchedulingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(
    /// Tenant isolation boundary.
    TenantId,
    "tenant_id"
);
typed_id!(
    /// Shift slot identifier.
    SlotId,
    "slot_id"
);
typed_id!(
    /// Business day the slot belongs to (owned by the event calendar).
    BusinessDayId,
    "business_day_id"
);
typed_id!(
    /// Assignment identifier.
    AssignmentId,
    "assignment_id"
);
typed_id!(
    /// Member identifier (owned by the membership service).
    MemberId,
    "member_id"
);
typed_id!(
    /// Optional grouping of assignments produced by one planning run.
    PlanId,
    "plan_id"
);
typed_id!(
    /// Instance (venue/grouping tag) identifier.
    InstanceId,
    "instance_id"
);
typed_id!(
    /// Event the instance belongs to.
    EventId,
    "event_id"
);
typed_id!(
    /// Position (role tag) identifier.
    PositionId,
    "position_id"
);
