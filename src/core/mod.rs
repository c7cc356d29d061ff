//! Domain entities, persistence contracts, and the allocation protocol.

pub mod allocation;
pub mod assignment;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod instance;
pub mod position;
pub mod repository;
pub mod slot;
pub mod validation;

pub use allocation::{AllocateMember, AllocationService, ResizeOutcome, SlotAvailability};
pub use assignment::{Assignment, AssignmentMethod, AssignmentRecord, AssignmentStatus};
pub use catalog::SlotCatalog;
pub use error::{AppResult, ErrorKind, Result, SchedulingError};
pub use ids::{
    AssignmentId, BusinessDayId, EventId, InstanceId, MemberId, PlanId, PositionId, SlotId, TenantId,
};
pub use instance::{Instance, InstanceRecord};
pub use position::{Position, PositionRecord};
pub use repository::{
    AllocationStore, AllocationTx, AssignmentRepository, InstanceRepository, PositionRepository,
    ShiftStore, SlotRepository,
};
pub use slot::{NewSlot, Slot, SlotRecord};
