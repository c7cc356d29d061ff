//! Persistence contracts.
//!
//! Read-side repositories work against committed state and never take locks.
//! Every assignment write goes through an [`AllocationTx`], which is the only
//! place a slot lock can be held; there is deliberately no pool-level
//! assignment save.
//!
//! All methods are tenant-scoped. A row that exists under another tenant is
//! reported exactly like a missing row.

use async_trait::async_trait;

use super::assignment::Assignment;
use super::error::Result;
use super::ids::{AssignmentId, BusinessDayId, EventId, InstanceId, MemberId, PositionId, SlotId, TenantId};
use super::instance::Instance;
use super::position::Position;
use super::slot::Slot;

/// Committed-state assignment queries. Soft-deleted rows are never returned.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Load one assignment.
    async fn find_by_id(&self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment>;

    /// Every live assignment of a slot (confirmed and cancelled), oldest first.
    async fn find_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>>;

    /// Every live assignment of a member, oldest first.
    async fn find_by_member_id(&self, tenant_id: TenantId, member_id: MemberId) -> Result<Vec<Assignment>>;

    /// Live confirmed assignments of a slot, oldest first.
    async fn find_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>>;

    /// Number of live confirmed assignments of a slot.
    async fn count_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64>;

    /// Whether the member holds a live confirmed assignment on the slot.
    async fn exists_by_slot_id_and_member_id(
        &self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool>;
}

/// Slot storage.
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Insert a new slot. Changes to existing slots go through
    /// [`AllocationTx::save_slot`] so they serialize with allocations.
    async fn insert(&self, slot: &Slot) -> Result<()>;

    /// Load one live slot.
    async fn find_by_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot>;

    /// Live slots of a business day ordered by `priority ASC, created_at ASC`.
    async fn find_by_business_day_id(
        &self,
        tenant_id: TenantId,
        business_day_id: BusinessDayId,
    ) -> Result<Vec<Slot>>;
}

/// Instance storage.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Insert or update.
    async fn save(&self, instance: &Instance) -> Result<()>;

    /// Load one live instance.
    async fn find_by_id(&self, tenant_id: TenantId, instance_id: InstanceId) -> Result<Instance>;

    /// Live instances of an event ordered by `display_order`.
    async fn find_by_event_id(&self, tenant_id: TenantId, event_id: EventId) -> Result<Vec<Instance>>;
}

/// Position storage.
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Insert or update.
    async fn save(&self, position: &Position) -> Result<()>;

    /// Load one live position.
    async fn find_by_id(&self, tenant_id: TenantId, position_id: PositionId) -> Result<Position>;

    /// Live positions ordered by `display_order`, optionally only active ones.
    async fn find_all(&self, tenant_id: TenantId, active_only: bool) -> Result<Vec<Position>>;
}

/// One unit of work on the allocation path.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// every staged write and releases every lock it holds.
#[async_trait]
pub trait AllocationTx: Send {
    /// Take the exclusive lock for `slot_id` and return the slot as stored
    /// right now (soft-deleted slots included). Waiting longer than the
    /// configured lock timeout yields a retryable conflict.
    async fn lock_slot(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot>;

    /// Live confirmed count, including writes staged in this transaction.
    async fn count_confirmed_by_slot_id(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64>;

    /// Live confirmed `(slot, member)` pair, including staged writes.
    async fn exists_by_slot_id_and_member_id(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool>;

    /// Live confirmed assignments of the slot, row-locked until the
    /// transaction ends.
    async fn find_confirmed_by_slot_id_for_update(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Vec<Assignment>>;

    /// Re-read one live assignment inside the transaction.
    async fn find_assignment(&mut self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment>;

    /// Insert or update an assignment. The assignment's slot must be locked
    /// by this transaction.
    async fn save_assignment(&mut self, assignment: &Assignment) -> Result<()>;

    /// Update a slot. The slot must be locked by this transaction.
    async fn save_slot(&mut self, slot: &Slot) -> Result<()>;

    /// Make staged writes visible and release the locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard staged writes and release the locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens allocation transactions.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Start a transaction.
    async fn begin(&self) -> Result<Box<dyn AllocationTx>>;
}

/// Everything a backend provides, bundled for services and builders.
pub trait ShiftStore:
    AllocationStore + AssignmentRepository + SlotRepository + InstanceRepository + PositionRepository
{
}

impl<T> ShiftStore for T where
    T: AllocationStore + AssignmentRepository + SlotRepository + InstanceRepository + PositionRepository
{
}
