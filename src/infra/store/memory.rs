//! In-memory store for development, tests, and single-process deployments.
//!
//! Committed rows live in plain maps behind one `parking_lot::Mutex`. The
//! allocation path replaces row locks with [`SlotLockRegistry`]: a transaction
//! takes the slot's single-writer lock, stages its writes locally, and applies
//! them in one step on commit. Dropping the transaction discards the staged
//! writes and releases the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::locks::{SlotGuard, SlotLockRegistry};
use crate::core::{
    AllocationStore, AllocationTx, Assignment, AssignmentId, AssignmentRecord, AssignmentRepository,
    AssignmentStatus, BusinessDayId, EventId, Instance, InstanceId, InstanceRecord, InstanceRepository,
    MemberId, Position, PositionId, PositionRecord, PositionRepository, Result, SchedulingError, Slot,
    SlotId, SlotRecord, SlotRepository, TenantId,
};

/// Default wait for a slot lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    slots: HashMap<SlotId, SlotRecord>,
    assignments: HashMap<AssignmentId, AssignmentRecord>,
    instances: HashMap<InstanceId, InstanceRecord>,
    positions: HashMap<PositionId, PositionRecord>,
}

fn is_live_confirmed(record: &AssignmentRecord) -> bool {
    record.status == AssignmentStatus::Confirmed && record.deleted_at.is_none()
}

fn sort_assignments(records: &mut [AssignmentRecord]) {
    records.sort_by(|a, b| {
        a.assigned_at
            .cmp(&b.assigned_at)
            .then_with(|| a.assignment_id.cmp(&b.assignment_id))
    });
}

fn rebuild_assignments(records: Vec<AssignmentRecord>) -> Result<Vec<Assignment>> {
    records.into_iter().map(Assignment::reconstruct).collect()
}

/// In-memory implementation of every store contract.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<SlotLockRegistry>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store with a custom lock timeout.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            locks: Arc::new(SlotLockRegistry::new()),
            lock_timeout,
        }
    }

    /// Configured lock timeout.
    pub const fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Insert a raw record, bypassing entity validation. Used to seed
    /// imported data and to exercise rehydration checks.
    ///
    /// The write holds the slot's lock like any transaction. A live confirmed
    /// record must target a live slot of the same tenant, fit its capacity,
    /// and not duplicate the member's existing confirmed assignment.
    #[doc(hidden)]
    pub async fn seed_assignment_record(&self, record: AssignmentRecord) -> Result<()> {
        let _guard = self
            .locks
            .acquire(record.tenant_id, record.slot_id, self.lock_timeout)
            .await?;
        let mut tables = self.tables.lock();
        if is_live_confirmed(&record) {
            let required_count = tables
                .slots
                .get(&record.slot_id)
                .filter(|s| s.tenant_id == record.tenant_id && s.deleted_at.is_none())
                .map(|s| s.required_count)
                .ok_or_else(|| SchedulingError::not_found("slot", record.slot_id))?;
            let live: Vec<&AssignmentRecord> = tables
                .assignments
                .values()
                .filter(|r| {
                    r.tenant_id == record.tenant_id
                        && r.slot_id == record.slot_id
                        && r.assignment_id != record.assignment_id
                        && is_live_confirmed(r)
                })
                .collect();
            let confirmed = i64::try_from(live.len()).unwrap_or(i64::MAX);
            if confirmed >= i64::from(required_count) {
                return Err(SchedulingError::CapacityExceeded {
                    slot_id: record.slot_id.to_string(),
                    required_count,
                    confirmed,
                });
            }
            if live.iter().any(|r| r.member_id == record.member_id) {
                return Err(SchedulingError::DuplicateAssignment {
                    slot_id: record.slot_id.to_string(),
                    member_id: record.member_id.to_string(),
                });
            }
        }
        tables.assignments.insert(record.assignment_id, record);
        Ok(())
    }

    /// Number of assignment rows, tombstoned ones included.
    pub fn assignment_row_count(&self) -> usize {
        self.tables.lock().assignments.len()
    }

    fn assignments_where<F>(&self, tenant_id: TenantId, keep: F) -> Result<Vec<Assignment>>
    where
        F: Fn(&AssignmentRecord) -> bool,
    {
        let mut records: Vec<AssignmentRecord> = {
            let tables = self.tables.lock();
            tables
                .assignments
                .values()
                .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none() && keep(r))
                .cloned()
                .collect()
        };
        sort_assignments(&mut records);
        rebuild_assignments(records)
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn find_by_id(&self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        let record = {
            let tables = self.tables.lock();
            tables
                .assignments
                .get(&assignment_id)
                .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none())
                .cloned()
        };
        record
            .ok_or_else(|| SchedulingError::not_found("assignment", assignment_id))
            .and_then(Assignment::reconstruct)
    }

    async fn find_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>> {
        self.assignments_where(tenant_id, |r| r.slot_id == slot_id)
    }

    async fn find_by_member_id(&self, tenant_id: TenantId, member_id: MemberId) -> Result<Vec<Assignment>> {
        self.assignments_where(tenant_id, |r| r.member_id == member_id)
    }

    async fn find_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>> {
        self.assignments_where(tenant_id, |r| r.slot_id == slot_id && is_live_confirmed(r))
    }

    async fn count_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64> {
        let tables = self.tables.lock();
        let count = tables
            .assignments
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.slot_id == slot_id && is_live_confirmed(r))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn exists_by_slot_id_and_member_id(
        &self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool> {
        let tables = self.tables.lock();
        Ok(tables.assignments.values().any(|r| {
            r.tenant_id == tenant_id && r.slot_id == slot_id && r.member_id == member_id && is_live_confirmed(r)
        }))
    }
}

#[async_trait]
impl SlotRepository for InMemoryStore {
    async fn insert(&self, slot: &Slot) -> Result<()> {
        let mut tables = self.tables.lock();
        if tables.slots.contains_key(&slot.slot_id()) {
            return Err(SchedulingError::Backend(format!("slot {} already exists", slot.slot_id())));
        }
        tables.slots.insert(slot.slot_id(), slot.to_record());
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot> {
        let record = {
            let tables = self.tables.lock();
            tables
                .slots
                .get(&slot_id)
                .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none())
                .cloned()
        };
        record
            .ok_or_else(|| SchedulingError::not_found("slot", slot_id))
            .and_then(Slot::reconstruct)
    }

    async fn find_by_business_day_id(
        &self,
        tenant_id: TenantId,
        business_day_id: BusinessDayId,
    ) -> Result<Vec<Slot>> {
        let mut records: Vec<SlotRecord> = {
            let tables = self.tables.lock();
            tables
                .slots
                .values()
                .filter(|r| {
                    r.tenant_id == tenant_id && r.business_day_id == business_day_id && r.deleted_at.is_none()
                })
                .cloned()
                .collect()
        };
        // ORDER BY priority ASC, created_at ASC
        records.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.slot_id.cmp(&b.slot_id))
        });
        records.into_iter().map(Slot::reconstruct).collect()
    }
}

#[async_trait]
impl InstanceRepository for InMemoryStore {
    async fn save(&self, instance: &Instance) -> Result<()> {
        let record = instance.to_record();
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.instances.get(&record.instance_id) {
            if existing.tenant_id != record.tenant_id {
                return Err(SchedulingError::not_found("instance", record.instance_id));
            }
        }
        tables.instances.insert(record.instance_id, record);
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, instance_id: InstanceId) -> Result<Instance> {
        let record = {
            let tables = self.tables.lock();
            tables
                .instances
                .get(&instance_id)
                .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none())
                .cloned()
        };
        record
            .ok_or_else(|| SchedulingError::not_found("instance", instance_id))
            .and_then(Instance::reconstruct)
    }

    async fn find_by_event_id(&self, tenant_id: TenantId, event_id: EventId) -> Result<Vec<Instance>> {
        let mut records: Vec<InstanceRecord> = {
            let tables = self.tables.lock();
            tables
                .instances
                .values()
                .filter(|r| r.tenant_id == tenant_id && r.event_id == event_id && r.deleted_at.is_none())
                .cloned()
                .collect()
        };
        records.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        records.into_iter().map(Instance::reconstruct).collect()
    }
}

#[async_trait]
impl PositionRepository for InMemoryStore {
    async fn save(&self, position: &Position) -> Result<()> {
        let record = position.to_record();
        let mut tables = self.tables.lock();
        if let Some(existing) = tables.positions.get(&record.position_id) {
            if existing.tenant_id != record.tenant_id {
                return Err(SchedulingError::not_found("position", record.position_id));
            }
        }
        tables.positions.insert(record.position_id, record);
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, position_id: PositionId) -> Result<Position> {
        let tables = self.tables.lock();
        tables
            .positions
            .get(&position_id)
            .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| SchedulingError::not_found("position", position_id))
            .and_then(Position::reconstruct)
    }

    async fn find_all(&self, tenant_id: TenantId, active_only: bool) -> Result<Vec<Position>> {
        let mut records: Vec<PositionRecord> = {
            let tables = self.tables.lock();
            tables
                .positions
                .values()
                .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none() && (!active_only || r.is_active))
                .cloned()
                .collect()
        };
        records.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        records.into_iter().map(Position::reconstruct).collect()
    }
}

#[async_trait]
impl AllocationStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn AllocationTx>> {
        Ok(Box::new(InMemoryTx {
            tables: Arc::clone(&self.tables),
            locks: Arc::clone(&self.locks),
            lock_timeout: self.lock_timeout,
            held: Vec::new(),
            staged_assignments: HashMap::new(),
            staged_slots: HashMap::new(),
        }))
    }
}

/// Transaction over [`InMemoryStore`].
struct InMemoryTx {
    tables: Arc<Mutex<Tables>>,
    locks: Arc<SlotLockRegistry>,
    lock_timeout: Duration,
    held: Vec<SlotGuard>,
    staged_assignments: HashMap<AssignmentId, AssignmentRecord>,
    staged_slots: HashMap<SlotId, SlotRecord>,
}

impl InMemoryTx {
    fn holds(&self, tenant_id: TenantId, slot_id: SlotId) -> bool {
        self.held
            .iter()
            .any(|g| g.tenant_id() == tenant_id && g.slot_id() == slot_id)
    }

    fn require_lock(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<()> {
        if self.holds(tenant_id, slot_id) {
            Ok(())
        } else {
            Err(SchedulingError::Backend(format!(
                "write to slot {slot_id} without holding its lock"
            )))
        }
    }

    fn read_slot(&self, tenant_id: TenantId, slot_id: SlotId) -> Option<SlotRecord> {
        self.staged_slots
            .get(&slot_id)
            .cloned()
            .or_else(|| self.tables.lock().slots.get(&slot_id).cloned())
            .filter(|r| r.tenant_id == tenant_id)
    }

    /// Live assignments of the slot as this transaction sees them.
    fn slot_view(&self, tenant_id: TenantId, slot_id: SlotId) -> Vec<AssignmentRecord> {
        let mut view: HashMap<AssignmentId, AssignmentRecord> = {
            let tables = self.tables.lock();
            tables
                .assignments
                .values()
                .filter(|r| r.tenant_id == tenant_id && r.slot_id == slot_id)
                .map(|r| (r.assignment_id, r.clone()))
                .collect()
        };
        for record in self.staged_assignments.values() {
            if record.tenant_id == tenant_id && record.slot_id == slot_id {
                view.insert(record.assignment_id, record.clone());
            }
        }
        let mut records: Vec<AssignmentRecord> = view.into_values().filter(|r| r.deleted_at.is_none()).collect();
        sort_assignments(&mut records);
        records
    }
}

#[async_trait]
impl AllocationTx for InMemoryTx {
    async fn lock_slot(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot> {
        if self.read_slot(tenant_id, slot_id).is_none() {
            return Err(SchedulingError::not_found("slot", slot_id));
        }
        if !self.holds(tenant_id, slot_id) {
            let guard = self.locks.acquire(tenant_id, slot_id, self.lock_timeout).await?;
            self.held.push(guard);
        }
        // Re-read under the lock: a resize may have committed while we waited.
        let record = self
            .read_slot(tenant_id, slot_id)
            .ok_or_else(|| SchedulingError::not_found("slot", slot_id))?;
        Slot::reconstruct(record)
    }

    async fn count_confirmed_by_slot_id(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64> {
        let count = self
            .slot_view(tenant_id, slot_id)
            .iter()
            .filter(|r| is_live_confirmed(r))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn exists_by_slot_id_and_member_id(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool> {
        Ok(self
            .slot_view(tenant_id, slot_id)
            .iter()
            .any(|r| r.member_id == member_id && is_live_confirmed(r)))
    }

    async fn find_confirmed_by_slot_id_for_update(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Vec<Assignment>> {
        self.require_lock(tenant_id, slot_id)?;
        let records = self
            .slot_view(tenant_id, slot_id)
            .into_iter()
            .filter(is_live_confirmed)
            .collect();
        rebuild_assignments(records)
    }

    async fn find_assignment(&mut self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        let record = self
            .staged_assignments
            .get(&assignment_id)
            .cloned()
            .or_else(|| self.tables.lock().assignments.get(&assignment_id).cloned())
            .filter(|r| r.tenant_id == tenant_id && r.deleted_at.is_none())
            .ok_or_else(|| SchedulingError::not_found("assignment", assignment_id))?;
        Assignment::reconstruct(record)
    }

    async fn save_assignment(&mut self, assignment: &Assignment) -> Result<()> {
        self.require_lock(assignment.tenant_id(), assignment.slot_id())?;
        self.staged_assignments
            .insert(assignment.assignment_id(), assignment.to_record());
        Ok(())
    }

    async fn save_slot(&mut self, slot: &Slot) -> Result<()> {
        self.require_lock(slot.tenant_id(), slot.slot_id())?;
        self.staged_slots.insert(slot.slot_id(), slot.to_record());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        {
            let mut tables = this.tables.lock();
            tables.slots.extend(this.staged_slots);
            tables.assignments.extend(this.staged_assignments);
        }
        // Locks are released only after the writes are visible.
        drop(this.held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
