//! Shift slot entity: a named time window within a business day that needs
//! `required_count` confirmed members.
//!
//! The slot only guards its own fields. Whether the number of confirmed
//! assignments fits inside `required_count` is decided by
//! [`AllocationService`](crate::core::AllocationService) under the per-slot lock.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulingError};
use super::ids::{BusinessDayId, InstanceId, SlotId, TenantId};
use super::validation::{check_stored_name, validate_min, validate_name};

/// Smallest legal capacity.
pub const MIN_REQUIRED_COUNT: i32 = 1;

/// Smallest legal priority. Zero only shows up on imported legacy rows;
/// new slots are normally created with a priority of one or more.
pub const MIN_PRIORITY: i32 = 0;

/// Input for [`Slot::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSlot {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Business day the slot belongs to.
    pub business_day_id: BusinessDayId,
    /// Optional instance tag.
    pub instance_id: Option<InstanceId>,
    /// Display name.
    pub slot_name: String,
    /// Start time-of-day.
    pub start_time: NaiveTime,
    /// End time-of-day; at or before `start_time` means the shift crosses midnight.
    pub end_time: NaiveTime,
    /// Number of members the slot needs.
    pub required_count: i32,
    /// Display priority, lower first.
    pub priority: i32,
}

/// Persisted shape of a slot, one field per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Slot id.
    pub slot_id: SlotId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Business day.
    pub business_day_id: BusinessDayId,
    /// Optional instance tag.
    pub instance_id: Option<InstanceId>,
    /// Display name.
    pub slot_name: String,
    /// Start time-of-day.
    pub start_time: NaiveTime,
    /// End time-of-day.
    pub end_time: NaiveTime,
    /// Capacity.
    pub required_count: i32,
    /// Display priority.
    pub priority: i32,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Shift slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    slot_id: SlotId,
    tenant_id: TenantId,
    business_day_id: BusinessDayId,
    instance_id: Option<InstanceId>,
    slot_name: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    required_count: i32,
    priority: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// Validate input and create a live slot.
    pub fn new(now: DateTime<Utc>, input: NewSlot) -> Result<Self> {
        let tenant_id = input.tenant_id.require()?;
        let business_day_id = input.business_day_id.require()?;
        let instance_id = input.instance_id.map(InstanceId::require).transpose()?;
        Ok(Self {
            slot_id: SlotId::new(),
            tenant_id,
            business_day_id,
            instance_id,
            slot_name: validate_name("slot_name", &input.slot_name)?,
            start_time: input.start_time,
            end_time: input.end_time,
            required_count: validate_min("required_count", input.required_count, MIN_REQUIRED_COUNT)?,
            priority: validate_min("priority", input.priority, MIN_PRIORITY)?,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Rebuild a slot from storage, rejecting rows that break the invariants.
    pub fn reconstruct(record: SlotRecord) -> Result<Self> {
        let inconsistent = |message: String| SchedulingError::InconsistentRecord {
            entity: "slot",
            id: record.slot_id.to_string(),
            message,
        };
        if record.required_count < MIN_REQUIRED_COUNT {
            return Err(inconsistent(format!(
                "required_count {} is below {MIN_REQUIRED_COUNT}",
                record.required_count
            )));
        }
        if record.priority < MIN_PRIORITY {
            return Err(inconsistent(format!("negative priority {}", record.priority)));
        }
        if record.slot_id.is_nil() || record.tenant_id.is_nil() || record.business_day_id.is_nil() {
            return Err(inconsistent("missing identifier".into()));
        }
        check_stored_name("slot", record.slot_id, "slot_name", &record.slot_name)?;
        Ok(Self {
            slot_id: record.slot_id,
            tenant_id: record.tenant_id,
            business_day_id: record.business_day_id,
            instance_id: record.instance_id,
            slot_name: record.slot_name,
            start_time: record.start_time,
            end_time: record.end_time,
            required_count: record.required_count,
            priority: record.priority,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
        })
    }

    /// Persisted shape of this slot.
    pub fn to_record(&self) -> SlotRecord {
        SlotRecord {
            slot_id: self.slot_id,
            tenant_id: self.tenant_id,
            business_day_id: self.business_day_id,
            instance_id: self.instance_id,
            slot_name: self.slot_name.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            required_count: self.required_count,
            priority: self.priority,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
    }

    /// Rename the slot.
    pub fn update_slot_name(&mut self, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.slot_name = validate_name("slot_name", name)?;
        self.updated_at = now;
        Ok(())
    }

    /// Change capacity.
    ///
    /// Shrinking below the number of currently confirmed assignments is
    /// allowed here; existing over-subscription is left in place and only
    /// future allocations see the smaller capacity.
    pub fn update_required_count(&mut self, required_count: i32, now: DateTime<Utc>) -> Result<()> {
        self.required_count = validate_min("required_count", required_count, MIN_REQUIRED_COUNT)?;
        self.updated_at = now;
        Ok(())
    }

    /// Change display priority.
    pub fn update_priority(&mut self, priority: i32, now: DateTime<Utc>) -> Result<()> {
        self.priority = validate_min("priority", priority, MIN_PRIORITY)?;
        self.updated_at = now;
        Ok(())
    }

    /// Move the time window.
    pub fn update_time_window(&mut self, start_time: NaiveTime, end_time: NaiveTime, now: DateTime<Utc>) {
        self.start_time = start_time;
        self.end_time = end_time;
        self.updated_at = now;
    }

    /// Attach or clear the instance tag.
    pub fn assign_instance(&mut self, instance_id: Option<InstanceId>, now: DateTime<Utc>) -> Result<()> {
        self.instance_id = instance_id.map(InstanceId::require).transpose()?;
        self.updated_at = now;
        Ok(())
    }

    /// Soft delete.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.deleted_at.is_some() {
            return Err(SchedulingError::AlreadyDeleted {
                entity: "slot",
                id: self.slot_id.to_string(),
            });
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// True when the window crosses midnight.
    ///
    /// An end time equal to the start time also counts as overnight: such a
    /// window is read as a full 24 hour shift rather than an empty one.
    pub fn is_overnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Length of the window, wrapping past midnight for overnight slots.
    pub fn duration(&self) -> Duration {
        let span = self.end_time.signed_duration_since(self.start_time);
        if self.is_overnight() {
            span + Duration::days(1)
        } else {
            span
        }
    }

    /// Whether the slot is soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Slot id.
    pub const fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// Owning tenant.
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Business day.
    pub const fn business_day_id(&self) -> BusinessDayId {
        self.business_day_id
    }

    /// Instance tag, if any.
    pub const fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
    }

    /// Display name.
    pub fn slot_name(&self) -> &str {
        &self.slot_name
    }

    /// Start time-of-day.
    pub const fn start_time(&self) -> NaiveTime {
        self.start_time
    }

    /// End time-of-day.
    pub const fn end_time(&self) -> NaiveTime {
        self.end_time
    }

    /// Capacity.
    pub const fn required_count(&self) -> i32 {
        self.required_count
    }

    /// Display priority.
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Creation instant.
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation instant.
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Soft-delete marker.
    pub const fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
