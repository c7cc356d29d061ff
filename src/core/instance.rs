//! Instance: a grouping/venue tag that slots may reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulingError};
use super::ids::{EventId, InstanceId, TenantId};
use super::validation::{check_stored_name, validate_min, validate_name};

/// Persisted shape of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance id.
    pub instance_id: InstanceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Event the instance belongs to.
    pub event_id: EventId,
    /// Display name.
    pub name: String,
    /// Sort key within the event.
    pub display_order: i32,
    /// Optional headcount limit.
    pub max_members: Option<i32>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Instance entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    record: InstanceRecord,
}

impl Instance {
    /// Validate and create a live instance.
    pub fn new(
        now: DateTime<Utc>,
        tenant_id: TenantId,
        event_id: EventId,
        name: &str,
        display_order: i32,
        max_members: Option<i32>,
    ) -> Result<Self> {
        Ok(Self {
            record: InstanceRecord {
                instance_id: InstanceId::new(),
                tenant_id: tenant_id.require()?,
                event_id: event_id.require()?,
                name: validate_name("name", name)?,
                display_order,
                max_members: validate_max_members(max_members)?,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        })
    }

    /// Rebuild from storage.
    pub fn reconstruct(record: InstanceRecord) -> Result<Self> {
        check_stored_name("instance", record.instance_id, "name", &record.name)?;
        if let Some(max) = record.max_members {
            if max < 1 {
                return Err(SchedulingError::InconsistentRecord {
                    entity: "instance",
                    id: record.instance_id.to_string(),
                    message: format!("max_members {max} is below 1"),
                });
            }
        }
        Ok(Self { record })
    }

    /// Persisted shape.
    pub fn to_record(&self) -> InstanceRecord {
        self.record.clone()
    }

    /// Rename.
    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> Result<()> {
        self.record.name = validate_name("name", name)?;
        self.record.updated_at = now;
        Ok(())
    }

    /// Change the sort key.
    pub fn update_display_order(&mut self, display_order: i32, now: DateTime<Utc>) {
        self.record.display_order = display_order;
        self.record.updated_at = now;
    }

    /// Set or clear the headcount limit.
    pub fn update_max_members(&mut self, max_members: Option<i32>, now: DateTime<Utc>) -> Result<()> {
        self.record.max_members = validate_max_members(max_members)?;
        self.record.updated_at = now;
        Ok(())
    }

    /// Soft delete.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.record.deleted_at.is_some() {
            return Err(SchedulingError::AlreadyDeleted {
                entity: "instance",
                id: self.record.instance_id.to_string(),
            });
        }
        self.record.deleted_at = Some(now);
        self.record.updated_at = now;
        Ok(())
    }

    /// Instance id.
    pub const fn instance_id(&self) -> InstanceId {
        self.record.instance_id
    }

    /// Owning tenant.
    pub const fn tenant_id(&self) -> TenantId {
        self.record.tenant_id
    }

    /// Event.
    pub const fn event_id(&self) -> EventId {
        self.record.event_id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Sort key.
    pub const fn display_order(&self) -> i32 {
        self.record.display_order
    }

    /// Headcount limit.
    pub const fn max_members(&self) -> Option<i32> {
        self.record.max_members
    }

    /// Whether soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.record.deleted_at.is_some()
    }
}

fn validate_max_members(max_members: Option<i32>) -> Result<Option<i32>> {
    max_members
        .map(|max| validate_min("max_members", max, 1))
        .transpose()
}
