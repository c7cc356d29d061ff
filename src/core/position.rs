//! Position: a role tag (e.g. "bartender", "door").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{Result, SchedulingError};
use super::ids::{PositionId, TenantId};
use super::validation::{check_stored_name, validate_name};

/// Persisted shape of a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Position id.
    pub position_id: PositionId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub position_name: String,
    /// Free text, may be empty.
    pub description: String,
    /// Sort key.
    pub display_order: i32,
    /// Inactive positions stay referenced but are hidden from pickers.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last mutation instant.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Position entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    record: PositionRecord,
}

impl Position {
    /// Validate and create an active position.
    pub fn new(
        now: DateTime<Utc>,
        tenant_id: TenantId,
        position_name: &str,
        description: &str,
        display_order: i32,
    ) -> Result<Self> {
        Ok(Self {
            record: PositionRecord {
                position_id: PositionId::new(),
                tenant_id: tenant_id.require()?,
                position_name: validate_name("position_name", position_name)?,
                description: description.trim().to_string(),
                display_order,
                is_active: true,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        })
    }

    /// Rebuild from storage, rejecting a row whose name is out of bounds.
    pub fn reconstruct(record: PositionRecord) -> Result<Self> {
        check_stored_name("position", record.position_id, "position_name", &record.position_name)?;
        Ok(Self { record })
    }

    /// Persisted shape.
    pub fn to_record(&self) -> PositionRecord {
        self.record.clone()
    }

    /// Rename.
    pub fn update_name(&mut self, position_name: &str, now: DateTime<Utc>) -> Result<()> {
        self.record.position_name = validate_name("position_name", position_name)?;
        self.record.updated_at = now;
        Ok(())
    }

    /// Replace the description.
    pub fn update_description(&mut self, description: &str, now: DateTime<Utc>) {
        self.record.description = description.trim().to_string();
        self.record.updated_at = now;
    }

    /// Change the sort key.
    pub fn update_display_order(&mut self, display_order: i32, now: DateTime<Utc>) {
        self.record.display_order = display_order;
        self.record.updated_at = now;
    }

    /// Show in pickers again.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.record.is_active = true;
        self.record.updated_at = now;
    }

    /// Hide from pickers.
    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.record.is_active = false;
        self.record.updated_at = now;
    }

    /// Soft delete.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.record.deleted_at.is_some() {
            return Err(SchedulingError::AlreadyDeleted {
                entity: "position",
                id: self.record.position_id.to_string(),
            });
        }
        self.record.deleted_at = Some(now);
        self.record.updated_at = now;
        Ok(())
    }

    /// Position id.
    pub const fn position_id(&self) -> PositionId {
        self.record.position_id
    }

    /// Owning tenant.
    pub const fn tenant_id(&self) -> TenantId {
        self.record.tenant_id
    }

    /// Display name.
    pub fn position_name(&self) -> &str {
        &self.record.position_name
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.record.description
    }

    /// Sort key.
    pub const fn display_order(&self) -> i32 {
        self.record.display_order
    }

    /// Whether shown in pickers.
    pub const fn is_active(&self) -> bool {
        self.record.is_active
    }

    /// Whether soft-deleted.
    pub const fn is_deleted(&self) -> bool {
        self.record.deleted_at.is_some()
    }
}
