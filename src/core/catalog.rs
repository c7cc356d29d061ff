//! Administrative slot maintenance.
//!
//! Creating a slot checks that a referenced instance is live and belongs to
//! the same tenant. Edits to existing slots take the slot lock so they cannot
//! interleave with an allocation decision. Capacity changes belong to
//! [`AllocationService::resize_slot`](crate::core::AllocationService::resize_slot).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::error::{Result, SchedulingError};
use super::ids::{BusinessDayId, InstanceId, SlotId, TenantId};
use super::repository::{InstanceRepository, ShiftStore};
use super::slot::{NewSlot, Slot};
use crate::util::clock::{Clock, SystemClock};

/// Slot catalog service.
pub struct SlotCatalog<S: ShiftStore + ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: ShiftStore + ?Sized> SlotCatalog<S> {
    /// Create a catalog using the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate and insert a slot.
    pub async fn create_slot(&self, input: NewSlot) -> Result<Slot> {
        let slot = Slot::new(self.clock.now(), input)?;
        if let Some(instance_id) = slot.instance_id() {
            self.require_instance(slot.tenant_id(), instance_id).await?;
        }
        self.store.insert(&slot).await?;
        tracing::info!(
            tenant_id = %slot.tenant_id(),
            slot_id = %slot.slot_id(),
            business_day_id = %slot.business_day_id(),
            required_count = slot.required_count(),
            "slot created"
        );
        Ok(slot)
    }

    /// Live slots of a business day in display order.
    pub async fn slots_for_business_day(&self, tenant_id: TenantId, business_day_id: BusinessDayId) -> Result<Vec<Slot>> {
        self.store.find_by_business_day_id(tenant_id, business_day_id).await
    }

    /// Point an existing slot at a different instance, or clear it.
    pub async fn assign_instance(
        &self,
        tenant_id: TenantId,
        slot_id: SlotId,
        instance_id: Option<InstanceId>,
    ) -> Result<Slot> {
        let tenant_id = tenant_id.require()?;
        let instance_id = instance_id.map(InstanceId::require).transpose()?;
        if let Some(instance_id) = instance_id {
            self.require_instance(tenant_id, instance_id).await?;
        }
        self.edit_slot(tenant_id, slot_id, |slot, now| slot.assign_instance(instance_id, now))
            .await
    }

    /// Apply `change` to a live slot while holding its lock.
    pub async fn edit_slot<F>(&self, tenant_id: TenantId, slot_id: SlotId, change: F) -> Result<Slot>
    where
        F: FnOnce(&mut Slot, DateTime<Utc>) -> Result<()> + Send,
    {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut slot = tx.lock_slot(tenant_id, slot_id).await?;
            if slot.is_deleted() {
                return Err(SchedulingError::not_found("slot", slot_id));
            }
            change(&mut slot, now)?;
            tx.save_slot(&slot).await?;
            Ok::<_, SchedulingError>(slot)
        }
        .await;

        match result {
            Ok(slot) => {
                tx.commit().await?;
                Ok(slot)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Soft-delete a slot. Its assignments stay in place as history.
    pub async fn delete_slot(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot> {
        let slot = self.edit_slot(tenant_id, slot_id, |slot, now| slot.delete(now)).await?;
        tracing::info!(tenant_id = %tenant_id, slot_id = %slot_id, "slot deleted");
        Ok(slot)
    }

    async fn require_instance(&self, tenant_id: TenantId, instance_id: InstanceId) -> Result<()> {
        InstanceRepository::find_by_id(self.store.as_ref(), tenant_id, instance_id)
            .await
            .map(|_| ())
    }
}
