//! Per-slot single-writer locks for stores without row locks.
//!
//! Each `(tenant, slot)` pair maps to its own async mutex, so waiting on one
//! slot never blocks another. The registry map itself sits behind a
//! `parking_lot::Mutex` that is only held for the lookup, never across an
//! await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::core::{SchedulingError, SlotId, TenantId};

/// Registry size above which idle entries are pruned on the next acquire.
const PRUNE_THRESHOLD: usize = 1024;

type SlotKey = (TenantId, SlotId);

/// Registry of slot locks.
#[derive(Debug, Default)]
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<SlotKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held slot lock; released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    tenant_id: TenantId,
    slot_id: SlotId,
    _guard: OwnedMutexGuard<()>,
}

impl SlotGuard {
    /// Tenant of the locked slot.
    pub const fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Locked slot.
    pub const fn slot_id(&self) -> SlotId {
        self.slot_id
    }
}

impl SlotLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the slot lock.
    ///
    /// A timeout is reported as [`SchedulingError::Conflict`] so the caller
    /// can decide whether to retry.
    pub async fn acquire(
        &self,
        tenant_id: TenantId,
        slot_id: SlotId,
        timeout: Duration,
    ) -> Result<SlotGuard, SchedulingError> {
        let mutex = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                // Entries whose only reference is the map have no holder and
                // no waiter: waiters clone the Arc under this same map lock.
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(locks.entry((tenant_id, slot_id)).or_default())
        };

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => {
                tracing::debug!(tenant_id = %tenant_id, slot_id = %slot_id, "slot lock acquired");
                Ok(SlotGuard {
                    tenant_id,
                    slot_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    slot_id = %slot_id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "timed out waiting for slot lock"
                );
                Err(SchedulingError::Conflict(format!(
                    "timed out after {timeout:?} waiting for lock on slot {slot_id}"
                )))
            }
        }
    }

    /// Number of slots with a registered lock.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no slot lock has been registered.
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
