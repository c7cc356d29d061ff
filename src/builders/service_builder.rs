//! Assemble allocation services from configuration.

use std::sync::Arc;

use crate::config::{AllocationConfig, StoreBackendConfig};
use crate::core::{AllocationService, SchedulingError, ShiftStore, SlotCatalog};
use crate::infra::store::InMemoryStore;
use crate::util::clock::{Clock, SystemClock};

/// Services sharing one store.
pub struct ShiftSlotServices {
    /// Allocation protocol.
    pub allocation: AllocationService<dyn ShiftStore>,
    /// Slot maintenance.
    pub catalog: SlotCatalog<dyn ShiftStore>,
    /// The store both services run against.
    pub store: Arc<dyn ShiftStore>,
}

/// Builder for [`ShiftSlotServices`].
pub struct ServiceBuilder {
    config: AllocationConfig,
    clock: Arc<dyn Clock>,
    migrate: bool,
}

impl ServiceBuilder {
    /// Start from a configuration.
    pub fn new(config: AllocationConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            migrate: false,
        }
    }

    /// Configuration in use.
    pub const fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Use a custom clock for every service.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply the schema before returning (Postgres only).
    #[must_use]
    pub const fn with_migrations(mut self, migrate: bool) -> Self {
        self.migrate = migrate;
        self
    }

    /// Validate the configuration, open the store, and wire the services.
    pub async fn build(self) -> Result<ShiftSlotServices, SchedulingError> {
        let store = build_store(&self.config, self.migrate).await?;
        Ok(ShiftSlotServices {
            allocation: AllocationService::new(Arc::clone(&store)).with_clock(Arc::clone(&self.clock)),
            catalog: SlotCatalog::new(Arc::clone(&store)).with_clock(self.clock),
            store,
        })
    }
}

/// Open the store selected by `cfg`.
pub async fn build_store(cfg: &AllocationConfig, migrate: bool) -> Result<Arc<dyn ShiftStore>, SchedulingError> {
    cfg.validate()
        .map_err(|e| SchedulingError::validation("config", format!("config invalid: {e}")))?;

    match cfg.backend {
        StoreBackendConfig::InMemory => {
            tracing::info!(lock_timeout_ms = cfg.lock_timeout_ms, "using in-memory store");
            Ok(Arc::new(InMemoryStore::with_lock_timeout(cfg.lock_timeout())))
        }
        StoreBackendConfig::Postgres => build_postgres(cfg, migrate).await,
    }
}

#[cfg(feature = "postgres")]
async fn build_postgres(cfg: &AllocationConfig, migrate: bool) -> Result<Arc<dyn ShiftStore>, SchedulingError> {
    use crate::infra::store::PostgresStore;

    let url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| SchedulingError::validation("database_url", "is required for the postgres backend"))?;
    let store = PostgresStore::connect(url, cfg.max_connections, cfg.lock_timeout()).await?;
    if migrate {
        store.migrate().await?;
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn build_postgres(_cfg: &AllocationConfig, _migrate: bool) -> Result<Arc<dyn ShiftStore>, SchedulingError> {
    Err(SchedulingError::validation(
        "backend",
        "postgres backend requested but the `postgres` feature is disabled",
    ))
}
