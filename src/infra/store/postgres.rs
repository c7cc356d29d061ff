//! PostgreSQL store.
//!
//! The allocation path relies on row locks: `lock_slot` issues
//! `SELECT ... FOR UPDATE` on the slot row, which serializes deciders even
//! when the slot has no assignments yet. Each transaction sets a local
//! `lock_timeout`, and lock or serialization failures come back as
//! [`SchedulingError::Conflict`]. A partial unique index on live confirmed
//! `(tenant, slot, member)` rows backs the duplicate check.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::core::{
    AllocationStore, AllocationTx, Assignment, AssignmentId, AssignmentRecord, AssignmentRepository,
    BusinessDayId, EventId, Instance, InstanceId, InstanceRecord, InstanceRepository, MemberId, PlanId,
    Position, PositionId, PositionRecord, PositionRepository, Result, SchedulingError, Slot, SlotId,
    SlotRecord, SlotRepository, TenantId,
};

/// Name of the partial unique index on live confirmed assignments.
pub const LIVE_CONFIRMED_INDEX: &str = "uq_shift_assignments_live_confirmed";

const SLOT_COLUMNS: &str = "slot_id, tenant_id, business_day_id, instance_id, slot_name, start_time, end_time, \
     required_count, priority, created_at, updated_at, deleted_at";

const ASSIGNMENT_COLUMNS: &str = "assignment_id, tenant_id, plan_id, slot_id, member_id, status, method, \
     is_outside_preference, assigned_at, cancelled_at, created_at, updated_at, deleted_at";

const INSTANCE_COLUMNS: &str =
    "instance_id, tenant_id, event_id, name, display_order, max_members, created_at, updated_at, deleted_at";

const POSITION_COLUMNS: &str = "position_id, tenant_id, position_name, description, display_order, is_active, \
     created_at, updated_at, deleted_at";

/// SQLSTATE codes that mean "try again later".
const RETRYABLE_CODES: [&str; 4] = [
    "55P03", // lock_not_available
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "57014", // query_canceled (statement_timeout)
];

/// Translate a driver error into the crate taxonomy.
pub fn map_sqlx(context: &str, err: sqlx::Error) -> SchedulingError {
    match &err {
        sqlx::Error::PoolTimedOut => {
            return SchedulingError::Conflict(format!("{context}: connection pool exhausted"));
        }
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                if RETRYABLE_CODES.contains(&&*code) {
                    return SchedulingError::Conflict(format!("{context}: {db}"));
                }
            }
        }
        _ => {}
    }
    SchedulingError::Backend(format!("{context}: {err}"))
}

fn is_live_confirmed_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db)
        if db.is_unique_violation() && db.constraint() == Some(LIVE_CONFIRMED_INDEX))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| map_sqlx("decode row", e))
}

fn row_to_slot(row: &PgRow) -> Result<Slot> {
    Slot::reconstruct(SlotRecord {
        slot_id: SlotId::from_uuid(column(row, "slot_id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        business_day_id: BusinessDayId::from_uuid(column(row, "business_day_id")?),
        instance_id: column::<Option<Uuid>>(row, "instance_id")?.map(InstanceId::from_uuid),
        slot_name: column(row, "slot_name")?,
        start_time: column(row, "start_time")?,
        end_time: column(row, "end_time")?,
        required_count: column(row, "required_count")?,
        priority: column(row, "priority")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

fn row_to_assignment(row: &PgRow) -> Result<Assignment> {
    let assignment_id = AssignmentId::from_uuid(column(row, "assignment_id")?);
    let inconsistent = |e: SchedulingError| SchedulingError::InconsistentRecord {
        entity: "assignment",
        id: assignment_id.to_string(),
        message: e.to_string(),
    };
    let status: String = column(row, "status")?;
    let method: String = column(row, "method")?;
    Assignment::reconstruct(AssignmentRecord {
        assignment_id,
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        plan_id: column::<Option<Uuid>>(row, "plan_id")?.map(PlanId::from_uuid),
        slot_id: SlotId::from_uuid(column(row, "slot_id")?),
        member_id: MemberId::from_uuid(column(row, "member_id")?),
        status: status.parse().map_err(inconsistent)?,
        method: method.parse().map_err(inconsistent)?,
        is_outside_preference: column(row, "is_outside_preference")?,
        assigned_at: column(row, "assigned_at")?,
        cancelled_at: column(row, "cancelled_at")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

fn row_to_instance(row: &PgRow) -> Result<Instance> {
    Instance::reconstruct(InstanceRecord {
        instance_id: InstanceId::from_uuid(column(row, "instance_id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        event_id: EventId::from_uuid(column(row, "event_id")?),
        name: column(row, "name")?,
        display_order: column(row, "display_order")?,
        max_members: column(row, "max_members")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

fn row_to_position(row: &PgRow) -> Result<Position> {
    Position::reconstruct(PositionRecord {
        position_id: PositionId::from_uuid(column(row, "position_id")?),
        tenant_id: TenantId::from_uuid(column(row, "tenant_id")?),
        position_name: column(row, "position_name")?,
        description: column(row, "description")?,
        display_order: column(row, "display_order")?,
        is_active: column(row, "is_active")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
        deleted_at: column(row, "deleted_at")?,
    })
}

// Queries shared by the pool-level repositories and the transaction.

async fn count_confirmed<'e, E: PgExecutor<'e>>(executor: E, tenant_id: TenantId, slot_id: SlotId) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r"
        SELECT COUNT(*) FROM shift_assignments
        WHERE tenant_id = $1 AND slot_id = $2 AND status = 'confirmed' AND deleted_at IS NULL
        ",
    )
    .bind(tenant_id.as_uuid())
    .bind(slot_id.as_uuid())
    .fetch_one(executor)
    .await
    .map_err(|e| map_sqlx("count confirmed assignments", e))
}

async fn member_confirmed<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: TenantId,
    slot_id: SlotId,
    member_id: MemberId,
) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        r"
        SELECT EXISTS(
            SELECT 1 FROM shift_assignments
            WHERE tenant_id = $1 AND slot_id = $2 AND member_id = $3
              AND status = 'confirmed' AND deleted_at IS NULL
        )
        ",
    )
    .bind(tenant_id.as_uuid())
    .bind(slot_id.as_uuid())
    .bind(member_id.as_uuid())
    .fetch_one(executor)
    .await
    .map_err(|e| map_sqlx("check member assignment", e))
}

async fn load_assignment<'e, E: PgExecutor<'e>>(
    executor: E,
    tenant_id: TenantId,
    assignment_id: AssignmentId,
) -> Result<Assignment> {
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM shift_assignments \
         WHERE assignment_id = $1 AND tenant_id = $2 AND deleted_at IS NULL"
    );
    let row = sqlx::query(&sql)
        .bind(assignment_id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(executor)
        .await
        .map_err(|e| map_sqlx("load assignment", e))?
        .ok_or_else(|| SchedulingError::not_found("assignment", assignment_id))?;
    row_to_assignment(&row)
}

/// PostgreSQL implementation of every store contract.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool.
    pub const fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32, lock_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(lock_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx("connect", e))?;
        tracing::info!(max_connections, "postgres pool ready");
        Ok(Self::new(pool, lock_timeout))
    }

    /// Underlying pool.
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Schema statements, idempotent.
    pub fn migrations() -> &'static [&'static str] {
        &[
            r"
CREATE TABLE IF NOT EXISTS shift_instances (
    instance_id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    event_id UUID NOT NULL,
    name TEXT NOT NULL,
    display_order INT NOT NULL DEFAULT 0,
    max_members INT CHECK (max_members IS NULL OR max_members >= 1),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
)",
            r"
CREATE INDEX IF NOT EXISTS idx_shift_instances_event
    ON shift_instances (tenant_id, event_id, display_order) WHERE deleted_at IS NULL",
            r"
CREATE TABLE IF NOT EXISTS shift_positions (
    position_id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    position_name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    display_order INT NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
)",
            r"
CREATE TABLE IF NOT EXISTS shift_slots (
    slot_id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    business_day_id UUID NOT NULL,
    instance_id UUID REFERENCES shift_instances (instance_id),
    slot_name TEXT NOT NULL,
    start_time TIME NOT NULL,
    end_time TIME NOT NULL,
    required_count INT NOT NULL CHECK (required_count >= 1),
    priority INT NOT NULL DEFAULT 0 CHECK (priority >= 0),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ
)",
            r"
CREATE INDEX IF NOT EXISTS idx_shift_slots_business_day
    ON shift_slots (tenant_id, business_day_id, priority, created_at) WHERE deleted_at IS NULL",
            r"
CREATE TABLE IF NOT EXISTS shift_assignments (
    assignment_id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    plan_id UUID,
    slot_id UUID NOT NULL REFERENCES shift_slots (slot_id),
    member_id UUID NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('confirmed', 'cancelled')),
    method TEXT NOT NULL CHECK (method IN ('auto', 'manual')),
    is_outside_preference BOOLEAN NOT NULL DEFAULT FALSE,
    assigned_at TIMESTAMPTZ NOT NULL,
    cancelled_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    deleted_at TIMESTAMPTZ,
    CHECK ((status = 'cancelled') = (cancelled_at IS NOT NULL))
)",
            r"
CREATE UNIQUE INDEX IF NOT EXISTS uq_shift_assignments_live_confirmed
    ON shift_assignments (tenant_id, slot_id, member_id)
    WHERE status = 'confirmed' AND deleted_at IS NULL",
            r"
CREATE INDEX IF NOT EXISTS idx_shift_assignments_member
    ON shift_assignments (tenant_id, member_id) WHERE deleted_at IS NULL",
        ]
    }

    /// Apply [`migrations`](Self::migrations) in order.
    pub async fn migrate(&self) -> Result<()> {
        for statement in Self::migrations() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx("migrate", e))?;
        }
        tracing::info!(statements = Self::migrations().len(), "schema migrated");
        Ok(())
    }

    async fn assignments_where(&self, filter: &str, tenant_id: TenantId, key: Uuid) -> Result<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM shift_assignments \
             WHERE tenant_id = $1 AND {filter} = $2 AND deleted_at IS NULL \
             ORDER BY assigned_at ASC, assignment_id ASC"
        );
        self.fetch_assignments(&sql, tenant_id, key).await
    }

    async fn fetch_assignments(&self, sql: &str, tenant_id: TenantId, key: Uuid) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(sql)
            .bind(tenant_id.as_uuid())
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("list assignments", e))?;
        rows.iter().map(row_to_assignment).collect()
    }
}

#[async_trait]
impl AssignmentRepository for PostgresStore {
    async fn find_by_id(&self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        load_assignment(&self.pool, tenant_id, assignment_id).await
    }

    async fn find_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>> {
        self.assignments_where("slot_id", tenant_id, slot_id.as_uuid()).await
    }

    async fn find_by_member_id(&self, tenant_id: TenantId, member_id: MemberId) -> Result<Vec<Assignment>> {
        self.assignments_where("member_id", tenant_id, member_id.as_uuid()).await
    }

    async fn find_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Vec<Assignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM shift_assignments \
             WHERE tenant_id = $1 AND slot_id = $2 AND status = 'confirmed' AND deleted_at IS NULL \
             ORDER BY assigned_at ASC, assignment_id ASC"
        );
        self.fetch_assignments(&sql, tenant_id, slot_id.as_uuid()).await
    }

    async fn count_confirmed_by_slot_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64> {
        count_confirmed(&self.pool, tenant_id, slot_id).await
    }

    async fn exists_by_slot_id_and_member_id(
        &self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool> {
        member_confirmed(&self.pool, tenant_id, slot_id, member_id).await
    }
}

#[async_trait]
impl SlotRepository for PostgresStore {
    async fn insert(&self, slot: &Slot) -> Result<()> {
        let record = slot.to_record();
        let sql = format!(
            "INSERT INTO shift_slots ({SLOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(record.slot_id.as_uuid())
            .bind(record.tenant_id.as_uuid())
            .bind(record.business_day_id.as_uuid())
            .bind(record.instance_id.map(|id| id.as_uuid()))
            .bind(&record.slot_name)
            .bind(record.start_time)
            .bind(record.end_time)
            .bind(record.required_count)
            .bind(record.priority)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.deleted_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("insert slot", e))?;
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM shift_slots WHERE slot_id = $1 AND tenant_id = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(slot_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("load slot", e))?
            .ok_or_else(|| SchedulingError::not_found("slot", slot_id))?;
        row_to_slot(&row)
    }

    async fn find_by_business_day_id(
        &self,
        tenant_id: TenantId,
        business_day_id: BusinessDayId,
    ) -> Result<Vec<Slot>> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM shift_slots \
             WHERE tenant_id = $1 AND business_day_id = $2 AND deleted_at IS NULL \
             ORDER BY priority ASC, created_at ASC, slot_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(business_day_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("list slots", e))?;
        rows.iter().map(row_to_slot).collect()
    }
}

#[async_trait]
impl InstanceRepository for PostgresStore {
    async fn save(&self, instance: &Instance) -> Result<()> {
        let record = instance.to_record();
        let sql = format!(
            "INSERT INTO shift_instances ({INSTANCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (instance_id) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 display_order = EXCLUDED.display_order, \
                 max_members = EXCLUDED.max_members, \
                 updated_at = EXCLUDED.updated_at, \
                 deleted_at = EXCLUDED.deleted_at \
             WHERE shift_instances.tenant_id = EXCLUDED.tenant_id"
        );
        let result = sqlx::query(&sql)
            .bind(record.instance_id.as_uuid())
            .bind(record.tenant_id.as_uuid())
            .bind(record.event_id.as_uuid())
            .bind(&record.name)
            .bind(record.display_order)
            .bind(record.max_members)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.deleted_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("save instance", e))?;
        if result.rows_affected() == 0 {
            return Err(SchedulingError::not_found("instance", record.instance_id));
        }
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, instance_id: InstanceId) -> Result<Instance> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM shift_instances \
             WHERE instance_id = $1 AND tenant_id = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(instance_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("load instance", e))?
            .ok_or_else(|| SchedulingError::not_found("instance", instance_id))?;
        row_to_instance(&row)
    }

    async fn find_by_event_id(&self, tenant_id: TenantId, event_id: EventId) -> Result<Vec<Instance>> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM shift_instances \
             WHERE tenant_id = $1 AND event_id = $2 AND deleted_at IS NULL \
             ORDER BY display_order ASC, created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("list instances", e))?;
        rows.iter().map(row_to_instance).collect()
    }
}

#[async_trait]
impl PositionRepository for PostgresStore {
    async fn save(&self, position: &Position) -> Result<()> {
        let record = position.to_record();
        let sql = format!(
            "INSERT INTO shift_positions ({POSITION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (position_id) DO UPDATE SET \
                 position_name = EXCLUDED.position_name, \
                 description = EXCLUDED.description, \
                 display_order = EXCLUDED.display_order, \
                 is_active = EXCLUDED.is_active, \
                 updated_at = EXCLUDED.updated_at, \
                 deleted_at = EXCLUDED.deleted_at \
             WHERE shift_positions.tenant_id = EXCLUDED.tenant_id"
        );
        let result = sqlx::query(&sql)
            .bind(record.position_id.as_uuid())
            .bind(record.tenant_id.as_uuid())
            .bind(&record.position_name)
            .bind(&record.description)
            .bind(record.display_order)
            .bind(record.is_active)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.deleted_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx("save position", e))?;
        if result.rows_affected() == 0 {
            return Err(SchedulingError::not_found("position", record.position_id));
        }
        Ok(())
    }

    async fn find_by_id(&self, tenant_id: TenantId, position_id: PositionId) -> Result<Position> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM shift_positions \
             WHERE position_id = $1 AND tenant_id = $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(position_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx("load position", e))?
            .ok_or_else(|| SchedulingError::not_found("position", position_id))?;
        row_to_position(&row)
    }

    async fn find_all(&self, tenant_id: TenantId, active_only: bool) -> Result<Vec<Position>> {
        let sql = format!(
            "SELECT {POSITION_COLUMNS} FROM shift_positions \
             WHERE tenant_id = $1 AND deleted_at IS NULL AND (NOT $2 OR is_active) \
             ORDER BY display_order ASC, created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(active_only)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx("list positions", e))?;
        rows.iter().map(row_to_position).collect()
    }
}

#[async_trait]
impl AllocationStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn AllocationTx>> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx("begin", e))?;
        let timeout_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{timeout_ms}ms"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx("set lock_timeout", e))?;
        Ok(Box::new(PgAllocationTx {
            tx,
            locked: HashSet::new(),
        }))
    }
}

/// Transaction over [`PostgresStore`].
struct PgAllocationTx {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<(TenantId, SlotId)>,
}

impl PgAllocationTx {
    fn require_lock(&self, tenant_id: TenantId, slot_id: SlotId) -> Result<()> {
        if self.locked.contains(&(tenant_id, slot_id)) {
            Ok(())
        } else {
            Err(SchedulingError::Backend(format!(
                "write to slot {slot_id} without holding its lock"
            )))
        }
    }
}

#[async_trait]
impl AllocationTx for PgAllocationTx {
    async fn lock_slot(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<Slot> {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM shift_slots WHERE slot_id = $1 AND tenant_id = $2 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(slot_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("lock slot", e))?
            .ok_or_else(|| SchedulingError::not_found("slot", slot_id))?;
        self.locked.insert((tenant_id, slot_id));
        tracing::debug!(tenant_id = %tenant_id, slot_id = %slot_id, "slot row locked");
        row_to_slot(&row)
    }

    async fn count_confirmed_by_slot_id(&mut self, tenant_id: TenantId, slot_id: SlotId) -> Result<i64> {
        count_confirmed(&mut *self.tx, tenant_id, slot_id).await
    }

    async fn exists_by_slot_id_and_member_id(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
        member_id: MemberId,
    ) -> Result<bool> {
        member_confirmed(&mut *self.tx, tenant_id, slot_id, member_id).await
    }

    async fn find_confirmed_by_slot_id_for_update(
        &mut self,
        tenant_id: TenantId,
        slot_id: SlotId,
    ) -> Result<Vec<Assignment>> {
        self.require_lock(tenant_id, slot_id)?;
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM shift_assignments \
             WHERE tenant_id = $1 AND slot_id = $2 AND status = 'confirmed' AND deleted_at IS NULL \
             ORDER BY assigned_at ASC, assignment_id ASC \
             FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(slot_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx("lock confirmed assignments", e))?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn find_assignment(&mut self, tenant_id: TenantId, assignment_id: AssignmentId) -> Result<Assignment> {
        load_assignment(&mut *self.tx, tenant_id, assignment_id).await
    }

    async fn save_assignment(&mut self, assignment: &Assignment) -> Result<()> {
        self.require_lock(assignment.tenant_id(), assignment.slot_id())?;
        let record = assignment.to_record();
        let sql = format!(
            "INSERT INTO shift_assignments ({ASSIGNMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             ON CONFLICT (assignment_id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 cancelled_at = EXCLUDED.cancelled_at, \
                 updated_at = EXCLUDED.updated_at, \
                 deleted_at = EXCLUDED.deleted_at \
             WHERE shift_assignments.tenant_id = EXCLUDED.tenant_id"
        );
        let result = sqlx::query(&sql)
            .bind(record.assignment_id.as_uuid())
            .bind(record.tenant_id.as_uuid())
            .bind(record.plan_id.map(|id| id.as_uuid()))
            .bind(record.slot_id.as_uuid())
            .bind(record.member_id.as_uuid())
            .bind(record.status.as_str())
            .bind(record.method.as_str())
            .bind(record.is_outside_preference)
            .bind(record.assigned_at)
            .bind(record.cancelled_at)
            .bind(record.created_at)
            .bind(record.updated_at)
            .bind(record.deleted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_live_confirmed_violation(&e) {
                    SchedulingError::DuplicateAssignment {
                        slot_id: record.slot_id.to_string(),
                        member_id: record.member_id.to_string(),
                    }
                } else {
                    map_sqlx("save assignment", e)
                }
            })?;
        if result.rows_affected() == 0 {
            return Err(SchedulingError::not_found("assignment", record.assignment_id));
        }
        Ok(())
    }

    async fn save_slot(&mut self, slot: &Slot) -> Result<()> {
        self.require_lock(slot.tenant_id(), slot.slot_id())?;
        let record = slot.to_record();
        let result = sqlx::query(
            r"
            UPDATE shift_slots
            SET instance_id = $3,
                slot_name = $4,
                start_time = $5,
                end_time = $6,
                required_count = $7,
                priority = $8,
                updated_at = $9,
                deleted_at = $10
            WHERE slot_id = $1 AND tenant_id = $2
            ",
        )
        .bind(record.slot_id.as_uuid())
        .bind(record.tenant_id.as_uuid())
        .bind(record.instance_id.map(|id| id.as_uuid()))
        .bind(&record.slot_name)
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.required_count)
        .bind(record.priority)
        .bind(record.updated_at)
        .bind(record.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx("save slot", e))?;
        if result.rows_affected() == 0 {
            return Err(SchedulingError::not_found("slot", record.slot_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(|e| map_sqlx("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(|e| map_sqlx("rollback", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = map_sqlx("begin", sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_are_backend() {
        let err = map_sqlx("load slot", sqlx::Error::RowNotFound);
        assert!(matches!(err, SchedulingError::Backend(ref m) if m.starts_with("load slot")));
        assert!(!is_live_confirmed_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_migrations_declare_live_confirmed_index() {
        let ddl = PostgresStore::migrations().join("\n");
        assert!(ddl.contains(LIVE_CONFIRMED_INDEX));
        assert!(ddl.contains("WHERE status = 'confirmed' AND deleted_at IS NULL"));
        assert!(ddl.contains("required_count >= 1"));
    }
}
