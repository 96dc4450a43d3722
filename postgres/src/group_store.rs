//! `PostgreSQL` implementation of [`GroupStore`].
//!
//! Every admission commit is one transaction: the group row is locked with
//! `SELECT ... FOR UPDATE`, its version compared with the one the decision
//! was made on, and group and ticket are updated before `COMMIT`. A scan
//! that read a stale version gets [`StoreError::Conflict`] and re-decides.

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use gatepass_core::store::{AdmissionCommit, GroupStore, NewGroup, StoreError};
use gatepass_core::types::{
    Designation, Group, GroupId, GroupSnapshot, Role, Ticket, TicketCode, TicketId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

const GROUP_COLUMNS: &str = "id, primary_ticket, primary_code, capacity, consumed, \
     eligible_days, admitted_days, version, created_at";

const TICKET_COLUMNS: &str = "id, code, group_id, role, position, full_name, email, phone, \
     designation, relationship, age, admitted, admitted_at, created_at";

/// `PostgreSQL`-backed group store.
///
/// # Example
///
/// ```no_run
/// use gatepass_postgres::PostgresGroupStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresGroupStore::connect(
///     "postgres://localhost/gatepass",
///     10,
///     Duration::from_secs(5),
/// )
/// .await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresGroupStore {
    pool: PgPool,
}

impl PostgresGroupStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if migrations fail.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn commit(&self, commit: AdmissionCommit) -> Result<GroupSnapshot, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let mut group = load_group(&mut tx, commit.group_id, true).await?;
        let conflict = StoreError::Conflict {
            group_id: commit.group_id,
            expected: commit.expected_version,
            actual: group.version,
        };
        if group.version != commit.expected_version {
            return Err(conflict);
        }
        group.record_admission(commit.day).map_err(|_| conflict)?;

        let marked = sqlx::query(
            "UPDATE tickets SET admitted = TRUE, admitted_at = COALESCE(admitted_at, $3) \
             WHERE id = $1 AND group_id = $2",
        )
        .bind(commit.member.as_uuid())
        .bind(commit.group_id.as_uuid())
        .bind(commit.at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        if marked.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("ticket {}", commit.member)));
        }

        sqlx::query(
            "UPDATE admission_groups SET consumed = $2, admitted_days = $3, version = $4 \
             WHERE id = $1",
        )
        .bind(group.id.as_uuid())
        .bind(to_i32(group.consumed)?)
        .bind(group.admitted_days.iter().copied().collect::<Vec<NaiveDate>>())
        .bind(to_i64(group.version)?)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        let members = load_members(&mut tx, group.id).await?;
        tx.commit().await.map_err(storage)?;

        tracing::debug!(
            group_id = %group.id,
            version = group.version,
            day = %commit.day,
            "Admission committed"
        );
        Ok(GroupSnapshot { group, members })
    }

    async fn insert(&self, new: NewGroup) -> Result<GroupSnapshot, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let codes: Vec<String> = new.tickets.iter().map(|t| t.code.as_str().to_string()).collect();
        let emails: Vec<String> = new.tickets.iter().filter_map(|t| t.email.clone()).collect();
        if let Some(row) = sqlx::query("SELECT code FROM tickets WHERE code = ANY($1) LIMIT 1")
            .bind(&codes)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
        {
            return Err(StoreError::DuplicateCode(row.try_get("code").map_err(storage)?));
        }
        if let Some(row) = sqlx::query("SELECT email FROM tickets WHERE email = ANY($1) LIMIT 1")
            .bind(&emails)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
        {
            return Err(StoreError::DuplicateEmail(row.try_get("email").map_err(storage)?));
        }

        let group = &new.group;
        sqlx::query(
            "INSERT INTO admission_groups \
             (id, primary_ticket, primary_code, capacity, consumed, eligible_days, admitted_days, version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(group.id.as_uuid())
        .bind(group.primary_ticket.as_uuid())
        .bind(group.primary_code.as_str())
        .bind(to_i32(group.capacity)?)
        .bind(to_i32(group.consumed)?)
        .bind(group.eligible_days.iter().copied().collect::<Vec<NaiveDate>>())
        .bind(group.admitted_days.iter().copied().collect::<Vec<NaiveDate>>())
        .bind(to_i64(group.version)?)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for ticket in &new.tickets {
            sqlx::query(
                "INSERT INTO tickets \
                 (id, code, group_id, role, position, full_name, email, phone, designation, \
                  relationship, age, admitted, admitted_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.code.as_str())
            .bind(ticket.group_id.as_uuid())
            .bind(ticket.role.as_str())
            .bind(to_i32(ticket.position)?)
            .bind(&ticket.full_name)
            .bind(&ticket.email)
            .bind(&ticket.phone)
            .bind(ticket.designation.as_str())
            .bind(&ticket.relationship)
            .bind(ticket.age.map(to_i32).transpose()?)
            .bind(ticket.admitted)
            .bind(ticket.admitted_at)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| unique_violation(e, ticket))?;
        }

        let members = load_members(&mut tx, group.id).await?;
        tx.commit().await.map_err(storage)?;

        Ok(GroupSnapshot {
            group: new.group,
            members,
        })
    }
}

impl GroupStore for PostgresGroupStore {
    fn resolve_group<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<GroupSnapshot, StoreError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage)?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(storage)?;

            let group_id: Uuid = sqlx::query("SELECT group_id FROM tickets WHERE code = $1")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?
                .ok_or_else(|| StoreError::NotFound(format!("code {code}")))?
                .try_get("group_id")
                .map_err(storage)?;
            let group_id = GroupId::from_uuid(group_id);

            let group = load_group(&mut tx, group_id, false).await?;
            let members = load_members(&mut tx, group_id).await?;
            tx.commit().await.map_err(storage)?;

            Ok(GroupSnapshot { group, members })
        })
    }

    fn members(&self, group_id: GroupId) -> BoxFuture<'_, Result<Vec<Ticket>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(storage)?;
            load_group(&mut conn, group_id, false).await?;
            load_members(&mut conn, group_id).await
        })
    }

    fn commit_admission(
        &self,
        commit: AdmissionCommit,
    ) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>> {
        Box::pin(self.commit(commit))
    }

    fn create_group(&self, new: NewGroup) -> BoxFuture<'_, Result<GroupSnapshot, StoreError>> {
        Box::pin(self.insert(new))
    }

    fn mark_members_admitted(
        &self,
        group_id: GroupId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage)?;
            load_group(&mut tx, group_id, false).await?;
            let result = sqlx::query(
                "UPDATE tickets SET admitted = TRUE, admitted_at = $2 \
                 WHERE group_id = $1 AND NOT admitted",
            )
            .bind(group_id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
            tx.commit().await.map_err(storage)?;

            usize::try_from(result.rows_affected())
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
    }

    fn force_mark_ticket(
        &self,
        ticket_id: TicketId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Ticket, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "UPDATE tickets SET admitted = TRUE, admitted_at = COALESCE(admitted_at, $2) \
                 WHERE id = $1 RETURNING {TICKET_COLUMNS}"
            ))
            .bind(ticket_id.as_uuid())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_id}")))?;
            ticket_from_row(&row)
        })
    }

    fn ticket(&self, ticket_id: TicketId) -> BoxFuture<'_, Result<Ticket, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(ticket_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?
                .ok_or_else(|| StoreError::NotFound(format!("ticket {ticket_id}")))?;
            ticket_from_row(&row)
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(storage)?;
            Ok(())
        })
    }
}

// ============================================================================
// Row loading
// ============================================================================

async fn load_group(
    conn: &mut PgConnection,
    group_id: GroupId,
    for_update: bool,
) -> Result<Group, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {GROUP_COLUMNS} FROM admission_groups WHERE id = $1{lock}"
    ))
    .bind(group_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(storage)?
    .ok_or_else(|| StoreError::NotFound(format!("group {group_id}")))?;

    group_from_row(&row)
}

async fn load_members(
    conn: &mut PgConnection,
    group_id: GroupId,
) -> Result<Vec<Ticket>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE group_id = $1 ORDER BY position"
    ))
    .bind(group_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(storage)?;

    rows.iter().map(ticket_from_row).collect()
}

fn group_from_row(row: &PgRow) -> Result<Group, StoreError> {
    let eligible_days: Vec<NaiveDate> = row.try_get("eligible_days").map_err(storage)?;
    let admitted_days: Vec<NaiveDate> = row.try_get("admitted_days").map_err(storage)?;

    Ok(Group {
        id: GroupId::from_uuid(row.try_get("id").map_err(storage)?),
        primary_ticket: TicketId::from_uuid(row.try_get("primary_ticket").map_err(storage)?),
        primary_code: TicketCode::new(row.try_get::<String, _>("primary_code").map_err(storage)?),
        capacity: from_i32(row.try_get("capacity").map_err(storage)?)?,
        consumed: from_i32(row.try_get("consumed").map_err(storage)?)?,
        eligible_days: eligible_days.into_iter().collect(),
        admitted_days: admitted_days.into_iter().collect(),
        version: from_i64(row.try_get("version").map_err(storage)?)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let role: String = row.try_get("role").map_err(storage)?;
    let designation: String = row.try_get("designation").map_err(storage)?;
    let age: Option<i32> = row.try_get("age").map_err(storage)?;

    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(storage)?),
        code: TicketCode::new(row.try_get::<String, _>("code").map_err(storage)?),
        group_id: GroupId::from_uuid(row.try_get("group_id").map_err(storage)?),
        role: role.parse::<Role>().map_err(StoreError::Unavailable)?,
        position: from_i32(row.try_get("position").map_err(storage)?)?,
        full_name: row.try_get("full_name").map_err(storage)?,
        email: row.try_get("email").map_err(storage)?,
        phone: row.try_get("phone").map_err(storage)?,
        designation: designation.parse().unwrap_or(Designation::Other),
        relationship: row.try_get("relationship").map_err(storage)?,
        age: age.map(from_i32).transpose()?,
        admitted: row.try_get("admitted").map_err(storage)?,
        admitted_at: row.try_get("admitted_at").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

// ============================================================================
// Conversions
// ============================================================================

#[allow(clippy::needless_pass_by_value)]
fn storage(e: sqlx::Error) -> StoreError {
    metrics::counter!("gate_store_errors_total").increment(1);
    StoreError::Unavailable(e.to_string())
}

fn unique_violation(e: sqlx::Error, ticket: &Ticket) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("tickets_code_key") => {
                    return StoreError::DuplicateCode(ticket.code.as_str().to_string());
                }
                Some("tickets_email_key") => {
                    return StoreError::DuplicateEmail(ticket.email.clone().unwrap_or_default());
                }
                _ => {}
            }
        }
    }
    storage(e)
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|e| StoreError::Unavailable(format!("{value} out of range: {e}")))
}

fn from_i32(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|e| StoreError::Unavailable(format!("{value} out of range: {e}")))
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|e| StoreError::Unavailable(format!("{value} out of range: {e}")))
}

fn from_i64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|e| StoreError::Unavailable(format!("{value} out of range: {e}")))
}
