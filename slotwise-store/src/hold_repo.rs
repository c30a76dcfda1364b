use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotwise_core::repository::{HoldStore, StoreResult};
use slotwise_core::Hold;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_error;

pub(crate) const HOLD_COLUMNS: &str =
    "id, tenant_id, session_id, start_time, end_time, expires_at, created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct HoldRow {
    id: Uuid,
    tenant_id: Uuid,
    session_id: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<HoldRow> for Hold {
    fn from(row: HoldRow) -> Self {
        Hold {
            id: row.id,
            tenant_id: row.tenant_id,
            session_id: row.session_id,
            start_time: row.start_time,
            end_time: row.end_time,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

pub(crate) fn insert_hold_query(hold: &Hold) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r#"
        INSERT INTO holds (id, tenant_id, session_id, start_time, end_time, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(hold.id)
    .bind(hold.tenant_id)
    .bind(&hold.session_id)
    .bind(hold.start_time)
    .bind(hold.end_time)
    .bind(hold.expires_at)
    .bind(hold.created_at)
}

pub struct PgHoldRepository {
    pool: PgPool,
}

impl PgHoldRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldStore for PgHoldRepository {
    async fn insert_hold(&self, hold: &Hold) -> StoreResult<()> {
        insert_hold_query(hold)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn find_valid_hold(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>> {
        let sql = format!(
            "SELECT {} FROM holds WHERE id = $1 AND tenant_id = $2 AND expires_at > $3",
            HOLD_COLUMNS
        );
        let row = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(id)
            .bind(tenant_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Hold::from))
    }

    async fn delete_hold(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM holds WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let sql = format!(
            "DELETE FROM holds WHERE expires_at <= $1 RETURNING {}",
            HOLD_COLUMNS
        );
        let rows = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(rows.into_iter().map(Hold::from).collect())
    }
}
