use async_trait::async_trait;
use slotwise_core::repository::{StoreResult, TenantDirectory};
use slotwise_core::TenantCalendarSettings;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_error;

#[derive(sqlx::FromRow)]
struct TenantCalendarRow {
    id: Uuid,
    calendar_id: Option<String>,
    has_credentials: bool,
    strict_calendar_sync: Option<bool>,
}

pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantRepository {
    async fn calendar_settings(&self, tenant_id: Uuid) -> StoreResult<TenantCalendarSettings> {
        let row = sqlx::query_as::<_, TenantCalendarRow>(
            r#"
            SELECT id, calendar_id, (calendar_credentials IS NOT NULL) AS has_credentials, strict_calendar_sync
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(match row {
            Some(row) => TenantCalendarSettings {
                tenant_id: row.id,
                calendar_id: row.calendar_id,
                has_credentials: row.has_credentials,
                strict_sync: row.strict_calendar_sync,
            },
            None => TenantCalendarSettings::unconfigured(tenant_id),
        })
    }
}
