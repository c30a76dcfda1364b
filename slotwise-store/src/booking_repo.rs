use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotwise_core::repository::{
    AppointmentStore, BookingStore, BookingTransaction, StoreResult,
};
use slotwise_core::{
    Appointment, AppointmentStatus, AuditEntry, AuditEventType, Hold, NewAppointment, StoreError,
};
use slotwise_shared::Masked;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::database::map_db_error;
use crate::hold_repo::{insert_hold_query, HoldRow, HOLD_COLUMNS};

const APPOINTMENT_COLUMNS: &str = "id, tenant_id, client_name, client_email, client_phone, \
    client_notes, service, start_time, end_time, timezone, status, reference_code, \
    source_hold_id, external_event_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    tenant_id: Uuid,
    client_name: String,
    client_email: String,
    client_phone: String,
    client_notes: Option<String>,
    service: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    timezone: String,
    status: String,
    reference_code: String,
    source_hold_id: Uuid,
    external_event_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<AppointmentStatus>()
            .map_err(StoreError::Database)?;
        Ok(Appointment {
            id: row.id,
            tenant_id: row.tenant_id,
            client_name: row.client_name,
            client_email: Masked(row.client_email),
            client_phone: Masked(row.client_phone),
            client_notes: row.client_notes,
            service: row.service,
            start_time: row.start_time,
            end_time: row.end_time,
            timezone: row.timezone,
            status,
            reference_code: row.reference_code,
            source_hold_id: row.source_hold_id,
            external_event_id: row.external_event_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_appointment(row: Option<AppointmentRow>) -> StoreResult<Option<Appointment>> {
    row.map(Appointment::try_from).transpose()
}

/// PostgreSQL appointment store. Overlap safety comes from the
/// `appointments_no_overlap` exclusion constraint, not from application checks.
pub struct PgAppointmentRepository {
    pool: PgPool,
}

impl PgAppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentRepository {
    async fn get_appointment(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE id = $1 AND tenant_id = $2",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        into_appointment(row)
    }

    async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_code: &str,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE tenant_id = $1 AND reference_code = $2",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(tenant_id)
            .bind(reference_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        into_appointment(row)
    }

    async fn find_by_client_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> StoreResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments \
             WHERE tenant_id = $1 AND lower(client_email) = lower($2) \
             ORDER BY start_time DESC",
            APPOINTMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(tenant_id)
            .bind(email.trim())
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        rows.into_iter().map(Appointment::try_from).collect()
    }

    async fn set_external_event_id(
        &self,
        id: Uuid,
        external_event_id: Option<&str>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE appointments SET external_event_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(external_event_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}

#[async_trait]
impl BookingStore for PgAppointmentRepository {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTransaction>> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        Ok(Box::new(PgBookingTransaction { tx }))
    }
}

pub struct PgBookingTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTransaction for PgBookingTransaction {
    async fn find_by_source_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE tenant_id = $1 AND source_hold_id = $2",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(tenant_id)
            .bind(hold_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        into_appointment(row)
    }

    async fn rescheduled_from(
        &mut self,
        tenant_id: Uuid,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Uuid>> {
        let previous: Option<Option<Uuid>> = sqlx::query_scalar(
            r#"
            SELECT (payload->>'previous_appointment_id')::uuid
            FROM audit_log
            WHERE tenant_id = $1 AND entity_id = $2 AND event_type = $3
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(appointment_id)
        .bind(AuditEventType::BookingRescheduled.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(previous.flatten())
    }

    async fn acquire_advisory_lock(&mut self, key: i64) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn find_valid_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>> {
        let sql = format!(
            "SELECT {} FROM holds WHERE id = $1 AND tenant_id = $2 AND expires_at > $3",
            HOLD_COLUMNS
        );
        let row = sqlx::query_as::<_, HoldRow>(&sql)
            .bind(hold_id)
            .bind(tenant_id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(row.map(Hold::from))
    }

    async fn lock_appointment(
        &mut self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        into_appointment(row)
    }

    async fn reference_code_exists(&mut self, reference_code: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM appointments WHERE reference_code = $1)",
        )
        .bind(reference_code)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(exists)
    }

    async fn insert_appointment(
        &mut self,
        appointment: &NewAppointment,
    ) -> StoreResult<Appointment> {
        let sql = format!(
            r#"
            INSERT INTO appointments (id, tenant_id, client_name, client_email, client_phone,
                client_notes, service, start_time, end_time, timezone, status, reference_code,
                source_hold_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'confirmed', $11, $12)
            RETURNING {}
            "#,
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(appointment.id)
            .bind(appointment.tenant_id)
            .bind(&appointment.client_name)
            .bind(appointment.client_email.inner())
            .bind(appointment.client_phone.inner())
            .bind(&appointment.client_notes)
            .bind(&appointment.service)
            .bind(appointment.start_time)
            .bind(appointment.end_time)
            .bind(&appointment.timezone)
            .bind(&appointment.reference_code)
            .bind(appointment.source_hold_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Appointment::try_from(row)
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        let sql = format!(
            "UPDATE appointments SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            APPOINTMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        into_appointment(row)?.ok_or(StoreError::NotFound)
    }

    async fn insert_hold(&mut self, hold: &Hold) -> StoreResult<()> {
        insert_hold_query(hold)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn delete_hold(&mut self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM holds WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, tenant_id, event_type, entity_type, entity_id, actor, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(entry.event_type.as_str())
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.actor)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(map_db_error)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        this.tx.rollback().await.map_err(map_db_error)
    }
}
