use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Appointment, AppointmentStatus, AuditEntry, Hold, NewAppointment, TenantCalendarSettings,
};

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository for short-lived slot holds. No locking, no external calls.
#[async_trait]
pub trait HoldStore: Send + Sync {
    async fn insert_hold(&self, hold: &Hold) -> StoreResult<()>;

    /// Returns the hold only if it has not expired at `now`.
    async fn find_valid_hold(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>>;

    /// Idempotent: deleting a missing hold is not an error.
    async fn delete_hold(&self, id: Uuid) -> StoreResult<()>;

    /// Batch-deletes holds with `expires_at <= now` and returns them.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>>;
}

/// Non-transactional appointment reads and the sync-phase update.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>>;

    async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_code: &str,
    ) -> StoreResult<Option<Appointment>>;

    /// Case-insensitive match, newest start first.
    async fn find_by_client_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> StoreResult<Vec<Appointment>>;

    async fn set_external_event_id(
        &self,
        id: Uuid,
        external_event_id: Option<&str>,
    ) -> StoreResult<()>;
}

/// Opens atomic units of work over holds, appointments and the audit log.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Starts a transaction at the strictest isolation level the store offers.
    async fn begin(&self) -> StoreResult<Box<dyn BookingTransaction>>;
}

/// A single serializable transaction. Dropping it without `commit` rolls back.
#[async_trait]
pub trait BookingTransaction: Send {
    async fn find_by_source_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
    ) -> StoreResult<Option<Appointment>>;

    /// The appointment that `appointment_id` replaced, read from its reschedule audit entry.
    async fn rescheduled_from(
        &mut self,
        tenant_id: Uuid,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Uuid>>;

    /// Transaction-scoped advisory lock, released at commit or rollback.
    async fn acquire_advisory_lock(&mut self, key: i64) -> StoreResult<()>;

    async fn find_valid_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>>;

    /// Loads an appointment and locks its row for the rest of the transaction.
    async fn lock_appointment(
        &mut self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>>;

    async fn reference_code_exists(&mut self, reference_code: &str) -> StoreResult<bool>;

    /// Fails with `StoreError::ExclusionViolation` when a confirmed appointment of the
    /// same tenant overlaps the new interval.
    async fn insert_appointment(&mut self, appointment: &NewAppointment)
        -> StoreResult<Appointment>;

    async fn update_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment>;

    async fn insert_hold(&mut self, hold: &Hold) -> StoreResult<()>;

    async fn delete_hold(&mut self, id: Uuid) -> StoreResult<()>;

    async fn append_audit(&mut self, entry: &AuditEntry) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Read-only tenant calendar configuration.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Unknown tenants resolve to unconfigured settings rather than an error.
    async fn calendar_settings(&self, tenant_id: Uuid) -> StoreResult<TenantCalendarSettings>;
}
