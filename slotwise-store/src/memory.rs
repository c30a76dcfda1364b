use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotwise_core::repository::{
    AppointmentStore, BookingStore, BookingTransaction, HoldStore, StoreResult, TenantDirectory,
};
use slotwise_core::{
    Appointment, AppointmentStatus, AuditEntry, AuditEventType, Hold, NewAppointment, StoreError,
    TenantCalendarSettings,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    holds: HashMap<Uuid, Hold>,
    appointments: HashMap<Uuid, Appointment>,
    audit_log: Vec<AuditEntry>,
    tenants: HashMap<Uuid, TenantCalendarSettings>,
}

/// In-process implementation of every store contract.
///
/// A transaction holds the state mutex for its whole lifetime and works on a copy,
/// so transactions are serializable and a transaction dropped without `commit`
/// leaves no trace. The overlap and source-hold uniqueness rules mirror the
/// PostgreSQL constraints.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_inserts: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert_tenant(&self, settings: TenantCalendarSettings) {
        let mut state = self.state.lock().await;
        state.tenants.insert(settings.tenant_id, settings);
    }

    /// Makes the next `count` appointment inserts fail with a database error.
    pub fn fail_appointment_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub async fn appointments(&self, tenant_id: Uuid) -> Vec<Appointment> {
        let state = self.state.lock().await;
        let mut appointments: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.created_at);
        appointments
    }

    pub async fn holds(&self, tenant_id: Uuid) -> Vec<Hold> {
        let state = self.state.lock().await;
        state
            .holds
            .values()
            .filter(|h| h.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub async fn audit_entries(&self, tenant_id: Uuid) -> Vec<AuditEntry> {
        let state = self.state.lock().await;
        state
            .audit_log
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HoldStore for InMemoryStore {
    async fn insert_hold(&self, hold: &Hold) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn find_valid_hold(
        &self,
        id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>> {
        let state = self.state.lock().await;
        Ok(valid_hold(&state, id, tenant_id, now))
    }

    async fn delete_hold(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.holds.remove(&id);
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
        let mut state = self.state.lock().await;
        let expired: Vec<Uuid> = state
            .holds
            .values()
            .filter(|h| !h.is_valid_at(now))
            .map(|h| h.id)
            .collect();
        Ok(expired
            .into_iter()
            .filter_map(|id| state.holds.remove(&id))
            .collect())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn get_appointment(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        let state = self.state.lock().await;
        Ok(state
            .appointments
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_code: &str,
    ) -> StoreResult<Option<Appointment>> {
        let state = self.state.lock().await;
        Ok(state
            .appointments
            .values()
            .find(|a| a.tenant_id == tenant_id && a.reference_code == reference_code)
            .cloned())
    }

    async fn find_by_client_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.state.lock().await;
        let email = email.trim();
        let mut matches: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id && a.client_email.inner().eq_ignore_ascii_case(email)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(matches)
    }

    async fn set_external_event_id(
        &self,
        id: Uuid,
        external_event_id: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let appointment = state.appointments.get_mut(&id).ok_or(StoreError::NotFound)?;
        appointment.external_event_id = external_event_id.map(str::to_string);
        appointment.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            failing_inserts: self.failing_inserts.clone(),
        }))
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn calendar_settings(&self, tenant_id: Uuid) -> StoreResult<TenantCalendarSettings> {
        let state = self.state.lock().await;
        Ok(state
            .tenants
            .get(&tenant_id)
            .cloned()
            .unwrap_or_else(|| TenantCalendarSettings::unconfigured(tenant_id)))
    }
}

fn valid_hold(state: &MemoryState, id: Uuid, tenant_id: Uuid, now: DateTime<Utc>) -> Option<Hold> {
    state
        .holds
        .get(&id)
        .filter(|h| h.tenant_id == tenant_id && h.is_valid_at(now))
        .cloned()
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    failing_inserts: Arc<AtomicUsize>,
}

impl InMemoryTransaction {
    fn take_injected_failure(&self) -> bool {
        self.failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BookingTransaction for InMemoryTransaction {
    async fn find_by_source_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        Ok(self
            .working
            .appointments
            .values()
            .find(|a| a.tenant_id == tenant_id && a.source_hold_id == hold_id)
            .cloned())
    }

    async fn rescheduled_from(
        &mut self,
        tenant_id: Uuid,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Uuid>> {
        Ok(self
            .working
            .audit_log
            .iter()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && e.entity_id == appointment_id
                    && e.event_type == AuditEventType::BookingRescheduled
            })
            .find_map(|e| e.payload.get("previous_appointment_id")?.as_str())
            .and_then(|id| Uuid::parse_str(id).ok()))
    }

    async fn acquire_advisory_lock(&mut self, _key: i64) -> StoreResult<()> {
        // The state mutex already serializes every transaction.
        Ok(())
    }

    async fn find_valid_hold(
        &mut self,
        tenant_id: Uuid,
        hold_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Hold>> {
        Ok(valid_hold(&self.working, hold_id, tenant_id, now))
    }

    async fn lock_appointment(
        &mut self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> StoreResult<Option<Appointment>> {
        Ok(self
            .working
            .appointments
            .get(&id)
            .filter(|a| a.tenant_id == tenant_id)
            .cloned())
    }

    async fn reference_code_exists(&mut self, reference_code: &str) -> StoreResult<bool> {
        Ok(self
            .working
            .appointments
            .values()
            .any(|a| a.reference_code == reference_code))
    }

    async fn insert_appointment(
        &mut self,
        appointment: &NewAppointment,
    ) -> StoreResult<Appointment> {
        if self.take_injected_failure() {
            return Err(StoreError::Database("injected insert failure".to_string()));
        }

        let existing = self.working.appointments.values();
        let mut overlap = false;
        for other in existing {
            if other.source_hold_id == appointment.source_hold_id {
                return Err(StoreError::DuplicateSourceHold);
            }
            if other.reference_code == appointment.reference_code {
                return Err(StoreError::Database(format!(
                    "duplicate reference code {}",
                    appointment.reference_code
                )));
            }
            if other.tenant_id == appointment.tenant_id
                && other.is_confirmed()
                && other.overlaps(appointment.start_time, appointment.end_time)
            {
                overlap = true;
            }
        }
        if overlap {
            return Err(StoreError::ExclusionViolation);
        }

        let created = appointment.clone().into_appointment(Utc::now());
        self.working.appointments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_status(
        &mut self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> StoreResult<Appointment> {
        let appointment = self
            .working
            .appointments
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        appointment.status = status;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn insert_hold(&mut self, hold: &Hold) -> StoreResult<()> {
        self.working.holds.insert(hold.id, hold.clone());
        Ok(())
    }

    async fn delete_hold(&mut self, id: Uuid) -> StoreResult<()> {
        self.working.holds.remove(&id);
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        self.working.audit_log.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use slotwise_core::BookingRequest;
    use slotwise_shared::Masked;

    fn hold_at(tenant_id: Uuid, hour: u32) -> Hold {
        Hold::new(
            tenant_id,
            "session-1",
            Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, hour, 30, 0).unwrap(),
            Duration::minutes(5),
        )
    }

    fn new_appointment(hold: &Hold, code: &str) -> NewAppointment {
        let req = BookingRequest {
            tenant_id: hold.tenant_id,
            session_id: hold.session_id.clone(),
            hold_id: hold.id,
            client_name: "Jane Doe".to_string(),
            client_email: Masked::from("jane@example.com"),
            client_phone: Masked::from("+15551234567"),
            client_notes: None,
            service: Some("Consultation".to_string()),
            timezone: "Europe/Berlin".to_string(),
        };
        NewAppointment::from_request(hold, &req, code.to_string())
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_leaves_no_trace() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        let hold = hold_at(tenant, 14);

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(&new_appointment(&hold, "APT-AAAAAA")).await.unwrap();
        drop(tx);

        assert!(store.appointments(tenant).await.is_empty());
    }

    #[tokio::test]
    async fn test_overlap_is_rejected_per_tenant() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        let first = hold_at(tenant, 14);
        let second = hold_at(tenant, 14);
        let other_tenant = hold_at(Uuid::new_v4(), 14);

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(&new_appointment(&first, "APT-AAAAAA")).await.unwrap();
        let err = tx
            .insert_appointment(&new_appointment(&second, "APT-BBBBBB"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::ExclusionViolation);
        tx.insert_appointment(&new_appointment(&other_tenant, "APT-CCCCCC"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.appointments(tenant).await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_appointments_free_the_interval() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        let first = hold_at(tenant, 9);
        let second = hold_at(tenant, 9);

        let mut tx = store.begin().await.unwrap();
        let created = tx.insert_appointment(&new_appointment(&first, "APT-AAAAAA")).await.unwrap();
        tx.update_status(created.id, AppointmentStatus::Cancelled).await.unwrap();
        tx.insert_appointment(&new_appointment(&second, "APT-BBBBBB")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.appointments(tenant).await.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_holds_are_reclaimed() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        let live = hold_at(tenant, 10);
        let mut stale = hold_at(tenant, 11);
        stale.expires_at = Utc::now() - Duration::seconds(1);

        store.insert_hold(&live).await.unwrap();
        store.insert_hold(&stale).await.unwrap();

        assert!(store.find_valid_hold(stale.id, tenant, Utc::now()).await.unwrap().is_none());
        let reclaimed = store.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, stale.id);
        assert_eq!(store.holds(tenant).await.len(), 1);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = InMemoryStore::new();
        let tenant = Uuid::new_v4();
        let hold = hold_at(tenant, 15);

        let mut tx = store.begin().await.unwrap();
        tx.insert_appointment(&new_appointment(&hold, "APT-AAAAAA")).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.find_by_client_email(tenant, " JANE@example.COM ").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(store.find_by_client_email(Uuid::new_v4(), "jane@example.com").await.unwrap().is_empty());
    }
}
