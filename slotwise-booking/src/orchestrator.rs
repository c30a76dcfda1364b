//! The atomic phase of every booking lifecycle change.
//!
//! Each operation runs inside one serializable store transaction. Anything that fails
//! inside the transaction rolls it back, so a confirm, reschedule or cancel either
//! happens completely or leaves no trace. Calendar calls never happen here.

use chrono::{Duration, Utc};
use serde_json::json;
use slotwise_core::lock::advisory_lock_key;
use slotwise_core::reference::generate_reference_code;
use slotwise_core::repository::{BookingStore, BookingTransaction};
use slotwise_core::{
    Appointment, AppointmentStatus, AuditEntry, AuditEventType, BookingError, BookingRequest,
    BookingResult, CancelRequest, Hold, NewAppointment, RescheduleRequest, StoreError,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::retry::{retry_transaction, RetryPolicy};

const MAX_REFERENCE_ATTEMPTS: usize = 5;
const SYSTEM_ACTOR: &str = "system";
const COMPENSATION_ACTOR: &str = "system:calendar-sync";

#[derive(Debug, Clone)]
pub struct ConfirmOutcome {
    pub appointment: Appointment,
    /// The hold was already confirmed earlier and the stored appointment was returned.
    pub replayed: bool,
}

#[derive(Debug, Clone)]
pub struct RescheduleOutcome {
    pub previous: Appointment,
    pub appointment: Appointment,
    pub replayed: bool,
}

pub struct TransactionOrchestrator {
    store: Arc<dyn BookingStore>,
    retry: RetryPolicy,
    hold_ttl: Duration,
}

impl TransactionOrchestrator {
    pub fn new(store: Arc<dyn BookingStore>, retry: RetryPolicy, hold_ttl: Duration) -> Self {
        Self {
            store,
            retry,
            hold_ttl,
        }
    }

    /// Turns a hold into a confirmed appointment.
    ///
    /// Confirming an already-confirmed hold returns the existing appointment with
    /// `replayed` set. Two sessions racing for overlapping holds produce exactly one
    /// appointment; the loser gets `SlotConflict`.
    pub async fn confirm(&self, request: &BookingRequest) -> BookingResult<ConfirmOutcome> {
        validate_booking_request(request)?;
        retry_transaction(&self.retry, "confirm", || self.confirm_once(request)).await
    }

    async fn confirm_once(&self, request: &BookingRequest) -> BookingResult<ConfirmOutcome> {
        let mut tx = self.store.begin().await?;
        let result = confirm_in(tx.as_mut(), request).await;
        finish(tx, result).await
    }

    /// Cancels the old appointment and books the new hold in one transaction.
    pub async fn reschedule(
        &self,
        request: &RescheduleRequest,
    ) -> BookingResult<RescheduleOutcome> {
        retry_transaction(&self.retry, "reschedule", || self.reschedule_once(request)).await
    }

    async fn reschedule_once(
        &self,
        request: &RescheduleRequest,
    ) -> BookingResult<RescheduleOutcome> {
        let mut tx = self.store.begin().await?;
        let result = reschedule_in(tx.as_mut(), request).await;
        finish(tx, result).await
    }

    pub async fn cancel(&self, request: &CancelRequest) -> BookingResult<Appointment> {
        retry_transaction(&self.retry, "cancel", || self.cancel_once(request)).await
    }

    async fn cancel_once(&self, request: &CancelRequest) -> BookingResult<Appointment> {
        let mut tx = self.store.begin().await?;
        let result = cancel_in(tx.as_mut(), request).await;
        finish(tx, result).await
    }

    /// Undoes a confirmation whose calendar write failed: the appointment is cancelled and
    /// a fresh hold for the same interval is handed back to the session.
    pub async fn rollback_confirmation(
        &self,
        appointment: &Appointment,
        session_id: &str,
        reason: &str,
    ) -> BookingResult<Hold> {
        retry_transaction(&self.retry, "rollback_confirmation", || {
            self.rollback_once(appointment, session_id, reason)
        })
        .await
    }

    async fn rollback_once(
        &self,
        appointment: &Appointment,
        session_id: &str,
        reason: &str,
    ) -> BookingResult<Hold> {
        let mut tx = self.store.begin().await?;
        let hold = Hold::new(
            appointment.tenant_id,
            session_id,
            appointment.start_time,
            appointment.end_time,
            self.hold_ttl,
        );
        let result = rollback_in(tx.as_mut(), appointment, hold, reason).await;
        finish(tx, result).await
    }
}

async fn finish<T>(tx: Box<dyn BookingTransaction>, result: BookingResult<T>) -> BookingResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after {}", err.kind());
            }
            Err(err)
        }
    }
}

fn validate_booking_request(request: &BookingRequest) -> BookingResult<()> {
    if request.client_name.trim().is_empty() {
        return Err(BookingError::InvalidRequest("client name is required".to_string()));
    }
    if request.client_email.inner().trim().is_empty() && request.client_phone.inner().trim().is_empty() {
        return Err(BookingError::InvalidRequest(
            "an email address or phone number is required".to_string(),
        ));
    }
    Ok(())
}

fn session_actor(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// The exclusion constraint is the source of truth for overlaps.
fn insert_error(err: StoreError) -> BookingError {
    match err {
        StoreError::ExclusionViolation => BookingError::SlotConflict,
        other => BookingError::Storage(other),
    }
}

async fn unique_reference_code(tx: &mut dyn BookingTransaction) -> BookingResult<String> {
    for _ in 0..MAX_REFERENCE_ATTEMPTS {
        let code = generate_reference_code();
        if !tx.reference_code_exists(&code).await? {
            return Ok(code);
        }
        debug!(reference_code = %code, "Reference code collision");
    }
    Err(BookingError::Storage(StoreError::Database(
        "could not allocate a unique reference code".to_string(),
    )))
}

async fn claim_hold(
    tx: &mut dyn BookingTransaction,
    tenant_id: uuid::Uuid,
    hold_id: uuid::Uuid,
    session_id: &str,
) -> BookingResult<Hold> {
    tx.acquire_advisory_lock(advisory_lock_key(tenant_id, hold_id)).await?;

    let hold = tx
        .find_valid_hold(tenant_id, hold_id, Utc::now())
        .await?
        .ok_or(BookingError::HoldExpired)?;

    if !hold.is_owned_by(session_id) {
        return Err(BookingError::SessionMismatch);
    }
    Ok(hold)
}

async fn confirm_in(
    tx: &mut dyn BookingTransaction,
    request: &BookingRequest,
) -> BookingResult<ConfirmOutcome> {
    if let Some(existing) = tx.find_by_source_hold(request.tenant_id, request.hold_id).await? {
        // A rolled back or since-cancelled booking no longer answers for this hold.
        if !existing.is_confirmed() {
            return Err(BookingError::HoldExpired);
        }
        info!(
            tenant_id = %request.tenant_id,
            hold_id = %request.hold_id,
            appointment_id = %existing.id,
            "Hold already confirmed, returning existing appointment"
        );
        return Ok(ConfirmOutcome {
            appointment: existing,
            replayed: true,
        });
    }

    let hold = claim_hold(tx, request.tenant_id, request.hold_id, &request.session_id).await?;
    let reference_code = unique_reference_code(tx).await?;

    let appointment = tx
        .insert_appointment(&NewAppointment::from_request(&hold, request, reference_code))
        .await
        .map_err(insert_error)?;

    tx.delete_hold(hold.id).await?;
    tx.append_audit(&AuditEntry::for_appointment(
        &appointment,
        AuditEventType::BookingCreated,
        &session_actor(&request.session_id),
        json!({
            "hold_id": hold.id,
            "reference_code": appointment.reference_code,
            "start_time": appointment.start_time,
            "end_time": appointment.end_time,
        }),
    ))
    .await?;

    info!(
        tenant_id = %appointment.tenant_id,
        appointment_id = %appointment.id,
        reference_code = %appointment.reference_code,
        client_email = %appointment.client_email,
        "Appointment confirmed"
    );

    Ok(ConfirmOutcome {
        appointment,
        replayed: false,
    })
}

async fn reschedule_in(
    tx: &mut dyn BookingTransaction,
    request: &RescheduleRequest,
) -> BookingResult<RescheduleOutcome> {
    if let Some(existing) = tx
        .find_by_source_hold(request.tenant_id, request.new_hold_id)
        .await?
    {
        // Only a finished reschedule of this same appointment counts as a replay.
        let previous = tx
            .lock_appointment(request.tenant_id, request.appointment_id)
            .await?
            .ok_or(BookingError::NotFound)?;
        if previous.is_confirmed() || previous.id == existing.id {
            return Err(BookingError::HoldExpired);
        }
        if tx.rescheduled_from(request.tenant_id, existing.id).await? != Some(previous.id) {
            return Err(BookingError::HoldExpired);
        }
        return Ok(RescheduleOutcome {
            previous,
            appointment: existing,
            replayed: true,
        });
    }

    let hold = claim_hold(tx, request.tenant_id, request.new_hold_id, &request.session_id).await?;

    let current = tx
        .lock_appointment(request.tenant_id, request.appointment_id)
        .await?
        .ok_or(BookingError::NotFound)?;
    if !current.is_confirmed() {
        return Err(BookingError::NotConfirmed);
    }

    let previous = tx
        .update_status(current.id, AppointmentStatus::Cancelled)
        .await?;

    let reference_code = unique_reference_code(tx).await?;
    let appointment = tx
        .insert_appointment(&NewAppointment::rescheduled_from(
            &previous,
            &hold,
            &request.timezone,
            reference_code,
        ))
        .await
        .map_err(insert_error)?;

    tx.delete_hold(hold.id).await?;
    tx.append_audit(&AuditEntry::for_appointment(
        &appointment,
        AuditEventType::BookingRescheduled,
        &session_actor(&request.session_id),
        json!({
            "hold_id": hold.id,
            "previous_appointment_id": previous.id,
            "previous_reference_code": previous.reference_code,
            "reference_code": appointment.reference_code,
            "previous_start_time": previous.start_time,
            "start_time": appointment.start_time,
        }),
    ))
    .await?;

    info!(
        tenant_id = %appointment.tenant_id,
        previous_appointment_id = %previous.id,
        appointment_id = %appointment.id,
        reference_code = %appointment.reference_code,
        "Appointment rescheduled"
    );

    Ok(RescheduleOutcome {
        previous,
        appointment,
        replayed: false,
    })
}

async fn cancel_in(
    tx: &mut dyn BookingTransaction,
    request: &CancelRequest,
) -> BookingResult<Appointment> {
    let current = tx
        .lock_appointment(request.tenant_id, request.appointment_id)
        .await?
        .ok_or(BookingError::NotFound)?;
    if !current.is_confirmed() {
        return Err(BookingError::NotConfirmed);
    }

    let cancelled = tx
        .update_status(current.id, AppointmentStatus::Cancelled)
        .await?;

    let actor = request.actor.as_deref().unwrap_or(SYSTEM_ACTOR);
    tx.append_audit(&AuditEntry::for_appointment(
        &cancelled,
        AuditEventType::BookingCancelled,
        actor,
        json!({ "reference_code": cancelled.reference_code }),
    ))
    .await?;

    info!(
        tenant_id = %cancelled.tenant_id,
        appointment_id = %cancelled.id,
        reference_code = %cancelled.reference_code,
        "Appointment cancelled"
    );
    Ok(cancelled)
}

async fn rollback_in(
    tx: &mut dyn BookingTransaction,
    appointment: &Appointment,
    hold: Hold,
    reason: &str,
) -> BookingResult<Hold> {
    let cancelled = tx
        .update_status(appointment.id, AppointmentStatus::Cancelled)
        .await?;
    tx.insert_hold(&hold).await?;
    tx.append_audit(&AuditEntry::for_appointment(
        &cancelled,
        AuditEventType::BookingRolledBack,
        COMPENSATION_ACTOR,
        json!({
            "reason": reason,
            "reference_code": cancelled.reference_code,
            "replacement_hold_id": hold.id,
            "replacement_hold_expires_at": hold.expires_at,
        }),
    ))
    .await?;

    warn!(
        tenant_id = %cancelled.tenant_id,
        appointment_id = %cancelled.id,
        hold_id = %hold.id,
        "Booking rolled back after calendar sync failure"
    );
    Ok(hold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwise_shared::Masked;
    use uuid::Uuid;

    fn request(name: &str, email: &str, phone: &str) -> BookingRequest {
        BookingRequest {
            tenant_id: Uuid::new_v4(),
            session_id: "session-1".to_string(),
            hold_id: Uuid::new_v4(),
            client_name: name.to_string(),
            client_email: Masked::from(email),
            client_phone: Masked::from(phone),
            client_notes: None,
            service: None,
            timezone: "Europe/London".to_string(),
        }
    }

    #[test]
    fn test_booking_request_needs_a_contact() {
        assert!(validate_booking_request(&request("Ana", "ana@example.com", "")).is_ok());
        assert!(validate_booking_request(&request("Ana", "", "+447700900123")).is_ok());
        assert_eq!(
            validate_booking_request(&request("Ana", "", "")).unwrap_err().kind(),
            "invalid_request"
        );
        assert_eq!(
            validate_booking_request(&request("  ", "ana@example.com", "")).unwrap_err().kind(),
            "invalid_request"
        );
    }

    #[test]
    fn test_exclusion_violation_becomes_slot_conflict() {
        assert_eq!(insert_error(StoreError::ExclusionViolation), BookingError::SlotConflict);
        assert_eq!(
            insert_error(StoreError::SerializationFailure),
            BookingError::Storage(StoreError::SerializationFailure)
        );
    }
}
