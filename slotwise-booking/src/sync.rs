//! Post-commit calendar mirroring.
//!
//! Runs after the atomic phase has committed and never inside a transaction. In
//! lenient mode a failed calendar write is reported and the booking stands. In strict
//! mode the booking is rolled back and the slot handed back to the session as a
//! fresh hold.

use chrono::Utc;
use slotwise_core::calendar::{CalendarError, CalendarEventRequest, CalendarProvider};
use slotwise_core::repository::{AppointmentStore, TenantDirectory};
use slotwise_core::{
    Appointment, BookingError, BookingEvent, BookingResult, EventBus, StoreError,
    TenantCalendarSettings,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::orchestrator::TransactionOrchestrator;

pub struct ExternalSync {
    calendar: Arc<dyn CalendarProvider>,
    tenants: Arc<dyn TenantDirectory>,
    appointments: Arc<dyn AppointmentStore>,
    events: Arc<dyn EventBus>,
    strict_by_default: bool,
}

impl ExternalSync {
    pub fn new(
        calendar: Arc<dyn CalendarProvider>,
        tenants: Arc<dyn TenantDirectory>,
        appointments: Arc<dyn AppointmentStore>,
        events: Arc<dyn EventBus>,
        strict_by_default: bool,
    ) -> Self {
        Self {
            calendar,
            tenants,
            appointments,
            events,
            strict_by_default,
        }
    }

    async fn settings(&self, appointment: &Appointment) -> Result<TenantCalendarSettings, StoreError> {
        self.tenants
            .calendar_settings(appointment.tenant_id)
            .await
            .inspect_err(|e| {
                warn!(
                    tenant_id = %appointment.tenant_id,
                    appointment_id = %appointment.id,
                    error = %e,
                    "Tenant calendar settings unavailable"
                )
            })
    }

    fn is_eligible(&self, settings: &TenantCalendarSettings) -> bool {
        settings.has_credentials || self.calendar.is_passthrough()
    }

    /// Creates the calendar event and stores its id on the appointment.
    ///
    /// Returns `Ok(None)` when the tenant is not set up for calendar sync.
    async fn push_event(
        &self,
        appointment: &Appointment,
        settings: &TenantCalendarSettings,
    ) -> Result<Option<String>, CalendarError> {
        if !self.is_eligible(settings) {
            debug!(tenant_id = %appointment.tenant_id, "Tenant has no calendar configured");
            return Ok(None);
        }

        let request = CalendarEventRequest::for_appointment(appointment, settings);
        let event_id = self.calendar.create_event(&request).await?;

        if let Err(e) = self
            .appointments
            .set_external_event_id(appointment.id, Some(&event_id))
            .await
        {
            // The event exists either way; only the back-reference is lost.
            warn!(
                appointment_id = %appointment.id,
                external_event_id = %event_id,
                error = %e,
                "Failed to store calendar event id"
            );
        }
        Ok(Some(event_id))
    }

    fn report_failure(&self, appointment: &Appointment, reason: &str, compensated: bool) {
        self.events.emit(BookingEvent::CalendarWriteFailed {
            tenant_id: appointment.tenant_id,
            appointment_id: appointment.id,
            reason: reason.to_string(),
            compensated,
            timestamp: Utc::now().timestamp(),
        });
    }

    /// Mirrors a fresh confirmation. Returns the appointment as it now stands, or
    /// `CalendarSyncRequired` when strict mode rolled it back.
    ///
    /// Unreadable tenant settings count as a failed write under the global mode.
    pub async fn after_confirm(
        &self,
        orchestrator: &TransactionOrchestrator,
        appointment: Appointment,
        session_id: &str,
    ) -> BookingResult<Appointment> {
        let (reason, strict) = match self.settings(&appointment).await {
            Ok(settings) => match self.push_event(&appointment, &settings).await {
                Ok(Some(event_id)) => {
                    info!(
                        appointment_id = %appointment.id,
                        external_event_id = %event_id,
                        "Calendar event created"
                    );
                    return Ok(Appointment {
                        external_event_id: Some(event_id),
                        ..appointment
                    });
                }
                Ok(None) => return Ok(appointment),
                Err(err) => (
                    err.to_string(),
                    settings.strict_sync.unwrap_or(self.strict_by_default),
                ),
            },
            Err(e) => (
                format!("tenant calendar settings unavailable: {e}"),
                self.strict_by_default,
            ),
        };

        if !strict {
            warn!(
                tenant_id = %appointment.tenant_id,
                appointment_id = %appointment.id,
                reference_code = %appointment.reference_code,
                error = %reason,
                "Calendar sync failed, keeping booking"
            );
            self.report_failure(&appointment, &reason, false);
            return Ok(appointment);
        }

        error!(
            tenant_id = %appointment.tenant_id,
            appointment_id = %appointment.id,
            error = %reason,
            "Calendar sync failed in strict mode, rolling back booking"
        );
        let compensated = match orchestrator
            .rollback_confirmation(&appointment, session_id, &reason)
            .await
        {
            Ok(hold) => {
                info!(
                    appointment_id = %appointment.id,
                    hold_id = %hold.id,
                    expires_at = %hold.expires_at,
                    "Slot returned to session as a fresh hold"
                );
                true
            }
            Err(rollback_err) => {
                // Never masks the sync failure the caller is about to see.
                error!(
                    appointment_id = %appointment.id,
                    error = %rollback_err,
                    "Compensation failed, booking left confirmed without calendar event"
                );
                false
            }
        };
        self.report_failure(&appointment, &reason, compensated);
        Err(BookingError::CalendarSyncRequired)
    }

    /// Best-effort: moves the calendar event from the old appointment to the new one.
    pub async fn after_reschedule(&self, previous: &Appointment, appointment: Appointment) -> Appointment {
        let settings = self.settings(&appointment).await;
        let calendar_id = settings
            .as_ref()
            .ok()
            .and_then(|settings| settings.calendar_id.as_deref());

        if let Some(event_id) = previous.external_event_id.as_deref() {
            if let Err(err) = self
                .calendar
                .delete_event(previous.tenant_id, calendar_id, event_id)
                .await
            {
                warn!(
                    appointment_id = %previous.id,
                    external_event_id = %event_id,
                    error = %err,
                    "Failed to remove calendar event of rescheduled appointment"
                );
                self.report_failure(previous, &err.to_string(), false);
            }
        }

        let settings = match settings {
            Ok(settings) => settings,
            Err(e) => {
                self.report_failure(
                    &appointment,
                    &format!("tenant calendar settings unavailable: {e}"),
                    false,
                );
                return appointment;
            }
        };

        match self.push_event(&appointment, &settings).await {
            Ok(Some(event_id)) => Appointment {
                external_event_id: Some(event_id),
                ..appointment
            },
            Ok(None) => appointment,
            Err(err) => {
                warn!(
                    appointment_id = %appointment.id,
                    reference_code = %appointment.reference_code,
                    error = %err,
                    "Calendar sync failed for rescheduled appointment"
                );
                self.report_failure(&appointment, &err.to_string(), false);
                appointment
            }
        }
    }

    /// Best-effort removal of the calendar event of a cancelled appointment.
    pub async fn after_cancel(&self, appointment: &Appointment) {
        let Some(event_id) = appointment.external_event_id.as_deref() else {
            return;
        };
        let calendar_id = self
            .settings(appointment)
            .await
            .ok()
            .and_then(|settings| settings.calendar_id);

        match self
            .calendar
            .delete_event(appointment.tenant_id, calendar_id.as_deref(), event_id)
            .await
        {
            Ok(()) => debug!(appointment_id = %appointment.id, "Calendar event removed"),
            Err(err) => warn!(
                appointment_id = %appointment.id,
                external_event_id = %event_id,
                error = %err,
                "Failed to remove calendar event of cancelled appointment"
            ),
        }
    }
}
