use chrono::{DateTime, Duration, Utc};
use slotwise_core::calendar::CalendarProvider;
use slotwise_core::reference::{is_valid_reference_code, normalize_reference_code};
use slotwise_core::repository::{AppointmentStore, BookingStore, HoldStore, TenantDirectory};
use slotwise_core::{
    Appointment, BookingError, BookingEvent, BookingRequest, BookingResult, CancelRequest,
    EventBus, Hold, RescheduleRequest,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::holds::{HoldManager, DEFAULT_HOLD_TTL_SECONDS};
use crate::orchestrator::TransactionOrchestrator;
use crate::retry::RetryPolicy;
use crate::sync::ExternalSync;

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub hold_ttl: Duration,
    /// Global strict sync flag; a tenant setting overrides it.
    pub strict_calendar_sync: bool,
    pub retry: RetryPolicy,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::seconds(DEFAULT_HOLD_TTL_SECONDS),
            strict_calendar_sync: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything the engine talks to, injected at construction.
#[derive(Clone)]
pub struct BookingDependencies {
    pub holds: Arc<dyn HoldStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub events: Arc<dyn EventBus>,
}

impl BookingDependencies {
    /// For stores that implement every repository contract themselves.
    pub fn from_store<S>(
        store: Arc<S>,
        calendar: Arc<dyn CalendarProvider>,
        events: Arc<dyn EventBus>,
    ) -> Self
    where
        S: HoldStore + AppointmentStore + BookingStore + TenantDirectory + 'static,
    {
        Self {
            holds: store.clone(),
            appointments: store.clone(),
            bookings: store.clone(),
            tenants: store,
            calendar,
            events,
        }
    }
}

/// Entry point for callers: holds, the three lifecycle operations and lookups.
pub struct BookingService {
    holds: HoldManager,
    orchestrator: TransactionOrchestrator,
    sync: ExternalSync,
    appointments: Arc<dyn AppointmentStore>,
    events: Arc<dyn EventBus>,
}

impl BookingService {
    pub fn new(deps: BookingDependencies, settings: BookingSettings) -> Self {
        Self {
            holds: HoldManager::new(deps.holds, settings.hold_ttl),
            orchestrator: TransactionOrchestrator::new(deps.bookings, settings.retry, settings.hold_ttl),
            sync: ExternalSync::new(
                deps.calendar,
                deps.tenants,
                deps.appointments.clone(),
                deps.events.clone(),
                settings.strict_calendar_sync,
            ),
            appointments: deps.appointments,
            events: deps.events,
        }
    }

    pub async fn create_hold(
        &self,
        tenant_id: Uuid,
        session_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BookingResult<Hold> {
        self.holds.create_hold(tenant_id, session_id, start_time, end_time).await
    }

    pub async fn reclaim_expired_holds(&self) -> BookingResult<Vec<Hold>> {
        self.holds.reclaim_expired().await
    }

    pub async fn confirm(&self, request: &BookingRequest) -> BookingResult<Appointment> {
        let outcome = self.orchestrator.confirm(request).await?;
        if outcome.replayed {
            return Ok(outcome.appointment);
        }

        let appointment = self
            .sync
            .after_confirm(&self.orchestrator, outcome.appointment, &request.session_id)
            .await?;

        self.events.emit(BookingEvent::BookingCreated {
            tenant_id: appointment.tenant_id,
            appointment_id: appointment.id,
            reference_code: appointment.reference_code.clone(),
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            timestamp: Utc::now().timestamp(),
        });
        Ok(appointment)
    }

    pub async fn reschedule(&self, request: &RescheduleRequest) -> BookingResult<Appointment> {
        let outcome = self.orchestrator.reschedule(request).await?;
        if outcome.replayed {
            return Ok(outcome.appointment);
        }

        let previous = outcome.previous;
        let appointment = self.sync.after_reschedule(&previous, outcome.appointment).await;

        let timestamp = Utc::now().timestamp();
        self.events.emit(BookingEvent::BookingRescheduled {
            tenant_id: appointment.tenant_id,
            old_appointment_id: previous.id,
            new_appointment_id: appointment.id,
            old_reference_code: previous.reference_code.clone(),
            new_reference_code: appointment.reference_code.clone(),
            timestamp,
        });
        self.events.emit(BookingEvent::SlotOpened {
            tenant_id: previous.tenant_id,
            start_time: previous.start_time,
            end_time: previous.end_time,
            timestamp,
        });
        Ok(appointment)
    }

    pub async fn cancel(&self, request: &CancelRequest) -> BookingResult<Appointment> {
        let cancelled = self.orchestrator.cancel(request).await?;
        self.sync.after_cancel(&cancelled).await;

        let timestamp = Utc::now().timestamp();
        self.events.emit(BookingEvent::BookingCancelled {
            tenant_id: cancelled.tenant_id,
            appointment_id: cancelled.id,
            reference_code: cancelled.reference_code.clone(),
            timestamp,
        });
        self.events.emit(BookingEvent::SlotOpened {
            tenant_id: cancelled.tenant_id,
            start_time: cancelled.start_time,
            end_time: cancelled.end_time,
            timestamp,
        });
        Ok(cancelled)
    }

    pub async fn get_appointment(&self, tenant_id: Uuid, id: Uuid) -> BookingResult<Appointment> {
        self.appointments
            .get_appointment(tenant_id, id)
            .await?
            .ok_or(BookingError::NotFound)
    }

    /// Codes are matched after trimming and upper-casing.
    pub async fn find_by_reference(
        &self,
        tenant_id: Uuid,
        reference_code: &str,
    ) -> BookingResult<Option<Appointment>> {
        let code = normalize_reference_code(reference_code);
        if !is_valid_reference_code(&code) {
            debug!(tenant_id = %tenant_id, "Malformed reference code looked up");
            return Ok(None);
        }
        Ok(self.appointments.find_by_reference(tenant_id, &code).await?)
    }

    pub async fn find_by_client_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> BookingResult<Vec<Appointment>> {
        let email = email.trim();
        if email.is_empty() {
            return Err(BookingError::InvalidRequest("email is required".to_string()));
        }
        Ok(self.appointments.find_by_client_email(tenant_id, email).await?)
    }
}
