use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Appointment, TenantCalendarSettings};

/// What the external calendar needs to mirror a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEventRequest {
    pub tenant_id: Uuid,
    pub calendar_id: Option<String>,
    pub appointment_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
}

impl CalendarEventRequest {
    pub fn for_appointment(appointment: &Appointment, settings: &TenantCalendarSettings) -> Self {
        let title = match &appointment.service {
            Some(service) => format!("{} - {}", service, appointment.client_name),
            None => appointment.client_name.clone(),
        };
        Self {
            tenant_id: appointment.tenant_id,
            calendar_id: settings.calendar_id.clone(),
            appointment_id: appointment.id,
            title,
            description: Some(format!("Reference {}", appointment.reference_code)),
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            timezone: appointment.timezone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar provider unavailable: {0}")]
    Unavailable(String),
    #[error("Calendar request timed out")]
    Timeout,
    #[error("Calendar circuit [{0}] is open")]
    CircuitOpen(String),
    #[error("Calendar provider rejected the request: {0}")]
    Rejected(String),
}

/// External calendar mirror. May be a no-op or mock implementation.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Creates the event and returns the provider's event id.
    async fn create_event(&self, request: &CalendarEventRequest) -> Result<String, CalendarError>;

    async fn delete_event(
        &self,
        tenant_id: Uuid,
        calendar_id: Option<&str>,
        external_event_id: &str,
    ) -> Result<(), CalendarError>;

    /// Pass-through doubles are synced even for tenants without credentials.
    fn is_passthrough(&self) -> bool {
        false
    }
}
