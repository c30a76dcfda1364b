use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwise_shared::Masked;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A time-boxed, session-owned claim on a slot prior to confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hold {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Hold {
    pub fn new(
        tenant_id: Uuid,
        session_id: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            session_id: session_id.into(),
            start_time,
            end_time,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    /// A hold is visible only while `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_owned_by(&self, session_id: &str) -> bool {
        self.session_id == session_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status: {}", other)),
        }
    }
}

/// A confirmed or terminal booking. Never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_name: String,
    pub client_email: Masked<String>,
    pub client_phone: Masked<String>,
    pub client_notes: Option<String>,
    pub service: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub status: AppointmentStatus,
    pub reference_code: String,
    /// Hold this appointment was created from; the idempotency key for confirm.
    pub source_hold_id: Uuid,
    pub external_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }

    /// Half-open interval overlap on `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

/// Insert payload for the appointment store.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub client_name: String,
    pub client_email: Masked<String>,
    pub client_phone: Masked<String>,
    pub client_notes: Option<String>,
    pub service: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub timezone: String,
    pub reference_code: String,
    pub source_hold_id: Uuid,
}

impl NewAppointment {
    pub fn from_request(hold: &Hold, req: &BookingRequest, reference_code: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: hold.tenant_id,
            client_name: req.client_name.clone(),
            client_email: req.client_email.clone(),
            client_phone: req.client_phone.clone(),
            client_notes: req.client_notes.clone(),
            service: req.service.clone(),
            start_time: hold.start_time,
            end_time: hold.end_time,
            timezone: req.timezone.clone(),
            reference_code,
            source_hold_id: hold.id,
        }
    }

    /// Replacement appointment for a reschedule: client details carry over from the old booking.
    pub fn rescheduled_from(
        previous: &Appointment,
        hold: &Hold,
        timezone: &str,
        reference_code: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: hold.tenant_id,
            client_name: previous.client_name.clone(),
            client_email: previous.client_email.clone(),
            client_phone: previous.client_phone.clone(),
            client_notes: previous.client_notes.clone(),
            service: previous.service.clone(),
            start_time: hold.start_time,
            end_time: hold.end_time,
            timezone: timezone.to_string(),
            reference_code,
            source_hold_id: hold.id,
        }
    }

    pub fn into_appointment(self, now: DateTime<Utc>) -> Appointment {
        Appointment {
            id: self.id,
            tenant_id: self.tenant_id,
            client_name: self.client_name,
            client_email: self.client_email,
            client_phone: self.client_phone,
            client_notes: self.client_notes,
            service: self.service,
            start_time: self.start_time,
            end_time: self.end_time,
            timezone: self.timezone,
            status: AppointmentStatus::Confirmed,
            reference_code: self.reference_code,
            source_hold_id: self.source_hold_id,
            external_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    BookingCreated,
    BookingRescheduled,
    BookingCancelled,
    BookingRolledBack,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::BookingCreated => "booking_created",
            AuditEventType::BookingRescheduled => "booking_rescheduled",
            AuditEventType::BookingCancelled => "booking_cancelled",
            AuditEventType::BookingRolledBack => "booking_rolled_back",
        }
    }
}

/// Immutable lifecycle record, written in the same transaction as the change it documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub event_type: AuditEventType,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn for_appointment(
        appointment: &Appointment,
        event_type: AuditEventType,
        actor: &str,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: appointment.tenant_id,
            event_type,
            entity_type: "appointment".to_string(),
            entity_id: appointment.id,
            actor: actor.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub tenant_id: Uuid,
    pub session_id: String,
    pub hold_id: Uuid,
    pub client_name: String,
    pub client_email: Masked<String>,
    pub client_phone: Masked<String>,
    #[serde(default)]
    pub client_notes: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub tenant_id: Uuid,
    pub session_id: String,
    pub appointment_id: Uuid,
    pub new_hold_id: Uuid,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub tenant_id: Uuid,
    pub appointment_id: Uuid,
    #[serde(default)]
    pub actor: Option<String>,
}

/// Read-only calendar configuration for a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantCalendarSettings {
    pub tenant_id: Uuid,
    pub calendar_id: Option<String>,
    pub has_credentials: bool,
    /// Per-tenant override of the global strict sync flag.
    pub strict_sync: Option<bool>,
}

impl TenantCalendarSettings {
    pub fn unconfigured(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            calendar_id: None,
            has_credentials: false,
            strict_sync: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn slot(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_hold_visibility_window() {
        let hold = Hold::new(Uuid::new_v4(), "session-1", slot(14, 0), slot(14, 30), Duration::minutes(5));
        assert!(hold.is_valid_at(hold.created_at));
        assert!(!hold.is_valid_at(hold.expires_at));
        assert!(hold.is_owned_by("session-1"));
        assert!(!hold.is_owned_by("session-2"));
    }

    #[test]
    fn test_overlap_is_half_open() {
        let hold = Hold::new(Uuid::new_v4(), "s", slot(14, 0), slot(14, 30), Duration::minutes(5));
        let req = BookingRequest {
            tenant_id: hold.tenant_id,
            session_id: "s".to_string(),
            hold_id: hold.id,
            client_name: "Jane".to_string(),
            client_email: Masked::from("jane@example.com"),
            client_phone: Masked::from("+15550000000"),
            client_notes: None,
            service: None,
            timezone: "UTC".to_string(),
        };
        let appt = NewAppointment::from_request(&hold, &req, "APT-ABCDEF".to_string())
            .into_appointment(Utc::now());

        assert!(appt.overlaps(slot(14, 15), slot(14, 45)));
        assert!(appt.overlaps(slot(13, 0), slot(15, 0)));
        // Back-to-back slots do not collide
        assert!(!appt.overlaps(slot(14, 30), slot(15, 0)));
        assert!(!appt.overlaps(slot(13, 30), slot(14, 0)));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        assert_eq!("confirmed".parse::<AppointmentStatus>().unwrap(), AppointmentStatus::Confirmed);
        assert_eq!(AppointmentStatus::Cancelled.to_string(), "cancelled");
        assert!("pending".parse::<AppointmentStatus>().is_err());
    }
}
