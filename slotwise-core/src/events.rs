use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events emitted after a booking lifecycle change has committed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    BookingCreated {
        tenant_id: Uuid,
        appointment_id: Uuid,
        reference_code: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        timestamp: i64,
    },
    BookingCancelled {
        tenant_id: Uuid,
        appointment_id: Uuid,
        reference_code: String,
        timestamp: i64,
    },
    BookingRescheduled {
        tenant_id: Uuid,
        old_appointment_id: Uuid,
        new_appointment_id: Uuid,
        old_reference_code: String,
        new_reference_code: String,
        timestamp: i64,
    },
    SlotOpened {
        tenant_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        timestamp: i64,
    },
    CalendarWriteFailed {
        tenant_id: Uuid,
        appointment_id: Uuid,
        reason: String,
        /// True when strict mode rolled the booking back.
        compensated: bool,
        timestamp: i64,
    },
}

impl BookingEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::BookingCreated { .. } => "booking.created",
            BookingEvent::BookingCancelled { .. } => "booking.cancelled",
            BookingEvent::BookingRescheduled { .. } => "booking.rescheduled",
            BookingEvent::SlotOpened { .. } => "slot.opened",
            BookingEvent::CalendarWriteFailed { .. } => "calendar.write_failed",
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        match self {
            BookingEvent::BookingCreated { tenant_id, .. }
            | BookingEvent::BookingCancelled { tenant_id, .. }
            | BookingEvent::BookingRescheduled { tenant_id, .. }
            | BookingEvent::SlotOpened { tenant_id, .. }
            | BookingEvent::CalendarWriteFailed { tenant_id, .. } => *tenant_id,
        }
    }
}

/// Outbound, fire-and-forget event channel.
///
/// Implementations must not block the caller and must not surface delivery
/// failures; consumers (reminders, waitlist, sync workers) are never inspected.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: BookingEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = BookingEvent::SlotOpened {
            tenant_id: Uuid::nil(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            timestamp: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "slot_opened");
        assert_eq!(event.topic(), "slot.opened");
        assert_eq!(event.tenant_id(), Uuid::nil());
    }
}
