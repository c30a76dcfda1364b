pub mod calendar;
pub mod error;
pub mod events;
pub mod lock;
pub mod models;
pub mod reference;
pub mod repository;

pub use error::{BookingError, BookingResult, StoreError};
pub use events::{BookingEvent, EventBus};
pub use models::{
    Appointment, AppointmentStatus, AuditEntry, AuditEventType, BookingRequest, CancelRequest,
    Hold, NewAppointment, RescheduleRequest, TenantCalendarSettings,
};
