pub mod calendar;
pub mod events;
pub mod holds;
pub mod orchestrator;
pub mod retry;
pub mod service;
pub mod sync;

pub use calendar::{CircuitBreaker, NoopCalendarProvider, ResilientCalendar};
pub use events::ChannelEventBus;
pub use holds::HoldManager;
pub use orchestrator::{ConfirmOutcome, RescheduleOutcome, TransactionOrchestrator};
pub use retry::RetryPolicy;
pub use service::{BookingDependencies, BookingService, BookingSettings};
pub use sync::ExternalSync;
