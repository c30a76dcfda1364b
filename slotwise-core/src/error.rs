/// Failures reported by the storage layer.
///
/// The orchestrator switches on these variants: an exclusion violation becomes a
/// `SlotConflict`, serialization failures and duplicate source holds trigger a retry
/// of the whole transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Overlapping confirmed appointment")]
    ExclusionViolation,
    #[error("Transaction could not be serialized")]
    SerializationFailure,
    #[error("An appointment already exists for this hold")]
    DuplicateSourceHold,
    #[error("Record not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Errors after which re-running the whole transaction can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::SerializationFailure | StoreError::DuplicateSourceHold)
    }
}

/// Closed taxonomy of user-facing booking failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("Hold expired or not found")]
    HoldExpired,
    #[error("Hold belongs to a different session")]
    SessionMismatch,
    #[error("Slot already booked")]
    SlotConflict,
    #[error("Calendar sync failed and the booking was rolled back")]
    CalendarSyncRequired,
    #[error("Appointment not found")]
    NotFound,
    #[error("Appointment is not confirmed")]
    NotConfirmed,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl BookingError {
    /// Stable identifier for callers that switch on the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::HoldExpired => "hold_expired",
            BookingError::SessionMismatch => "session_mismatch",
            BookingError::SlotConflict => "slot_conflict",
            BookingError::CalendarSyncRequired => "calendar_sync_required",
            BookingError::NotFound => "not_found",
            BookingError::NotConfirmed => "not_confirmed",
            BookingError::InvalidRequest(_) => "invalid_request",
            BookingError::Storage(_) => "storage",
        }
    }

    /// Short, non-technical message safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            BookingError::HoldExpired => {
                "That time is no longer being held for you. Please pick a time again."
            }
            BookingError::SessionMismatch => {
                "That time is being held in another session. Please pick a different time."
            }
            BookingError::SlotConflict => {
                "Sorry, that time was just booked. Please pick a different time."
            }
            BookingError::CalendarSyncRequired => {
                "We couldn't add this booking to the calendar. Your time is still held, please try again."
            }
            BookingError::NotFound => "We couldn't find that booking.",
            BookingError::NotConfirmed => "That booking is no longer active.",
            BookingError::InvalidRequest(_) => {
                "Some booking details look wrong. Please check them and try again."
            }
            BookingError::Storage(_) => "Something went wrong on our side. Please try again.",
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
