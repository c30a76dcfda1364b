use slotwise_booking::BookingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
}

impl AppState {
    pub fn new(booking: Arc<BookingService>) -> Self {
        Self { booking }
    }
}
