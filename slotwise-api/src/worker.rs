use slotwise_booking::BookingService;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Periodically deletes expired holds so their slots stop showing as taken.
pub async fn start_hold_reclaimer(service: Arc<BookingService>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_secs = every.as_secs(), "Hold reclaimer started");

    loop {
        ticker.tick().await;
        if let Err(e) = service.reclaim_expired_holds().await {
            error!("Failed to reclaim expired holds: {}", e);
        }
    }
}
