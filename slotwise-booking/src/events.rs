use slotwise_core::{BookingEvent, EventBus};
use tokio::sync::broadcast;
use tracing::debug;

/// In-process event bus. Emitting never blocks and is fine with zero subscribers;
/// slow subscribers lag and lose the oldest events.
#[derive(Clone)]
pub struct ChannelEventBus {
    sender: broadcast::Sender<BookingEvent>,
}

impl ChannelEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus for ChannelEventBus {
    fn emit(&self, event: BookingEvent) {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => debug!(topic, receivers, "Booking event emitted"),
            Err(_) => debug!(topic, "Booking event emitted with no subscribers"),
        }
    }
}
