use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use slotwise_core::{BookingEvent, EventBus};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(topic, key, partition = delivery.partition, offset = delivery.offset, "Published booking event");
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Publishes each booking event to its own topic, keyed by tenant.
///
/// Delivery runs on a spawned task so `emit` never waits on the broker.
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: EventProducer,
}

impl KafkaEventBus {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

impl EventBus for KafkaEventBus {
    fn emit(&self, event: BookingEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize {} event: {}", event.topic(), e);
                return;
            }
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, dropping {} event", event.topic());
                return;
            }
        };

        let producer = self.producer.clone();
        let topic = event.topic();
        let key = event.tenant_id().to_string();
        handle.spawn(async move {
            let _ = producer.publish(topic, &key, &payload).await;
        });
    }
}
