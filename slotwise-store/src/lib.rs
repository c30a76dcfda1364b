pub mod app_config;
pub mod booking_repo;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod hold_repo;
pub mod memory;
pub mod tenant_repo;

pub use booking_repo::PgAppointmentRepository;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaEventBus};
pub use hold_repo::PgHoldRepository;
pub use memory::InMemoryStore;
pub use tenant_repo::PgTenantRepository;
