use anyhow::Context;
use slotwise_api::{app, worker, AppState};
use slotwise_booking::{
    BookingDependencies, BookingService, BookingSettings, ChannelEventBus, NoopCalendarProvider,
    ResilientCalendar, RetryPolicy,
};
use slotwise_core::EventBus;
use slotwise_store::app_config::Config;
use slotwise_store::{DbClient, PgAppointmentRepository, PgHoldRepository, PgTenantRepository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "slotwise_api=debug,slotwise_booking=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Slotwise API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let appointments = Arc::new(PgAppointmentRepository::new(db.pool.clone()));
    let calendar = Arc::new(ResilientCalendar::new(
        Arc::new(NoopCalendarProvider),
        config.calendar.failure_threshold,
        Duration::from_secs(config.calendar.reset_timeout_seconds),
        Duration::from_secs(config.calendar.request_timeout_seconds),
    ));

    let deps = BookingDependencies {
        holds: Arc::new(PgHoldRepository::new(db.pool.clone())),
        appointments: appointments.clone(),
        bookings: appointments,
        tenants: Arc::new(PgTenantRepository::new(db.pool.clone())),
        calendar,
        events: event_bus(&config)?,
    };

    let rules = &config.booking;
    let settings = BookingSettings {
        hold_ttl: chrono::Duration::seconds(rules.hold_ttl_seconds as i64),
        strict_calendar_sync: rules.strict_calendar_sync,
        retry: RetryPolicy::with_max_retries(rules.max_transaction_retries),
    };
    let booking = Arc::new(BookingService::new(deps, settings));

    tokio::spawn(worker::start_hold_reclaimer(
        booking.clone(),
        Duration::from_secs(rules.reclaim_interval_seconds.max(1)),
    ));

    let app = app(AppState::new(booking));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = slotwise_store::EventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            tracing::info!("Publishing booking events to Kafka at {}", kafka.brokers);
            Ok(Arc::new(slotwise_store::KafkaEventBus::new(producer)))
        }
        None => Ok(Arc::new(ChannelEventBus::default())),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_bus(config: &Config) -> anyhow::Result<Arc<dyn EventBus>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but the kafka feature is disabled, using in-process events");
    }
    Ok(Arc::new(ChannelEventBus::default()))
}
