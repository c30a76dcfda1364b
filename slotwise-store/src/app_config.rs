use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub booking: BookingRules,
    pub calendar: CalendarConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    pub hold_ttl_seconds: u64,
    /// Global default; tenants can override it.
    #[serde(default)]
    pub strict_calendar_sync: bool,
    pub reclaim_interval_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_transaction_retries: usize,
}

fn default_max_retries() -> usize { 3 }

#[derive(Debug, Deserialize, Clone)]
pub struct CalendarConfig {
    pub failure_threshold: usize,
    pub reset_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Built-in defaults so a bare environment still starts
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("booking.hold_ttl_seconds", 300)?
            .set_default("booking.strict_calendar_sync", false)?
            .set_default("booking.reclaim_interval_seconds", 60)?
            .set_default("booking.max_transaction_retries", 3)?
            .set_default("calendar.failure_threshold", 5)?
            .set_default("calendar.reset_timeout_seconds", 30)?
            .set_default("calendar.request_timeout_seconds", 10)?
            .add_source(config::File::with_name("config/default").required(false))
            // Per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `SLOTWISE_BOOKING__HOLD_TTL_SECONDS=600`
            .add_source(config::Environment::with_prefix("SLOTWISE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
