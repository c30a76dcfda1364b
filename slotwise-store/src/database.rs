use slotwise_core::StoreError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

const EXCLUSION_VIOLATION: &str = "23P01";
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

pub(crate) const SOURCE_HOLD_CONSTRAINT: &str = "appointments_source_hold_id_key";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Translates PostgreSQL error signatures into the store taxonomy.
pub(crate) fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code();
        match code.as_deref() {
            Some(EXCLUSION_VIOLATION) => return StoreError::ExclusionViolation,
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                return StoreError::SerializationFailure
            }
            Some(UNIQUE_VIOLATION) if db_err.constraint() == Some(SOURCE_HOLD_CONSTRAINT) => {
                return StoreError::DuplicateSourceHold
            }
            _ => {}
        }
    }
    StoreError::Database(err.to_string())
}
