#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteRow, Row, SqlitePool};
#[cfg(feature = "database")]
use tracing::info;

#[cfg(feature = "database")]
use crate::gateways::{Gateway, GatewayError, StateStore};
#[cfg(feature = "database")]
use crate::lifecycle::{EntityStateRecord, Location, StateName};

#[cfg(feature = "database")]
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rider_states (
    entity_id TEXT PRIMARY KEY NOT NULL,
    current_state TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    latitude REAL,
    longitude REAL
)
"#;

#[cfg(feature = "database")]
/// Rider state store backed by SQLite
pub struct SqliteStateStore {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl SqliteStateStore {
    /// Open (creating if needed) the database and its table
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        if !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Insert or replace a whole record
    pub async fn put(&self, record: &EntityStateRecord) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO rider_states (entity_id, current_state, timestamp, latitude, longitude)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.entity_id)
        .bind(record.current_state.as_str())
        .bind(record.timestamp)
        .bind(record.location.map(|l| l.latitude))
        .bind(record.location.map(|l| l.longitude))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

// SQLITE_BUSY, SQLITE_LOCKED, SQLITE_IOERR, SQLITE_CANTOPEN
#[cfg(feature = "database")]
const TRANSIENT_PRIMARY_CODES: [i32; 4] = [5, 6, 10, 14];

/// Whether a SQLite result code (primary or extended) clears up on retry
#[cfg(feature = "database")]
fn is_transient_sqlite_code(code: &str) -> bool {
    // Extended codes keep the primary code in the low byte
    code.parse::<i32>()
        .map(|code| TRANSIENT_PRIMARY_CODES.contains(&(code & 0xff)))
        .unwrap_or(false)
}

#[cfg(feature = "database")]
fn store_error(error: sqlx::Error) -> GatewayError {
    match error {
        sqlx::Error::PoolTimedOut => GatewayError::Timeout {
            gateway: Gateway::StateStore,
            timeout_ms: 30_000,
        },
        sqlx::Error::Database(db_err)
            if db_err
                .code()
                .is_some_and(|code| is_transient_sqlite_code(&code)) =>
        {
            GatewayError::unavailable(Gateway::StateStore, db_err.message())
        }
        sqlx::Error::Io(e) => GatewayError::unavailable(Gateway::StateStore, e.to_string()),
        transport @ (sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Tls(_)) => {
            GatewayError::unavailable(Gateway::StateStore, transport.to_string())
        }
        other => GatewayError::rejected(Gateway::StateStore, other.to_string()),
    }
}

#[cfg(feature = "database")]
fn record_from_row(row: &SqliteRow) -> Result<EntityStateRecord, GatewayError> {
    let state: String = row.get("current_state");
    let current_state = state
        .parse::<StateName>()
        .map_err(|e| GatewayError::rejected(Gateway::StateStore, e.to_string()))?;
    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");

    Ok(EntityStateRecord {
        entity_id: row.get("entity_id"),
        current_state,
        timestamp: row.get("timestamp"),
        location: latitude.zip(longitude).map(|(latitude, longitude)| Location {
            latitude,
            longitude,
        }),
    })
}

#[cfg(feature = "database")]
#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, entity_id: &str) -> Result<Option<EntityStateRecord>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT entity_id, current_state, timestamp, latitude, longitude
            FROM rider_states
            WHERE entity_id = ?1
            "#,
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn conditional_update(
        &self,
        entity_id: &str,
        new_state: StateName,
    ) -> Result<(), GatewayError> {
        sqlx::query(
            r#"
            INSERT INTO rider_states (entity_id, current_state, timestamp)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(entity_id) DO UPDATE SET
                current_state = excluded.current_state,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(entity_id)
        .bind(new_state.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}
