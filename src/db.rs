//! Database module
//!
//! Pool construction and schema checks. Migrations themselves are applied
//! by external tooling from the SQL files in migrations/.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Schema file for the ledger tables
pub const SCHEMA_SQL: &str = include_str!("../migrations/001_ledger.sql");

const REQUIRED_TABLES: [&str; 3] = ["accounts", "entries", "transfers"];

/// Create the connection pool described by `config`
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.database_acquire_timeout);

    if let Some(lock_timeout) = config.database_lock_timeout {
        let millis = lock_timeout.as_millis();
        options = options.after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET lock_timeout = {millis}"))
                    .execute(conn)
                    .await
                    .map(|_| ())
            })
        });
    }

    options.connect(&config.database_url).await
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Split the schema file into individual statements
pub fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA_SQL
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
}
