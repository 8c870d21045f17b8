//! Common test utilities

use ledger_core::db;
use ledger_core::domain::CreateAccountParams;
use ledger_core::{Account, Store};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Advisory lock key serializing schema setup across test binaries
const SCHEMA_LOCK_KEY: i64 = 0x1ed9e5;

/// Connect to the test database and apply the schema
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(12)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .expect("Failed to take schema lock");

    for statement in db::schema_statements() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .expect("Failed to apply schema");
    }

    tx.commit().await.expect("Failed to commit transaction");

    pool
}

/// Create an account with a unique owner and the given opening balance
pub async fn create_account(store: &Store, balance: i64) -> Account {
    let owner = format!("owner-{}", uuid::Uuid::new_v4());
    store
        .create_account(&CreateAccountParams::new(owner, balance, "USD"))
        .await
        .expect("Failed to create account")
}
