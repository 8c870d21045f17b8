//! Row Store
//!
//! Single-statement operations on the ledger tables. `Queries` borrows one
//! Postgres connection: either a pooled connection or the connection of an
//! open transaction, in which case every call joins that transaction.

use sqlx::PgConnection;

use crate::domain::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, country_code, created_at";

/// Row operations bound to one connection
pub struct Queries<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> Queries<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub async fn create_account(
        &mut self,
        params: &CreateAccountParams,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency, country_code)
            VALUES ($1, $2, $3, $4)
            RETURNING id, owner, balance, currency, country_code, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .bind(&params.country_code)
        .fetch_one(&mut *self.conn)
        .await
    }

    pub async fn get_account(&mut self, id: i64) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// Read an account and hold its row lock until the enclosing transaction
    /// ends. `NO KEY UPDATE` leaves the key lock free so concurrent inserts
    /// of entries/transfers referencing the account are not blocked.
    pub async fn get_account_for_update(&mut self, id: i64) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 LIMIT 1 FOR NO KEY UPDATE"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await
    }

    pub async fn list_accounts(
        &mut self,
        params: ListAccountsParams,
    ) -> Result<Vec<Account>, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Overwrite the stored balance
    pub async fn update_account(
        &mut self,
        params: UpdateAccountParams,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.balance)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// Add a signed delta to the stored balance and return the new row.
    /// A single statement, so the row lock is taken and released by the
    /// database with no read-modify-write window.
    pub async fn add_account_balance(
        &mut self,
        params: AddAccountBalanceParams,
    ) -> Result<Account, sqlx::Error> {
        sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET balance = balance + $1 WHERE id = $2 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(params.amount)
        .bind(params.id)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// Returns the number of deleted rows (0 or 1)
    pub async fn delete_account(&mut self, id: i64) -> Result<u64, sqlx::Error> {
        let rows_affected = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    // =========================================================================
    // Entries
    // =========================================================================

    pub async fn create_entry(&mut self, params: CreateEntryParams) -> Result<Entry, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(params.account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.conn)
        .await
    }

    pub async fn get_entry(&mut self, id: i64) -> Result<Entry, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            "SELECT id, account_id, amount, created_at FROM entries WHERE id = $1 LIMIT 1",
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await
    }

    pub async fn list_entries(
        &mut self,
        params: ListEntriesParams,
    ) -> Result<Vec<Entry>, sqlx::Error> {
        sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(params.account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    pub async fn create_transfer(
        &mut self,
        params: CreateTransferParams,
    ) -> Result<Transfer, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.conn)
        .await
    }

    pub async fn get_transfer(&mut self, id: i64) -> Result<Transfer, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at FROM transfers
            WHERE id = $1 LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// Transfers from one account to the other, in that direction only
    pub async fn list_transfers(
        &mut self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, sqlx::Error> {
        sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at FROM transfers
            WHERE from_account_id = $1 AND to_account_id = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(params.from_account_id)
        .bind(params.to_account_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(&mut *self.conn)
        .await
    }
}
