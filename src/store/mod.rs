//! Store module
//!
//! Persistence layer for the ledger: row operations, the transaction scope
//! and the transfer engine built on top of them.

mod error;
mod queries;
mod transfer;
mod tx;

pub use error::{StoreError, TransferStage};
pub use queries::Queries;
pub use transfer::{ordered_balance_changes, BalanceChange, Role, TransferRequest, TransferResult};

use sqlx::PgPool;

use crate::domain::{
    Account, CreateAccountParams, Entry, ListAccountsParams, ListEntriesParams,
    ListTransfersParams, Transfer, UpdateAccountParams,
};

/// Store provides the row operations over a pool, plus transactions
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Create a new Store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Each call below runs on its own pooled connection, outside any
    // explicit transaction.

    pub async fn create_account(&self, params: &CreateAccountParams) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).create_account(params).await?)
    }

    pub async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).get_account(id).await?)
    }

    pub async fn list_accounts(&self, params: ListAccountsParams) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).list_accounts(params).await?)
    }

    pub async fn update_account(&self, params: UpdateAccountParams) -> Result<Account, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).update_account(params).await?)
    }

    pub async fn delete_account(&self, id: i64) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).delete_account(id).await?)
    }

    pub async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).get_entry(id).await?)
    }

    pub async fn list_entries(&self, params: ListEntriesParams) -> Result<Vec<Entry>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).list_entries(params).await?)
    }

    pub async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).get_transfer(id).await?)
    }

    pub async fn list_transfers(
        &self,
        params: ListTransfersParams,
    ) -> Result<Vec<Transfer>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(Queries::new(&mut conn).list_transfers(params).await?)
    }
}
