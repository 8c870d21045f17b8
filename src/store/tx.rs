//! Transaction Scope
//!
//! Runs a unit of work inside one database transaction.

use futures::future::BoxFuture;
use sqlx::{Connection, PgConnection};

use crate::domain::TxContext;

use super::{Queries, Store, StoreError};

impl Store {
    /// Execute `unit` within a database transaction.
    ///
    /// Commits when `unit` returns `Ok`, rolls back when it returns `Err` or
    /// when the context is cancelled. A failed rollback is reported together
    /// with the error that triggered it.
    ///
    /// ```no_run
    /// # async fn demo(store: ledger_core::store::Store) -> Result<(), ledger_core::store::StoreError> {
    /// use ledger_core::domain::{CreateEntryParams, TxContext};
    /// use ledger_core::store::StoreError;
    ///
    /// let entry = store
    ///     .exec_tx(&TxContext::new(), |q| {
    ///         Box::pin(async move {
    ///             q.create_entry(CreateEntryParams { account_id: 1, amount: 10 })
    ///                 .await
    ///                 .map_err(StoreError::from)
    ///         })
    ///     })
    ///     .await?;
    /// # let _ = entry;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn exec_tx<T, F>(&self, ctx: &TxContext, unit: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut Queries<'_>) -> BoxFuture<'c, Result<T, StoreError>> + Send,
    {
        let mut tx = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(StoreError::Cancelled),
            tx = self.pool.begin() => tx?,
        };
        let backend_pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
            .fetch_one(&mut *tx)
            .await?;
        tracing::debug!(tx = ctx.label(), correlation_id = ?ctx.correlation_id, backend_pid, "begin");

        let outcome = {
            let mut queries = Queries::new(&mut *tx);
            tokio::select! {
                biased;
                _ = ctx.cancelled() => None,
                result = unit(&mut queries) => Some(result),
            }
        };

        let outcome = match outcome {
            Some(result) => result,
            None => {
                // The dropped statement may still be running server-side
                // (e.g. waiting on a row lock); stop it so the rollback
                // below does not wait for it.
                if let Err(e) = self.cancel_backend(backend_pid).await {
                    tracing::warn!(tx = ctx.label(), backend_pid, error = %e, "cancel request failed");
                }
                Err(StoreError::Cancelled)
            }
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.map_err(StoreError::Commit)?;
                tracing::debug!(tx = ctx.label(), "commit");
                Ok(value)
            }
            Err(err) => {
                if let Err(rb_err) = tx.rollback().await {
                    tracing::error!(tx = ctx.label(), error = %err, rollback_error = %rb_err, "rollback failed");
                    return Err(StoreError::Rollback {
                        source: Box::new(err),
                        rollback: rb_err,
                    });
                }
                tracing::debug!(tx = ctx.label(), error = %err, "rollback");
                Err(err)
            }
        }
    }

    /// Ask the server to abort whatever statement `backend_pid` is running.
    /// Uses its own connection so it works even when the pool is exhausted
    /// by transactions stuck behind the same lock.
    async fn cancel_backend(&self, backend_pid: i32) -> Result<(), sqlx::Error> {
        let options = self.pool.connect_options();
        let mut conn = PgConnection::connect_with(&*options).await?;

        sqlx::query("SELECT pg_cancel_backend($1)")
            .bind(backend_pid)
            .execute(&mut conn)
            .await?;

        conn.close().await
    }
}
