//! Transfer Engine
//!
//! Moves money between two accounts in one transaction: a transfer record,
//! two balancing entries and two balance adjustments.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::domain::{
    Account, AddAccountBalanceParams, Amount, CreateEntryParams, CreateTransferParams, Entry,
    Transfer, TxContext,
};

use super::{Queries, Store, StoreError, TransferStage};

/// Input parameters of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: i64,
    pub to_account_id: i64,
    pub amount: Amount,
}

impl TransferRequest {
    pub fn new(from_account_id: i64, to_account_id: i64, amount: Amount) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount,
        }
    }

    pub fn is_self_transfer(&self) -> bool {
        self.from_account_id == self.to_account_id
    }
}

/// Rows produced by a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: Transfer,
    pub from_account: Account,
    pub to_account: Account,
    pub from_entry: Entry,
    pub to_entry: Entry,
}

/// Side of the transfer a balance change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    From,
    To,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub account_id: i64,
    pub delta: i64,
    pub role: Role,
}

/// The two balance changes of `request`, in row lock acquisition order.
///
/// The lower account id always comes first, whichever side it is on, so
/// two transfers between the same pair of accounts lock the rows in the
/// same order and cannot wait on each other in a cycle. For a
/// self-transfer the debit comes first.
pub fn ordered_balance_changes(request: &TransferRequest) -> [BalanceChange; 2] {
    let debit = BalanceChange {
        account_id: request.from_account_id,
        delta: request.amount.debit(),
        role: Role::From,
    };
    let credit = BalanceChange {
        account_id: request.to_account_id,
        delta: request.amount.credit(),
        role: Role::To,
    };

    if credit.account_id < debit.account_id {
        [credit, debit]
    } else {
        [debit, credit]
    }
}

impl Store {
    /// Perform a money transfer from one account to the other.
    ///
    /// Creates the transfer record, adds both account entries and updates
    /// both balances within a single database transaction. Errors name the
    /// step that failed; nothing is retried here.
    pub async fn transfer(
        &self,
        ctx: &TxContext,
        request: TransferRequest,
    ) -> Result<TransferResult, StoreError> {
        let span = tracing::info_span!(
            "transfer_tx",
            tx = ctx.label(),
            from = request.from_account_id,
            to = request.to_account_id,
            amount = request.amount.value(),
        );

        async move {
            let result = self
                .exec_tx(ctx, move |q| Box::pin(transfer_in_tx(q, request)))
                .await?;

            tracing::debug!(transfer_id = result.transfer.id, "transfer committed");
            Ok(result)
        }
        .instrument(span)
        .await
    }
}

async fn transfer_in_tx(
    q: &mut Queries<'_>,
    request: TransferRequest,
) -> Result<TransferResult, StoreError> {
    let transfer = q
        .create_transfer(CreateTransferParams {
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            amount: request.amount.value(),
        })
        .await
        .map_err(|e| stage_failed(TransferStage::CreateTransfer, e))?;

    let from_entry = q
        .create_entry(CreateEntryParams {
            account_id: request.from_account_id,
            amount: request.amount.debit(),
        })
        .await
        .map_err(|e| stage_failed(TransferStage::CreateFromEntry, e))?;

    let to_entry = q
        .create_entry(CreateEntryParams {
            account_id: request.to_account_id,
            amount: request.amount.credit(),
        })
        .await
        .map_err(|e| stage_failed(TransferStage::CreateToEntry, e))?;

    let [first, second] = ordered_balance_changes(&request);
    let first_account = apply_balance_change(q, first).await?;
    let second_account = apply_balance_change(q, second).await?;

    let (mut from_account, to_account) = match first.role {
        Role::From => (first_account, second_account),
        Role::To => (second_account, first_account),
    };

    // Both adjustments hit the same row; report the committed state on
    // both sides rather than the intermediate debit.
    if request.is_self_transfer() {
        from_account = to_account.clone();
    }

    Ok(TransferResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}

async fn apply_balance_change(
    q: &mut Queries<'_>,
    change: BalanceChange,
) -> Result<Account, StoreError> {
    q.add_account_balance(AddAccountBalanceParams {
        id: change.account_id,
        amount: change.delta,
    })
    .await
    .map_err(|e| stage_failed(TransferStage::UpdateBalance, e))
}

fn stage_failed(stage: TransferStage, source: sqlx::Error) -> StoreError {
    tracing::warn!(stage = stage.as_str(), error = %source, "transfer step failed");
    StoreError::stage(stage, source)
}
