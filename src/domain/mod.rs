//! Domain module
//!
//! Core domain types shared by the row store and the transfer engine.

pub mod amount;
pub mod context;
pub mod models;

pub use amount::{Amount, AmountError};
pub use context::TxContext;
pub use models::{
    Account, AddAccountBalanceParams, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Entry, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Transfer, UpdateAccountParams,
};
