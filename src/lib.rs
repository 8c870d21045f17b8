//! ledger_core Library
//!
//! Transactional core of a double-entry ledger: accounts, entries and
//! transfers on PostgreSQL, with atomic and deadlock-free transfers.

pub mod config;
pub mod db;
pub mod domain;
pub mod store;

pub use config::{Config, ConfigError, LogFormat};
pub use domain::{Account, Amount, AmountError, Entry, Transfer, TxContext};
pub use store::{Store, StoreError, TransferRequest, TransferResult};
