//! tally-core - Core library for Tally
//!
//! This crate contains the expense models and the local-first sync engine that
//! reconciles an on-device ledger with a copy kept as day files in a GitHub
//! repository.

pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod error;
pub mod hash_store;
pub mod ledger;
pub mod merge;
pub mod models;
pub mod remote;
pub mod shard;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Amount, Expense, ExpenseId, PaymentKind, PaymentMethod, SyncedSettings};
pub use sync::{SyncEngine, SyncError, SyncResult};
