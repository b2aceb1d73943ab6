//! Data models for Tally

mod expense;
mod settings;

pub use expense::{Amount, Expense, ExpenseId, PaymentKind, PaymentMethod};
pub use settings::SyncedSettings;
