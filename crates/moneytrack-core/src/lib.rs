//! Core types and traits for MoneyTrack storage backends.
//!
//! This crate provides the `StorageBackend` trait and all associated types,
//! enabling pluggable storage implementations in separate crates.

pub mod models;
pub mod storage;

// Re-export key types at crate root for convenience
pub use models::{Category, CategoryType, Period, PeriodError, RecordId, DEFAULT_CATEGORIES, MAX_AMOUNT};
pub use models::write::{BudgetChanges, NewBudget, NewCategory, NewTransaction, NewUser, TransactionChanges};
pub use models::read::{Budget, CategoryTotal, PeriodTotals, Session, Transaction, User};
pub use storage::{StorageBackend, StorageError};
