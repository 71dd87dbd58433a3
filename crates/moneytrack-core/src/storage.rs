use time::OffsetDateTime;

use crate::models::{
    read::{Budget, CategoryTotal, PeriodTotals, Session, Transaction, User},
    write::{BudgetChanges, NewBudget, NewCategory, NewTransaction, NewUser, TransactionChanges},
    Category, Period, PeriodError, RecordId,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Other(String),
    #[error("category not found: {0}")]
    UnknownCategory(RecordId),
    #[error("a budget for this category and period already exists")]
    DuplicateBudget,
    #[error("{0} is already taken")]
    DuplicateUser(String),
    #[error("invalid period: {0}")]
    InvalidPeriod(#[from] PeriodError),
    #[error("storage lock poisoned")]
    Poisoned,
    #[error("amount total is out of range")]
    Overflow,
}

/// Persistence for users, sessions, categories, transactions and budgets.
///
/// Every transaction and budget operation is scoped by the owning user. Lookups
/// for rows owned by someone else behave exactly like lookups for missing rows
/// (`Ok(None)` / `Ok(false)`). Each mutating call is atomic: either all of its
/// writes land or none do.
pub trait StorageBackend: Send + Sync {
    // Users and sessions
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError>;
    fn get_user(&self, user_id: RecordId) -> Result<Option<User>, StorageError>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;
    /// Removes the user together with their transactions, budgets and sessions.
    fn delete_user(&self, user_id: RecordId) -> Result<bool, StorageError>;
    fn create_session(&self, session: &Session) -> Result<(), StorageError>;
    fn get_session(&self, token: &str) -> Result<Option<Session>, StorageError>;
    fn delete_session(&self, token: &str) -> Result<bool, StorageError>;
    fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<usize, StorageError>;

    // Categories
    /// Inserts `defaults` only when no category exists yet. Returns the number inserted.
    fn seed_categories(&self, defaults: &[NewCategory]) -> Result<usize, StorageError>;
    fn list_categories(&self) -> Result<Vec<Category>, StorageError>;
    fn get_category(&self, category_id: RecordId) -> Result<Option<Category>, StorageError>;

    // Transactions
    fn create_transaction(&self, user_id: RecordId, txn: &NewTransaction) -> Result<Transaction, StorageError>;
    /// Newest date first.
    fn list_transactions(&self, user_id: RecordId) -> Result<Vec<Transaction>, StorageError>;
    fn get_transaction(&self, user_id: RecordId, id: RecordId) -> Result<Option<Transaction>, StorageError>;
    fn update_transaction(&self, user_id: RecordId, id: RecordId, changes: &TransactionChanges) -> Result<Option<Transaction>, StorageError>;
    fn delete_transaction(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError>;

    // Budgets
    fn create_budget(&self, user_id: RecordId, budget: &NewBudget) -> Result<Budget, StorageError>;
    fn list_budgets(&self, user_id: RecordId, period: Option<Period>) -> Result<Vec<Budget>, StorageError>;
    fn get_budget(&self, user_id: RecordId, id: RecordId) -> Result<Option<Budget>, StorageError>;
    fn update_budget(&self, user_id: RecordId, id: RecordId, changes: &BudgetChanges) -> Result<Option<Budget>, StorageError>;
    fn delete_budget(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError>;

    // Aggregates
    fn period_totals(&self, user_id: RecordId, period: Period) -> Result<PeriodTotals, StorageError>;
    /// Expense totals grouped by category. Categories without spending are absent.
    fn expenses_by_category(&self, user_id: RecordId, period: Period) -> Result<Vec<CategoryTotal>, StorageError>;
}
