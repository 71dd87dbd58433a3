use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

use super::{Category, CategoryType, Period, RecordId};
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user_id: RecordId,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// A stored transaction joined with its category.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: RecordId,
    pub user_id: RecordId,
    pub category: Category,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: Date,
    pub created_at: OffsetDateTime,
}

/// A stored budget joined with its category.
#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    pub id: RecordId,
    pub user_id: RecordId,
    pub category: Category,
    pub amount: Decimal,
    pub period: Period,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeriodTotals {
    pub income: Decimal,
    pub expenses: Decimal,
    pub transaction_count: u64,
}

impl PeriodTotals {
    /// Counts one transaction into the matching side.
    pub fn record(&mut self, kind: CategoryType, amount: Decimal) -> Result<(), StorageError> {
        let side = match kind {
            CategoryType::Income => &mut self.income,
            CategoryType::Expense => &mut self.expenses,
        };
        *side = side.checked_add(amount).ok_or(StorageError::Overflow)?;
        self.transaction_count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category: Category,
    pub amount: Decimal,
}

impl CategoryTotal {
    pub fn add(&mut self, amount: Decimal) -> Result<(), StorageError> {
        self.amount = self.amount.checked_add(amount).ok_or(StorageError::Overflow)?;
        Ok(())
    }
}
