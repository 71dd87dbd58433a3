use rust_decimal::Decimal;
use time::Date;

use super::{CategoryType, Period, PeriodError, RecordId};

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryType,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub category_id: RecordId,
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: Date,
}

/// Partial update. `None` leaves the stored value untouched; for `description`,
/// `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionChanges {
    pub category_id: Option<RecordId>,
    pub amount: Option<Decimal>,
    pub description: Option<Option<String>>,
    pub date: Option<Date>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBudget {
    pub category_id: RecordId,
    pub amount: Decimal,
    pub period: Period,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BudgetChanges {
    pub amount: Option<Decimal>,
    pub month: Option<u8>,
    pub year: Option<i32>,
}

impl BudgetChanges {
    /// Resolves the period a budget moves to; month and year change independently.
    pub fn apply_to(&self, current: Period) -> Result<Period, PeriodError> {
        Period::new(
            self.month.unwrap_or_else(|| current.month()),
            self.year.unwrap_or_else(|| current.year()),
        )
    }
}
