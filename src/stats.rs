//! Aggregation over a user's transactions for one calendar month.

use std::collections::HashMap;

use rust_decimal::Decimal;
use time::Date;

use moneytrack_core::{Budget, CategoryTotal, Period, RecordId, StorageBackend, Transaction, User};

use crate::{auth::CurrentUser, error::ApiError};

const RECENT_TRANSACTIONS: usize = 5;

/// Fills in whichever of month/year is missing from `today`.
pub fn resolve_period(month: Option<u8>, year: Option<i32>, today: Date) -> Result<Period, ApiError> {
    Period::new(
        month.unwrap_or(today.month() as u8),
        year.unwrap_or(today.year()),
    )
    .map_err(|e| ApiError::Validation(e.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySummary {
    pub period: Period,
    pub income: Decimal,
    pub expenses: Decimal,
    pub balance: Decimal,
    pub transaction_count: u64,
}

pub fn monthly_summary(storage: &dyn StorageBackend, user: &CurrentUser, period: Period) -> Result<MonthlySummary, ApiError> {
    let totals = storage.period_totals(user.id, period)?;
    Ok(MonthlySummary {
        period,
        income: totals.income,
        expenses: totals.expenses,
        balance: totals.income - totals.expenses,
        transaction_count: totals.transaction_count,
    })
}

/// Largest spending first; ties by category name.
pub fn spending_by_category(storage: &dyn StorageBackend, user: &CurrentUser, period: Period) -> Result<Vec<CategoryTotal>, ApiError> {
    let mut totals = storage.expenses_by_category(user.id, period)?;
    totals.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.category.name.cmp(&b.category.name))
    });
    Ok(totals)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetProgress {
    pub budget: Budget,
    pub spent: Decimal,
    pub remaining: Decimal,
}

pub fn budget_progress(storage: &dyn StorageBackend, user: &CurrentUser, period: Period) -> Result<Vec<BudgetProgress>, ApiError> {
    let spent: HashMap<RecordId, Decimal> = storage
        .expenses_by_category(user.id, period)?
        .into_iter()
        .map(|t| (t.category.id, t.amount))
        .collect();

    Ok(storage
        .list_budgets(user.id, Some(period))?
        .into_iter()
        .map(|budget| {
            let spent = spent.get(&budget.category.id).copied().unwrap_or(Decimal::ZERO);
            BudgetProgress {
                remaining: budget.amount - spent,
                spent,
                budget,
            }
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub user: User,
    pub summary: MonthlySummary,
    pub spending_by_category: Vec<CategoryTotal>,
    pub recent_transactions: Vec<Transaction>,
    pub budgets: Vec<BudgetProgress>,
}

pub fn dashboard(storage: &dyn StorageBackend, user: &CurrentUser, today: Date) -> Result<Dashboard, ApiError> {
    let period = resolve_period(None, None, today)?;
    let profile = storage
        .get_user(user.id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let mut recent = storage.list_transactions(user.id)?;
    recent.truncate(RECENT_TRANSACTIONS);

    Ok(Dashboard {
        user: profile,
        summary: monthly_summary(storage, user, period)?,
        spending_by_category: spending_by_category(storage, user, period)?,
        recent_transactions: recent,
        budgets: budget_progress(storage, user, period)?,
    })
}
