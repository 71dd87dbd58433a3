//! JSON response shapes.

use rust_decimal::Decimal;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use moneytrack_core::{Budget, Category, CategoryTotal, CategoryType, RecordId, Session, Transaction, User};

use super::payload::DATE_FORMAT;
use crate::stats::{BudgetProgress, Dashboard, MonthlySummary};

pub fn format_date(d: Date) -> String {
    d.format(DATE_FORMAT).unwrap_or_else(|_| d.to_string())
}

pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub message: String,
}

impl MessageView {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    pub id: RecordId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryType,
    pub color: String,
}

impl From<Category> for CategoryView {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            kind: c.kind,
            color: c.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: RecordId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: Option<String>,
    pub date: String,
    pub category_id: RecordId,
    pub category_name: String,
    pub category_type: CategoryType,
    pub category_color: String,
}

impl From<Transaction> for TransactionView {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            amount: t.amount,
            description: t.description,
            date: format_date(t.date),
            category_id: t.category.id,
            category_name: t.category.name,
            category_type: t.category.kind,
            category_color: t.category.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetView {
    pub id: RecordId,
    pub category_id: RecordId,
    pub category_name: String,
    pub category_color: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub month: u8,
    pub year: i32,
}

impl From<Budget> for BudgetView {
    fn from(b: Budget) -> Self {
        Self {
            id: b.id,
            category_id: b.category.id,
            category_name: b.category.name,
            category_color: b.category.color,
            amount: b.amount,
            month: b.period.month(),
            year: b.period.year(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MonthlySummaryView {
    pub month: u8,
    pub year: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub income: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub expenses: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub transaction_count: u64,
}

impl From<MonthlySummary> for MonthlySummaryView {
    fn from(s: MonthlySummary) -> Self {
        Self {
            month: s.period.month(),
            year: s.period.year(),
            income: s.income,
            expenses: s.expenses,
            balance: s.balance,
            transaction_count: s.transaction_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CategorySpendingView {
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub color: String,
}

impl From<CategoryTotal> for CategorySpendingView {
    fn from(t: CategoryTotal) -> Self {
        Self {
            category: t.category.name,
            amount: t.amount,
            color: t.category.color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetProgressView {
    pub budget_id: RecordId,
    pub category: String,
    pub color: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub budgeted: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub spent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
}

impl From<BudgetProgress> for BudgetProgressView {
    fn from(p: BudgetProgress) -> Self {
        Self {
            budget_id: p.budget.id,
            category: p.budget.category.name,
            color: p.budget.category.color,
            budgeted: p.budget.amount,
            spent: p.spent,
            remaining: p.remaining,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            created_at: format_timestamp(u.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginView {
    pub token: String,
    pub expires_at: String,
    pub user: UserView,
}

impl LoginView {
    pub fn new(session: Session, user: User) -> Self {
        Self {
            token: session.token,
            expires_at: format_timestamp(session.expires_at),
            user: user.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub user: UserView,
    pub summary: MonthlySummaryView,
    pub spending_by_category: Vec<CategorySpendingView>,
    pub recent_transactions: Vec<TransactionView>,
    pub budgets: Vec<BudgetProgressView>,
}

impl From<Dashboard> for DashboardView {
    fn from(d: Dashboard) -> Self {
        Self {
            user: d.user.into(),
            summary: d.summary.into(),
            spending_by_category: d.spending_by_category.into_iter().map(Into::into).collect(),
            recent_transactions: d.recent_transactions.into_iter().map(Into::into).collect(),
            budgets: d.budgets.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::payload::parse_date;
    use serde_json::json;
    use time::Month;

    #[test]
    fn test_format_date_matches_request_format() {
        let date = Date::from_calendar_date(2024, Month::March, 5).unwrap();
        assert_eq!(format_date(date), "2024-03-05");

        let early = Date::from_calendar_date(987, Month::December, 31).unwrap();
        assert_eq!(format_date(early), "0987-12-31");
        assert_eq!(parse_date(&json!(format_date(early))).unwrap(), early);
    }
}
