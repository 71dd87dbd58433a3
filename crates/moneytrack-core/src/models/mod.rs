use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{util::days_in_year_month, Date, Month};

pub mod read;
pub mod write;

/// Row identifier shared by every table.
pub type RecordId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "income",
            CategoryType::Expense => "expense",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(CategoryType::Income),
            "expense" => Ok(CategoryType::Expense),
            other => Err(format!("unknown category type: {}", other)),
        }
    }
}

/// Shared taxonomy entry. Categories are global, not owned by a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    pub kind: CategoryType,
    pub color: String,
}

pub const DEFAULT_COLOR: &str = "#007bff";

/// Largest amount a single transaction or budget may carry: 1,000,000,000,000.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Categories seeded into an empty store at startup.
pub const DEFAULT_CATEGORIES: &[(&str, CategoryType, &str)] = &[
    ("Salary", CategoryType::Income, "#28a745"),
    ("Freelance", CategoryType::Income, "#20c997"),
    ("Investment", CategoryType::Income, "#17a2b8"),
    ("Food & Dining", CategoryType::Expense, "#dc3545"),
    ("Transportation", CategoryType::Expense, "#fd7e14"),
    ("Entertainment", CategoryType::Expense, "#6f42c1"),
    ("Utilities", CategoryType::Expense, "#ffc107"),
    ("Healthcare", CategoryType::Expense, "#e83e8c"),
    ("Shopping", CategoryType::Expense, "#6c757d"),
    ("Education", CategoryType::Expense, "#007bff"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(i64),
    #[error("year must be between 1 and 9999, got {0}")]
    InvalidYear(i64),
}

/// A calendar month. Covers every date from its first to its last day inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    first: Date,
    last: Date,
}

impl Period {
    pub fn new(month: u8, year: i32) -> Result<Self, PeriodError> {
        if !(1..=9999).contains(&year) {
            return Err(PeriodError::InvalidYear(year as i64));
        }
        let month_value = Month::try_from(month).map_err(|_| PeriodError::InvalidMonth(month as i64))?;
        let first = Date::from_calendar_date(year, month_value, 1)
            .map_err(|_| PeriodError::InvalidMonth(month as i64))?;
        let last = Date::from_calendar_date(year, month_value, days_in_year_month(year, month_value))
            .map_err(|_| PeriodError::InvalidMonth(month as i64))?;
        Ok(Self { first, last })
    }

    /// The period `date` falls in.
    pub fn containing(date: Date) -> Result<Self, PeriodError> {
        Self::new(date.month() as u8, date.year())
    }

    pub fn month(&self) -> u8 {
        self.first.month() as u8
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn first_day(&self) -> Date {
        self.first
    }

    pub fn last_day(&self) -> Date {
        self.last
    }

    pub fn contains(&self, date: Date) -> bool {
        date >= self.first && date <= self.last
    }
}

impl PartialOrd for Period {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Period {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.first.cmp(&other.first)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}
