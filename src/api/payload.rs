//! Request bodies and query strings, and their conversion into domain commands.
//!
//! Fields arrive as loose JSON values so that missing or malformed input is
//! reported as a validation error naming the field, never as a generic
//! deserialization failure.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use time::{format_description::FormatItem, macros::format_description, Date};

use moneytrack_core::{BudgetChanges, NewBudget, NewTransaction, Period, RecordId, TransactionChanges, MAX_AMOUNT};

use crate::error::ApiError;

pub const MAX_DESCRIPTION_LEN: usize = 200;

/// `YYYY-MM-DD`, used for both request and response dates.
pub const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

fn invalid(field: &str, expected: &str) -> ApiError {
    ApiError::Validation(format!("Invalid {}: expected {}", field, expected))
}

fn require<'a>(field: &str, value: &'a Option<Value>) -> Result<&'a Value, ApiError> {
    match value {
        Some(Value::Null) | None => Err(ApiError::Validation(format!("Missing required field: {}", field))),
        Some(v) => Ok(v),
    }
}

/// Present and non-null.
fn provided(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

fn parse_integer(field: &str, value: &Value) -> Result<i64, ApiError> {
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| invalid(field, "an integer")),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid(field, "an integer")),
        _ => Err(invalid(field, "an integer")),
    }
}

pub fn parse_id(field: &str, value: &Value) -> Result<RecordId, ApiError> {
    parse_integer(field, value)
}

fn parse_decimal_str(s: &str) -> Option<Decimal> {
    let s = s.trim();
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

/// Accepts a JSON number or a numeric string. Amounts must be positive and at most `MAX_AMOUNT`.
pub fn parse_amount(value: &Value) -> Result<Decimal, ApiError> {
    let amount = match value {
        Value::Number(n) => parse_decimal_str(&n.to_string()),
        Value::String(s) => parse_decimal_str(s),
        _ => None,
    }
    .ok_or_else(|| invalid("amount", "a number"))?;

    if amount <= Decimal::ZERO {
        return Err(ApiError::Validation("Invalid amount: must be greater than zero".to_string()));
    }
    if amount > MAX_AMOUNT {
        return Err(ApiError::Validation(format!("Invalid amount: must be at most {}", MAX_AMOUNT)));
    }
    Ok(amount.normalize())
}

pub fn parse_date(value: &Value) -> Result<Date, ApiError> {
    let s = value.as_str().ok_or_else(|| invalid("date", "YYYY-MM-DD"))?;
    Date::parse(s.trim(), DATE_FORMAT)
        .map_err(|_| invalid("date", "YYYY-MM-DD"))
}

pub fn parse_month(value: &Value) -> Result<u8, ApiError> {
    let month = parse_integer("month", value)?;
    u8::try_from(month)
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| invalid("month", "a value between 1 and 12"))
}

pub fn parse_year(value: &Value) -> Result<i32, ApiError> {
    let year = parse_integer("year", value)?;
    i32::try_from(year)
        .ok()
        .filter(|y| (1..=9999).contains(y))
        .ok_or_else(|| invalid("year", "a value between 1 and 9999"))
}

/// Empty or blank descriptions are stored as absent.
pub fn parse_description(value: &Value) -> Result<Option<String>, ApiError> {
    let s = value.as_str().ok_or_else(|| invalid("description", "a string"))?.trim();
    if s.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::Validation(format!(
            "Invalid description: at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(if s.is_empty() { None } else { Some(s.to_string()) })
}

#[derive(Debug, Deserialize, Default)]
pub struct TransactionPayload {
    #[serde(default)]
    pub category_id: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub date: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
}

impl TransactionPayload {
    pub fn into_new(self) -> Result<NewTransaction, ApiError> {
        let category_id = parse_id("category_id", require("category_id", &self.category_id)?)?;
        let amount = parse_amount(require("amount", &self.amount)?)?;
        let date = parse_date(require("date", &self.date)?)?;
        let description = match provided(&self.description) {
            Some(v) => parse_description(v)?,
            None => None,
        };
        Ok(NewTransaction {
            category_id,
            amount,
            description,
            date,
        })
    }

    pub fn into_changes(self) -> Result<TransactionChanges, ApiError> {
        Ok(TransactionChanges {
            category_id: provided(&self.category_id).map(|v| parse_id("category_id", v)).transpose()?,
            amount: provided(&self.amount).map(parse_amount).transpose()?,
            description: provided(&self.description).map(parse_description).transpose()?,
            date: provided(&self.date).map(parse_date).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct BudgetPayload {
    #[serde(default)]
    pub category_id: Option<Value>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub month: Option<Value>,
    #[serde(default)]
    pub year: Option<Value>,
}

impl BudgetPayload {
    pub fn into_new(self) -> Result<NewBudget, ApiError> {
        let category_id = parse_id("category_id", require("category_id", &self.category_id)?)?;
        let amount = parse_amount(require("amount", &self.amount)?)?;
        let month = parse_month(require("month", &self.month)?)?;
        let year = parse_year(require("year", &self.year)?)?;
        let period = Period::new(month, year).map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(NewBudget {
            category_id,
            amount,
            period,
        })
    }

    /// The category of an existing budget is fixed; only amount and period change.
    pub fn into_changes(self) -> Result<BudgetChanges, ApiError> {
        Ok(BudgetChanges {
            amount: provided(&self.amount).map(parse_amount).transpose()?,
            month: provided(&self.month).map(parse_month).transpose()?,
            year: provided(&self.year).map(parse_year).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RegisterPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginPayload {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `?month=&year=`. Blank values count as unspecified.
#[derive(Debug, Deserialize, Default)]
pub struct PeriodQuery {
    pub month: Option<String>,
    pub year: Option<String>,
}

impl PeriodQuery {
    pub fn month(&self) -> Result<Option<u8>, ApiError> {
        match self.month.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_month(&Value::String(s.to_string())).map(Some),
        }
    }

    pub fn year(&self) -> Result<Option<i32>, ApiError> {
        match self.year.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse_year(&Value::String(s.to_string())).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn payload(value: Value) -> TransactionPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_amount_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_amount(&json!(12.5)).unwrap(), dec!(12.5));
        assert_eq!(parse_amount(&json!(40)).unwrap(), dec!(40));
        assert_eq!(parse_amount(&json!(" 7.25 ")).unwrap(), dec!(7.25));
        assert!(parse_amount(&json!("abc")).is_err());
        assert!(parse_amount(&json!(true)).is_err());
        assert!(parse_amount(&json!(0)).is_err());
        assert!(parse_amount(&json!(-3)).is_err());
    }

    #[test]
    fn test_amount_capped() {
        assert_eq!(parse_amount(&json!("1000000000000")).unwrap(), MAX_AMOUNT);
        assert!(parse_amount(&json!("1000000000000.01")).is_err());
        let err = parse_amount(&json!("50000000000000000000000000000")).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_date_must_be_iso() {
        let date = parse_date(&json!("2024-03-15")).unwrap();
        assert_eq!((date.year(), date.month() as u8, date.day()), (2024, 3, 15));
        assert!(parse_date(&json!("15/03/2024")).is_err());
        assert!(parse_date(&json!("2024-02-30")).is_err());
        assert!(parse_date(&json!(20240315)).is_err());
    }

    #[test]
    fn test_new_transaction_reports_missing_field() {
        let err = payload(json!({"amount": 10, "date": "2024-03-01"})).into_new().unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: category_id");

        let err = payload(json!({"category_id": 1, "amount": null, "date": "2024-03-01"})).into_new().unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: amount");
    }

    #[test]
    fn test_partial_changes() {
        let changes = payload(json!({"amount": "9.99"})).into_changes().unwrap();
        assert_eq!(changes.amount, Some(dec!(9.99)));
        assert_eq!(changes.category_id, None);
        assert_eq!(changes.description, None);

        let changes = payload(json!({"description": ""})).into_changes().unwrap();
        assert_eq!(changes.description, Some(None));
    }

    #[test]
    fn test_budget_period_validation() {
        let budget: BudgetPayload = serde_json::from_value(json!({
            "category_id": 4, "amount": 200, "month": 13, "year": 2024
        }))
        .unwrap();
        assert!(budget.into_new().is_err());

        let budget: BudgetPayload = serde_json::from_value(json!({
            "category_id": "4", "amount": 200, "month": "3", "year": 2024
        }))
        .unwrap();
        let budget = budget.into_new().unwrap();
        assert_eq!(budget.category_id, 4);
        assert_eq!(budget.period, Period::new(3, 2024).unwrap());
    }

    #[test]
    fn test_period_query_blank_is_unspecified() {
        let query = PeriodQuery { month: Some("".to_string()), year: Some("2023".to_string()) };
        assert_eq!(query.month().unwrap(), None);
        assert_eq!(query.year().unwrap(), Some(2023));

        let query = PeriodQuery { month: Some("march".to_string()), year: None };
        assert!(query.month().is_err());
    }
}
