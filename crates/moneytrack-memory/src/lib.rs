//! In-memory storage backend for MoneyTrack.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use rust_decimal::Decimal;
use time::{Date, OffsetDateTime};

use moneytrack_core::{
    Budget, BudgetChanges, Category, CategoryTotal, CategoryType, NewBudget, NewCategory,
    NewTransaction, NewUser, Period, PeriodTotals, RecordId, Session, StorageBackend,
    StorageError, Transaction, TransactionChanges, User,
};

#[derive(Clone)]
struct StoredTransaction {
    id: RecordId,
    user_id: RecordId,
    category_id: RecordId,
    amount: Decimal,
    description: Option<String>,
    date: Date,
    created_at: OffsetDateTime,
}

#[derive(Clone)]
struct StoredBudget {
    id: RecordId,
    user_id: RecordId,
    category_id: RecordId,
    amount: Decimal,
    period: Period,
    created_at: OffsetDateTime,
}

#[derive(Default)]
struct Tables {
    sequence: RecordId,
    users: BTreeMap<RecordId, User>,
    sessions: HashMap<String, Session>,
    categories: BTreeMap<RecordId, Category>,
    transactions: BTreeMap<RecordId, StoredTransaction>,
    budgets: BTreeMap<RecordId, StoredBudget>,
}

impl Tables {
    fn next_id(&mut self) -> RecordId {
        self.sequence += 1;
        self.sequence
    }

    fn category(&self, category_id: RecordId) -> Result<&Category, StorageError> {
        self.categories
            .get(&category_id)
            .ok_or(StorageError::UnknownCategory(category_id))
    }

    fn load_transaction(&self, stored: &StoredTransaction) -> Result<Transaction, StorageError> {
        Ok(Transaction {
            id: stored.id,
            user_id: stored.user_id,
            category: self.category(stored.category_id)?.clone(),
            amount: stored.amount,
            description: stored.description.clone(),
            date: stored.date,
            created_at: stored.created_at,
        })
    }

    fn load_budget(&self, stored: &StoredBudget) -> Result<Budget, StorageError> {
        Ok(Budget {
            id: stored.id,
            user_id: stored.user_id,
            category: self.category(stored.category_id)?.clone(),
            amount: stored.amount,
            period: stored.period,
            created_at: stored.created_at,
        })
    }

    fn owned_transaction(&self, user_id: RecordId, id: RecordId) -> Option<&StoredTransaction> {
        self.transactions.get(&id).filter(|t| t.user_id == user_id)
    }

    fn owned_budget(&self, user_id: RecordId, id: RecordId) -> Option<&StoredBudget> {
        self.budgets.get(&id).filter(|b| b.user_id == user_id)
    }

    fn budget_slot_taken(&self, user_id: RecordId, category_id: RecordId, period: Period, except: Option<RecordId>) -> bool {
        self.budgets.values().any(|b| {
            b.user_id == user_id
                && b.category_id == category_id
                && b.period == period
                && Some(b.id) != except
        })
    }

    fn transactions_in(&self, user_id: RecordId, period: Period) -> impl Iterator<Item = &StoredTransaction> {
        self.transactions
            .values()
            .filter(move |t| t.user_id == user_id && period.contains(t.date))
    }
}

pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables.write().map_err(|_| StorageError::Poisoned)
    }
}

impl StorageBackend for InMemoryStorage {
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StorageError::DuplicateUser("username".to_string()));
        }
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StorageError::DuplicateUser("email".to_string()));
        }
        let id = tables.next_id();
        let created = User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(id, created.clone());
        tracing::debug!(user_id = id, "User created");
        Ok(created)
    }

    fn get_user(&self, user_id: RecordId) -> Result<Option<User>, StorageError> {
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self.read()?.users.values().find(|u| u.username == username).cloned())
    }

    fn delete_user(&self, user_id: RecordId) -> Result<bool, StorageError> {
        let mut tables = self.write()?;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        tables.transactions.retain(|_, t| t.user_id != user_id);
        tables.budgets.retain(|_, b| b.user_id != user_id);
        tables.sessions.retain(|_, s| s.user_id != user_id);
        tracing::debug!(user_id, "User deleted with owned rows");
        Ok(true)
    }

    fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&session.user_id) {
            return Err(StorageError::Other(format!("user not found: {}", session.user_id)));
        }
        tables.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, token: &str) -> Result<Option<Session>, StorageError> {
        Ok(self.read()?.sessions.get(token).cloned())
    }

    fn delete_session(&self, token: &str) -> Result<bool, StorageError> {
        Ok(self.write()?.sessions.remove(token).is_some())
    }

    fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<usize, StorageError> {
        let mut tables = self.write()?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - tables.sessions.len())
    }

    fn seed_categories(&self, defaults: &[NewCategory]) -> Result<usize, StorageError> {
        let mut tables = self.write()?;
        if !tables.categories.is_empty() {
            return Ok(0);
        }
        for category in defaults {
            let id = tables.next_id();
            tables.categories.insert(id, Category {
                id,
                name: category.name.clone(),
                kind: category.kind,
                color: category.color.clone(),
            });
        }
        Ok(defaults.len())
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let mut categories: Vec<Category> = self.read()?.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    fn get_category(&self, category_id: RecordId) -> Result<Option<Category>, StorageError> {
        Ok(self.read()?.categories.get(&category_id).cloned())
    }

    fn create_transaction(&self, user_id: RecordId, txn: &NewTransaction) -> Result<Transaction, StorageError> {
        let mut tables = self.write()?;
        tables.category(txn.category_id)?;
        let id = tables.next_id();
        let stored = StoredTransaction {
            id,
            user_id,
            category_id: txn.category_id,
            amount: txn.amount,
            description: txn.description.clone(),
            date: txn.date,
            created_at: OffsetDateTime::now_utc(),
        };
        let created = tables.load_transaction(&stored)?;
        tables.transactions.insert(id, stored);
        tracing::debug!(user_id, transaction_id = id, "Transaction created");
        Ok(created)
    }

    fn list_transactions(&self, user_id: RecordId) -> Result<Vec<Transaction>, StorageError> {
        let tables = self.read()?;
        let mut result = tables
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .map(|t| tables.load_transaction(t))
            .collect::<Result<Vec<_>, _>>()?;
        result.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        Ok(result)
    }

    fn get_transaction(&self, user_id: RecordId, id: RecordId) -> Result<Option<Transaction>, StorageError> {
        let tables = self.read()?;
        tables
            .owned_transaction(user_id, id)
            .map(|t| tables.load_transaction(t))
            .transpose()
    }

    fn update_transaction(&self, user_id: RecordId, id: RecordId, changes: &TransactionChanges) -> Result<Option<Transaction>, StorageError> {
        let mut tables = self.write()?;
        let Some(mut updated) = tables.owned_transaction(user_id, id).cloned() else {
            return Ok(None);
        };
        if let Some(category_id) = changes.category_id {
            tables.category(category_id)?;
            updated.category_id = category_id;
        }
        if let Some(amount) = changes.amount {
            updated.amount = amount;
        }
        if let Some(description) = &changes.description {
            updated.description = description.clone();
        }
        if let Some(date) = changes.date {
            updated.date = date;
        }
        let result = tables.load_transaction(&updated)?;
        tables.transactions.insert(id, updated);
        tracing::debug!(user_id, transaction_id = id, "Transaction updated");
        Ok(Some(result))
    }

    fn delete_transaction(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError> {
        let mut tables = self.write()?;
        if tables.owned_transaction(user_id, id).is_none() {
            return Ok(false);
        }
        tables.transactions.remove(&id);
        tracing::debug!(user_id, transaction_id = id, "Transaction deleted");
        Ok(true)
    }

    fn create_budget(&self, user_id: RecordId, budget: &NewBudget) -> Result<Budget, StorageError> {
        let mut tables = self.write()?;
        tables.category(budget.category_id)?;
        if tables.budget_slot_taken(user_id, budget.category_id, budget.period, None) {
            return Err(StorageError::DuplicateBudget);
        }
        let id = tables.next_id();
        let stored = StoredBudget {
            id,
            user_id,
            category_id: budget.category_id,
            amount: budget.amount,
            period: budget.period,
            created_at: OffsetDateTime::now_utc(),
        };
        let created = tables.load_budget(&stored)?;
        tables.budgets.insert(id, stored);
        tracing::debug!(user_id, budget_id = id, period = %budget.period, "Budget created");
        Ok(created)
    }

    fn list_budgets(&self, user_id: RecordId, period: Option<Period>) -> Result<Vec<Budget>, StorageError> {
        let tables = self.read()?;
        let mut result = tables
            .budgets
            .values()
            .filter(|b| b.user_id == user_id && period.map_or(true, |p| b.period == p))
            .map(|b| tables.load_budget(b))
            .collect::<Result<Vec<_>, _>>()?;
        result.sort_by(|a, b| {
            b.period
                .cmp(&a.period)
                .then_with(|| a.category.name.cmp(&b.category.name))
        });
        Ok(result)
    }

    fn get_budget(&self, user_id: RecordId, id: RecordId) -> Result<Option<Budget>, StorageError> {
        let tables = self.read()?;
        tables
            .owned_budget(user_id, id)
            .map(|b| tables.load_budget(b))
            .transpose()
    }

    fn update_budget(&self, user_id: RecordId, id: RecordId, changes: &BudgetChanges) -> Result<Option<Budget>, StorageError> {
        let mut tables = self.write()?;
        let Some(mut updated) = tables.owned_budget(user_id, id).cloned() else {
            return Ok(None);
        };
        let period = changes.apply_to(updated.period)?;
        if tables.budget_slot_taken(user_id, updated.category_id, period, Some(id)) {
            return Err(StorageError::DuplicateBudget);
        }
        updated.period = period;
        if let Some(amount) = changes.amount {
            updated.amount = amount;
        }
        let result = tables.load_budget(&updated)?;
        tables.budgets.insert(id, updated);
        tracing::debug!(user_id, budget_id = id, "Budget updated");
        Ok(Some(result))
    }

    fn delete_budget(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError> {
        let mut tables = self.write()?;
        if tables.owned_budget(user_id, id).is_none() {
            return Ok(false);
        }
        tables.budgets.remove(&id);
        tracing::debug!(user_id, budget_id = id, "Budget deleted");
        Ok(true)
    }

    fn period_totals(&self, user_id: RecordId, period: Period) -> Result<PeriodTotals, StorageError> {
        let tables = self.read()?;
        let mut totals = PeriodTotals::default();
        for txn in tables.transactions_in(user_id, period) {
            totals.record(tables.category(txn.category_id)?.kind, txn.amount)?;
        }
        Ok(totals)
    }

    fn expenses_by_category(&self, user_id: RecordId, period: Period) -> Result<Vec<CategoryTotal>, StorageError> {
        let tables = self.read()?;
        let mut sums: BTreeMap<RecordId, Decimal> = BTreeMap::new();
        for txn in tables.transactions_in(user_id, period) {
            if tables.category(txn.category_id)?.kind == CategoryType::Expense {
                let sum = sums.entry(txn.category_id).or_insert(Decimal::ZERO);
                *sum = sum.checked_add(txn.amount).ok_or(StorageError::Overflow)?;
            }
        }
        sums.into_iter()
            .map(|(category_id, amount)| {
                Ok(CategoryTotal {
                    category: tables.category(category_id)?.clone(),
                    amount,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneytrack_core::DEFAULT_CATEGORIES;
    use rust_decimal_macros::dec;
    use time::Month;

    fn seeded() -> (InMemoryStorage, User) {
        let storage = InMemoryStorage::new();
        let defaults: Vec<NewCategory> = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, kind, color)| NewCategory {
                name: name.to_string(),
                kind: *kind,
                color: color.to_string(),
            })
            .collect();
        storage.seed_categories(&defaults).unwrap();
        let user = storage
            .create_user(&NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .unwrap();
        (storage, user)
    }

    fn category_id(storage: &InMemoryStorage, name: &str) -> RecordId {
        storage
            .list_categories()
            .unwrap()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
            .id
    }

    fn march(day: u8) -> Date {
        Date::from_calendar_date(2024, Month::March, day).unwrap()
    }

    #[test]
    fn test_seed_is_idempotent() {
        let (storage, _) = seeded();
        assert_eq!(storage.list_categories().unwrap().len(), 10);
        assert_eq!(storage.seed_categories(&[]).unwrap(), 0);
        assert_eq!(storage.list_categories().unwrap().len(), 10);
    }

    #[test]
    fn test_period_totals() {
        let (storage, user) = seeded();
        let salary = category_id(&storage, "Salary");
        let food = category_id(&storage, "Food & Dining");
        for (category_id, amount, date) in [
            (salary, dec!(100), march(1)),
            (food, dec!(40), march(31)),
            (food, dec!(7), Date::from_calendar_date(2024, Month::April, 1).unwrap()),
        ] {
            storage
                .create_transaction(user.id, &NewTransaction { category_id, amount, description: None, date })
                .unwrap();
        }

        let totals = storage.period_totals(user.id, Period::new(3, 2024).unwrap()).unwrap();
        assert_eq!(totals.income, dec!(100));
        assert_eq!(totals.expenses, dec!(40));
        assert_eq!(totals.transaction_count, 2);

        let by_category = storage.expenses_by_category(user.id, Period::new(3, 2024).unwrap()).unwrap();
        assert_eq!(by_category.len(), 1);
        assert_eq!(by_category[0].category.name, "Food & Dining");
        assert_eq!(by_category[0].amount, dec!(40));
    }

    #[test]
    fn test_unknown_category_writes_nothing() {
        let (storage, user) = seeded();
        let err = storage
            .create_transaction(user.id, &NewTransaction {
                category_id: 9999,
                amount: dec!(1),
                description: None,
                date: march(2),
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownCategory(9999)));
        assert!(storage.list_transactions(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_budget_rejected() {
        let (storage, user) = seeded();
        let food = category_id(&storage, "Food & Dining");
        let budget = NewBudget { category_id: food, amount: dec!(300), period: Period::new(3, 2024).unwrap() };
        storage.create_budget(user.id, &budget).unwrap();
        assert!(matches!(storage.create_budget(user.id, &budget), Err(StorageError::DuplicateBudget)));
        assert_eq!(storage.list_budgets(user.id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_user_cascades() {
        let (storage, user) = seeded();
        let food = category_id(&storage, "Food & Dining");
        storage
            .create_transaction(user.id, &NewTransaction { category_id: food, amount: dec!(5), description: None, date: march(3) })
            .unwrap();
        storage
            .create_budget(user.id, &NewBudget { category_id: food, amount: dec!(50), period: Period::new(3, 2024).unwrap() })
            .unwrap();

        assert!(storage.delete_user(user.id).unwrap());
        assert!(storage.list_transactions(user.id).unwrap().is_empty());
        assert!(storage.list_budgets(user.id, None).unwrap().is_empty());
        assert!(!storage.delete_user(user.id).unwrap());
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let (storage, user) = seeded();
        let food = category_id(&storage, "Food & Dining");
        let huge = Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0);
        for day in [1, 2] {
            storage
                .create_transaction(user.id, &NewTransaction { category_id: food, amount: huge, description: None, date: march(day) })
                .unwrap();
        }

        let period = Period::new(3, 2024).unwrap();
        assert!(matches!(storage.period_totals(user.id, period), Err(StorageError::Overflow)));
        assert!(matches!(storage.expenses_by_category(user.id, period), Err(StorageError::Overflow)));
        // The store stays usable afterwards.
        assert_eq!(storage.list_transactions(user.id).unwrap().len(), 2);
    }

    #[test]
    fn test_purge_expired_sessions() {
        let (storage, user) = seeded();
        let now = OffsetDateTime::now_utc();
        for (token, expires_at) in [
            ("stale", now - time::Duration::hours(1)),
            ("edge", now),
            ("live", now + time::Duration::hours(1)),
        ] {
            storage
                .create_session(&Session {
                    token: token.to_string(),
                    user_id: user.id,
                    created_at: now - time::Duration::hours(2),
                    expires_at,
                })
                .unwrap();
        }

        assert_eq!(storage.purge_expired_sessions(now).unwrap(), 2);
        assert!(storage.get_session("stale").unwrap().is_none());
        assert!(storage.get_session("edge").unwrap().is_none());
        assert!(storage.get_session("live").unwrap().is_some());
        assert_eq!(storage.purge_expired_sessions(now).unwrap(), 0);
    }
}
