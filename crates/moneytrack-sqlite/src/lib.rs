//! SQLite storage backend for MoneyTrack.

use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{Mutex, MutexGuard},
};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use rust_decimal::Decimal;
use time::{Date, Month, OffsetDateTime};

use moneytrack_core::{
    Budget, BudgetChanges, Category, CategoryTotal, CategoryType, NewBudget, NewCategory,
    NewTransaction, NewUser, Period, PeriodTotals, RecordId, Session, StorageBackend,
    StorageError, Transaction, TransactionChanges, User,
};

const TRANSACTION_SELECT: &str = "
    SELECT t.id, t.user_id, t.amount, t.description, t.date, t.created_at,
           c.id, c.name, c.category_type, c.color
    FROM transactions t
    JOIN categories c ON c.id = t.category_id";

const BUDGET_SELECT: &str = "
    SELECT b.id, b.user_id, b.amount, b.month, b.year, b.created_at,
           c.id, c.name, c.category_type, c.color
    FROM budgets b
    JOIN categories c ON c.id = b.category_id";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(other)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(other)?;

        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// A panic while the lock was held leaves the connection usable: any open
    /// `rusqlite::Transaction` rolled back when it was dropped during unwinding.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovering SQLite connection after a panic");
            self.conn.clear_poison();
            poisoned.into_inner()
        })
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                category_type TEXT NOT NULL CHECK (category_type IN ('income', 'expense')),
                color TEXT NOT NULL DEFAULT '#007bff'
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                description TEXT,
                date TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                category_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                month INTEGER NOT NULL CHECK (month BETWEEN 1 AND 12),
                year INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date
                ON transactions(user_id, date);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_budgets_period
                ON budgets(user_id, category_id, month, year);

            CREATE INDEX IF NOT EXISTS idx_sessions_user
                ON sessions(user_id);
            ",
        )
        .map_err(other)?;
        Ok(())
    }
}

fn other(e: impl ToString) -> StorageError {
    StorageError::Other(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

fn date_to_str(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month() as u8, d.day())
}

fn str_to_date(s: &str) -> Result<Date, StorageError> {
    let invalid = || StorageError::Other(format!("invalid stored date: {}", s));
    let mut parts = s.splitn(3, '-');
    let year = parts.next().and_then(|p| p.parse::<i32>().ok()).ok_or_else(invalid)?;
    let month = parts.next().and_then(|p| p.parse::<u8>().ok()).ok_or_else(invalid)?;
    let day = parts.next().and_then(|p| p.parse::<u8>().ok()).ok_or_else(invalid)?;
    let month = Month::try_from(month).map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, day).map_err(|_| invalid())
}

fn str_to_decimal(s: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(s).map_err(|e| StorageError::Other(format!("Invalid decimal: {}", e)))
}

fn from_timestamp(ts: i64) -> Result<OffsetDateTime, StorageError> {
    OffsetDateTime::from_unix_timestamp(ts).map_err(other)
}

fn str_to_category_type(s: &str) -> Result<CategoryType, StorageError> {
    CategoryType::from_str(s).map_err(StorageError::Other)
}

struct CategoryRow {
    id: RecordId,
    name: String,
    kind: String,
    color: String,
}

impl CategoryRow {
    fn read(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            name: row.get(offset + 1)?,
            kind: row.get(offset + 2)?,
            color: row.get(offset + 3)?,
        })
    }

    fn into_category(self) -> Result<Category, StorageError> {
        Ok(Category {
            id: self.id,
            name: self.name,
            kind: str_to_category_type(&self.kind)?,
            color: self.color,
        })
    }
}

struct TransactionRow {
    id: RecordId,
    user_id: RecordId,
    amount: String,
    description: Option<String>,
    date: String,
    created_at: i64,
    category: CategoryRow,
}

impl TransactionRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            description: row.get(3)?,
            date: row.get(4)?,
            created_at: row.get(5)?,
            category: CategoryRow::read(row, 6)?,
        })
    }

    fn into_transaction(self) -> Result<Transaction, StorageError> {
        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            category: self.category.into_category()?,
            amount: str_to_decimal(&self.amount)?,
            description: self.description,
            date: str_to_date(&self.date)?,
            created_at: from_timestamp(self.created_at)?,
        })
    }
}

struct BudgetRow {
    id: RecordId,
    user_id: RecordId,
    amount: String,
    month: i64,
    year: i64,
    created_at: i64,
    category: CategoryRow,
}

impl BudgetRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            month: row.get(3)?,
            year: row.get(4)?,
            created_at: row.get(5)?,
            category: CategoryRow::read(row, 6)?,
        })
    }

    fn into_budget(self) -> Result<Budget, StorageError> {
        let month = u8::try_from(self.month).map_err(other)?;
        let year = i32::try_from(self.year).map_err(other)?;
        Ok(Budget {
            id: self.id,
            user_id: self.user_id,
            category: self.category.into_category()?,
            amount: str_to_decimal(&self.amount)?,
            period: Period::new(month, year)?,
            created_at: from_timestamp(self.created_at)?,
        })
    }
}

struct UserRow {
    id: RecordId,
    username: String,
    email: String,
    password_hash: String,
    created_at: i64,
}

impl UserRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_user(self) -> Result<User, StorageError> {
        Ok(User {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            created_at: from_timestamp(self.created_at)?,
        })
    }
}

fn ensure_category(conn: &Connection, category_id: RecordId) -> Result<(), StorageError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM categories WHERE id = ?1",
            params![category_id],
            |row| row.get(0),
        )
        .map_err(other)?;
    if !exists {
        return Err(StorageError::UnknownCategory(category_id));
    }
    Ok(())
}

fn load_transaction(conn: &Connection, user_id: RecordId, id: RecordId) -> Result<Option<Transaction>, StorageError> {
    let query = format!("{} WHERE t.id = ?1 AND t.user_id = ?2", TRANSACTION_SELECT);
    let row = conn
        .query_row(&query, params![id, user_id], TransactionRow::read)
        .optional()
        .map_err(other)?;
    row.map(TransactionRow::into_transaction).transpose()
}

fn load_budget(conn: &Connection, user_id: RecordId, id: RecordId) -> Result<Option<Budget>, StorageError> {
    let query = format!("{} WHERE b.id = ?1 AND b.user_id = ?2", BUDGET_SELECT);
    let row = conn
        .query_row(&query, params![id, user_id], BudgetRow::read)
        .optional()
        .map_err(other)?;
    row.map(BudgetRow::into_budget).transpose()
}

fn budget_slot_taken(conn: &Connection, user_id: RecordId, category_id: RecordId, period: Period, except: Option<RecordId>) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM budgets
         WHERE user_id = ?1 AND category_id = ?2 AND month = ?3 AND year = ?4
           AND (?5 IS NULL OR id <> ?5)",
        params![user_id, category_id, period.month(), period.year(), except],
        |row| row.get(0),
    )
    .map_err(other)
}

fn budget_write_error(e: rusqlite::Error) -> StorageError {
    if is_constraint_violation(&e) {
        StorageError::DuplicateBudget
    } else {
        other(e)
    }
}

impl StorageBackend for SqliteStorage {
    fn create_user(&self, user: &NewUser) -> Result<User, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        for (column, value) in [("username", &user.username), ("email", &user.email)] {
            let taken: bool = tx
                .query_row(
                    &format!("SELECT COUNT(*) > 0 FROM users WHERE {} = ?1", column),
                    params![value],
                    |row| row.get(0),
                )
                .map_err(other)?;
            if taken {
                return Err(StorageError::DuplicateUser(column.to_string()));
            }
        }
        let now = OffsetDateTime::now_utc();
        tx.execute(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.username, user.email, user.password_hash, now.unix_timestamp()],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::DuplicateUser("username or email".to_string())
            } else {
                other(e)
            }
        })?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(other)?;
        tracing::debug!(user_id = id, "User created");
        Ok(User {
            id,
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            created_at: from_timestamp(now.unix_timestamp())?,
        })
    }

    fn get_user(&self, user_id: RecordId) -> Result<Option<User>, StorageError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE id = ?1",
                params![user_id],
                UserRow::read,
            )
            .optional()
            .map_err(other)?;
        row.map(UserRow::into_user).transpose()
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?1",
                params![username],
                UserRow::read,
            )
            .optional()
            .map_err(other)?;
        row.map(UserRow::into_user).transpose()
    }

    fn delete_user(&self, user_id: RecordId) -> Result<bool, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        let deleted = tx
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .map_err(other)?;
        tx.commit().map_err(other)?;
        if deleted > 0 {
            tracing::debug!(user_id, "User deleted with owned rows");
        }
        Ok(deleted > 0)
    }

    fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token,
                session.user_id,
                session.created_at.unix_timestamp(),
                session.expires_at.unix_timestamp()
            ],
        )
        .map_err(other)?;
        Ok(())
    }

    fn get_session(&self, token: &str) -> Result<Option<Session>, StorageError> {
        let conn = self.conn();
        let row: Option<(String, RecordId, i64, i64)> = conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(other)?;
        row.map(|(token, user_id, created_at, expires_at)| {
            Ok(Session {
                token,
                user_id,
                created_at: from_timestamp(created_at)?,
                expires_at: from_timestamp(expires_at)?,
            })
        })
        .transpose()
    }

    fn delete_session(&self, token: &str) -> Result<bool, StorageError> {
        let conn = self.conn();
        let deleted = conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(other)?;
        Ok(deleted > 0)
    }

    fn purge_expired_sessions(&self, now: OffsetDateTime) -> Result<usize, StorageError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now.unix_timestamp()],
        )
        .map_err(other)
    }

    fn seed_categories(&self, defaults: &[NewCategory]) -> Result<usize, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        let existing: i64 = tx
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .map_err(other)?;
        if existing > 0 {
            return Ok(0);
        }
        for category in defaults {
            tx.execute(
                "INSERT INTO categories (name, category_type, color) VALUES (?1, ?2, ?3)",
                params![category.name, category.kind.as_str(), category.color],
            )
            .map_err(other)?;
        }
        tx.commit().map_err(other)?;
        Ok(defaults.len())
    }

    fn list_categories(&self) -> Result<Vec<Category>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id, name, category_type, color FROM categories ORDER BY category_type DESC, name")
            .map_err(other)?;
        let rows = stmt
            .query_map([], |row| CategoryRow::read(row, 0))
            .map_err(other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(other)?;
        rows.into_iter().map(CategoryRow::into_category).collect()
    }

    fn get_category(&self, category_id: RecordId) -> Result<Option<Category>, StorageError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, name, category_type, color FROM categories WHERE id = ?1",
                params![category_id],
                |row| CategoryRow::read(row, 0),
            )
            .optional()
            .map_err(other)?;
        row.map(CategoryRow::into_category).transpose()
    }

    fn create_transaction(&self, user_id: RecordId, txn: &NewTransaction) -> Result<Transaction, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        ensure_category(&tx, txn.category_id)?;
        tx.execute(
            "INSERT INTO transactions (user_id, category_id, amount, description, date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                txn.category_id,
                txn.amount.to_string(),
                txn.description,
                date_to_str(txn.date),
                OffsetDateTime::now_utc().unix_timestamp()
            ],
        )
        .map_err(other)?;
        let id = tx.last_insert_rowid();
        let created = load_transaction(&tx, user_id, id)?
            .ok_or_else(|| StorageError::Other(format!("transaction {} vanished after insert", id)))?;
        tx.commit().map_err(other)?;
        tracing::debug!(user_id, transaction_id = id, "Transaction created");
        Ok(created)
    }

    fn list_transactions(&self, user_id: RecordId) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn();
        let query = format!("{} WHERE t.user_id = ?1 ORDER BY t.date DESC, t.id DESC", TRANSACTION_SELECT);
        let mut stmt = conn.prepare(&query).map_err(other)?;
        let rows = stmt
            .query_map(params![user_id], TransactionRow::read)
            .map_err(other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(other)?;
        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    fn get_transaction(&self, user_id: RecordId, id: RecordId) -> Result<Option<Transaction>, StorageError> {
        let conn = self.conn();
        load_transaction(&conn, user_id, id)
    }

    fn update_transaction(&self, user_id: RecordId, id: RecordId, changes: &TransactionChanges) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        let Some(current) = load_transaction(&tx, user_id, id)? else {
            return Ok(None);
        };
        let category_id = match changes.category_id {
            Some(category_id) => {
                ensure_category(&tx, category_id)?;
                category_id
            }
            None => current.category.id,
        };
        let description = match &changes.description {
            Some(description) => description.clone(),
            None => current.description,
        };
        tx.execute(
            "UPDATE transactions SET category_id = ?1, amount = ?2, description = ?3, date = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                category_id,
                changes.amount.unwrap_or(current.amount).to_string(),
                description,
                date_to_str(changes.date.unwrap_or(current.date)),
                id,
                user_id
            ],
        )
        .map_err(other)?;
        let updated = load_transaction(&tx, user_id, id)?;
        tx.commit().map_err(other)?;
        tracing::debug!(user_id, transaction_id = id, "Transaction updated");
        Ok(updated)
    }

    fn delete_transaction(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError> {
        let conn = self.conn();
        let deleted = conn
            .execute(
                "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(other)?;
        if deleted > 0 {
            tracing::debug!(user_id, transaction_id = id, "Transaction deleted");
        }
        Ok(deleted > 0)
    }

    fn create_budget(&self, user_id: RecordId, budget: &NewBudget) -> Result<Budget, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        ensure_category(&tx, budget.category_id)?;
        if budget_slot_taken(&tx, user_id, budget.category_id, budget.period, None)? {
            return Err(StorageError::DuplicateBudget);
        }
        tx.execute(
            "INSERT INTO budgets (user_id, category_id, amount, month, year, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                budget.category_id,
                budget.amount.to_string(),
                budget.period.month(),
                budget.period.year(),
                OffsetDateTime::now_utc().unix_timestamp()
            ],
        )
        .map_err(budget_write_error)?;
        let id = tx.last_insert_rowid();
        let created = load_budget(&tx, user_id, id)?
            .ok_or_else(|| StorageError::Other(format!("budget {} vanished after insert", id)))?;
        tx.commit().map_err(other)?;
        tracing::debug!(user_id, budget_id = id, period = %budget.period, "Budget created");
        Ok(created)
    }

    fn list_budgets(&self, user_id: RecordId, period: Option<Period>) -> Result<Vec<Budget>, StorageError> {
        let conn = self.conn();
        let query = format!(
            "{} WHERE b.user_id = ?1 AND (?2 IS NULL OR (b.month = ?2 AND b.year = ?3))
             ORDER BY b.year DESC, b.month DESC, c.name",
            BUDGET_SELECT
        );
        let mut stmt = conn.prepare(&query).map_err(other)?;
        let rows = stmt
            .query_map(
                params![user_id, period.map(|p| p.month()), period.map(|p| p.year())],
                BudgetRow::read,
            )
            .map_err(other)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(other)?;
        rows.into_iter().map(BudgetRow::into_budget).collect()
    }

    fn get_budget(&self, user_id: RecordId, id: RecordId) -> Result<Option<Budget>, StorageError> {
        let conn = self.conn();
        load_budget(&conn, user_id, id)
    }

    fn update_budget(&self, user_id: RecordId, id: RecordId, changes: &BudgetChanges) -> Result<Option<Budget>, StorageError> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(other)?;
        let Some(current) = load_budget(&tx, user_id, id)? else {
            return Ok(None);
        };
        let period = changes.apply_to(current.period)?;
        if budget_slot_taken(&tx, user_id, current.category.id, period, Some(id))? {
            return Err(StorageError::DuplicateBudget);
        }
        tx.execute(
            "UPDATE budgets SET amount = ?1, month = ?2, year = ?3 WHERE id = ?4 AND user_id = ?5",
            params![
                changes.amount.unwrap_or(current.amount).to_string(),
                period.month(),
                period.year(),
                id,
                user_id
            ],
        )
        .map_err(budget_write_error)?;
        let updated = load_budget(&tx, user_id, id)?;
        tx.commit().map_err(other)?;
        tracing::debug!(user_id, budget_id = id, "Budget updated");
        Ok(updated)
    }

    fn delete_budget(&self, user_id: RecordId, id: RecordId) -> Result<bool, StorageError> {
        let conn = self.conn();
        let deleted = conn
            .execute(
                "DELETE FROM budgets WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(other)?;
        if deleted > 0 {
            tracing::debug!(user_id, budget_id = id, "Budget deleted");
        }
        Ok(deleted > 0)
    }

    fn period_totals(&self, user_id: RecordId, period: Period) -> Result<PeriodTotals, StorageError> {
        let rows: Vec<(String, String)> = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(
                    "SELECT c.category_type, t.amount
                     FROM transactions t
                     JOIN categories c ON c.id = t.category_id
                     WHERE t.user_id = ?1 AND t.date >= ?2 AND t.date <= ?3",
                )
                .map_err(other)?;
            let collected = stmt
                .query_map(
                    params![user_id, date_to_str(period.first_day()), date_to_str(period.last_day())],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .map_err(other)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(other)?;
            collected
        };

        let mut totals = PeriodTotals::default();
        for (kind, amount) in rows {
            totals.record(str_to_category_type(&kind)?, str_to_decimal(&amount)?)?;
        }
        Ok(totals)
    }

    fn expenses_by_category(&self, user_id: RecordId, period: Period) -> Result<Vec<CategoryTotal>, StorageError> {
        let rows: Vec<(CategoryRow, String)> = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(
                    "SELECT c.id, c.name, c.category_type, c.color, t.amount
                     FROM transactions t
                     JOIN categories c ON c.id = t.category_id
                     WHERE t.user_id = ?1 AND c.category_type = 'expense'
                       AND t.date >= ?2 AND t.date <= ?3",
                )
                .map_err(other)?;
            let collected = stmt
                .query_map(
                    params![user_id, date_to_str(period.first_day()), date_to_str(period.last_day())],
                    |row| Ok((CategoryRow::read(row, 0)?, row.get::<_, String>(4)?)),
                )
                .map_err(other)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(other)?;
            collected
        };

        let mut totals: BTreeMap<RecordId, CategoryTotal> = BTreeMap::new();
        for (category, amount) in rows {
            let amount = str_to_decimal(&amount)?;
            match totals.get_mut(&category.id) {
                Some(total) => total.add(amount)?,
                None => {
                    let category = category.into_category()?;
                    totals.insert(category.id, CategoryTotal { category, amount });
                }
            }
        }
        Ok(totals.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moneytrack_core::DEFAULT_CATEGORIES;
    use rust_decimal_macros::dec;

    fn seeded(storage: &SqliteStorage) -> User {
        let defaults: Vec<NewCategory> = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, kind, color)| NewCategory {
                name: name.to_string(),
                kind: *kind,
                color: color.to_string(),
            })
            .collect();
        storage.seed_categories(&defaults).unwrap();
        storage
            .create_user(&NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "x".to_string(),
            })
            .unwrap()
    }

    fn category_id(storage: &SqliteStorage, name: &str) -> RecordId {
        storage
            .list_categories()
            .unwrap()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap()
            .id
    }

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    #[test]
    fn test_sqlite_basic_operations() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let salary = category_id(&storage, "Salary");
        let food = category_id(&storage, "Food & Dining");

        storage
            .create_transaction(user.id, &NewTransaction {
                category_id: salary,
                amount: dec!(100),
                description: Some("March pay".to_string()),
                date: date(2024, Month::March, 1),
            })
            .unwrap();
        storage
            .create_transaction(user.id, &NewTransaction {
                category_id: food,
                amount: dec!(40.10),
                description: None,
                date: date(2024, Month::March, 15),
            })
            .unwrap();
        storage
            .create_transaction(user.id, &NewTransaction {
                category_id: food,
                amount: dec!(0.20),
                description: None,
                date: date(2024, Month::March, 31),
            })
            .unwrap();

        let totals = storage.period_totals(user.id, Period::new(3, 2024).unwrap()).unwrap();
        assert_eq!(totals.income, dec!(100));
        assert_eq!(totals.expenses, dec!(40.30));
        assert_eq!(totals.transaction_count, 3);

        let listed = storage.list_transactions(user.id).unwrap();
        assert_eq!(listed[0].date, date(2024, Month::March, 31));
        assert_eq!(listed[2].description.as_deref(), Some("March pay"));
    }

    #[test]
    fn test_sqlite_unknown_category_rolls_back() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);

        let err = storage
            .create_transaction(user.id, &NewTransaction {
                category_id: 4242,
                amount: dec!(5),
                description: None,
                date: date(2024, Month::March, 1),
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownCategory(4242)));
        assert!(storage.list_transactions(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_budget_unique_index() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let food = category_id(&storage, "Food & Dining");

        storage
            .create_budget(user.id, &NewBudget {
                category_id: food,
                amount: dec!(250),
                period: Period::new(3, 2024).unwrap(),
            })
            .unwrap();

        // Bypass the pre-check: the index alone must reject the row.
        let conn = storage.conn().unwrap();
        let err = conn
            .execute(
                "INSERT INTO budgets (user_id, category_id, amount, month, year, created_at)
                 VALUES (?1, ?2, '10', 3, 2024, 0)",
                params![user.id, food],
            )
            .unwrap_err();
        assert!(matches!(budget_write_error(err), StorageError::DuplicateBudget));
    }

    #[test]
    fn test_sqlite_update_budget_into_taken_period() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let food = category_id(&storage, "Food & Dining");

        let march = storage
            .create_budget(user.id, &NewBudget { category_id: food, amount: dec!(250), period: Period::new(3, 2024).unwrap() })
            .unwrap();
        storage
            .create_budget(user.id, &NewBudget { category_id: food, amount: dec!(300), period: Period::new(4, 2024).unwrap() })
            .unwrap();

        let err = storage
            .update_budget(user.id, march.id, &BudgetChanges { month: Some(4), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateBudget));

        let updated = storage
            .update_budget(user.id, march.id, &BudgetChanges { amount: Some(dec!(275)), ..Default::default() })
            .unwrap()
            .unwrap();
        assert_eq!(updated.amount, dec!(275));
        assert_eq!(updated.period, Period::new(3, 2024).unwrap());
    }

    #[test]
    fn test_sqlite_delete_user_cascades() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let food = category_id(&storage, "Food & Dining");
        storage
            .create_transaction(user.id, &NewTransaction {
                category_id: food,
                amount: dec!(12),
                description: None,
                date: date(2024, Month::March, 2),
            })
            .unwrap();
        let now = OffsetDateTime::now_utc();
        storage
            .create_session(&Session {
                token: "t".to_string(),
                user_id: user.id,
                created_at: now,
                expires_at: now + time::Duration::hours(1),
            })
            .unwrap();

        assert!(storage.delete_user(user.id).unwrap());
        assert!(storage.list_transactions(user.id).unwrap().is_empty());
        assert!(storage.get_session("t").unwrap().is_none());
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("moneytrack.db");
        let path = path.to_str().unwrap();

        let user_id = {
            let storage = SqliteStorage::new(path).unwrap();
            seeded(&storage).id
        };

        let storage = SqliteStorage::new(path).unwrap();
        assert_eq!(storage.seed_categories(&[]).unwrap(), 0);
        assert_eq!(storage.list_categories().unwrap().len(), 10);
        assert_eq!(storage.get_user(user_id).unwrap().unwrap().username, "alice");
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let food = category_id(&storage, "Food & Dining");
        let huge = Decimal::from_i128_with_scale(5 * 10i128.pow(28), 0);
        for day in [1, 2] {
            storage
                .create_transaction(user.id, &NewTransaction {
                    category_id: food,
                    amount: huge,
                    description: None,
                    date: date(2024, Month::March, day),
                })
                .unwrap();
        }

        let period = Period::new(3, 2024).unwrap();
        assert!(matches!(storage.period_totals(user.id, period), Err(StorageError::Overflow)));
        assert!(matches!(storage.expenses_by_category(user.id, period), Err(StorageError::Overflow)));
        assert!(!storage.conn.is_poisoned());
        assert_eq!(storage.list_transactions(user.id).unwrap().len(), 2);
    }

    #[test]
    fn test_recovers_from_poisoned_connection() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);

        std::thread::scope(|scope| {
            let result = scope
                .spawn(|| {
                    let _conn = storage.conn.lock().unwrap();
                    panic!("handler panicked while holding the connection");
                })
                .join();
            assert!(result.is_err());
        });
        assert!(storage.conn.is_poisoned());

        assert_eq!(storage.list_categories().unwrap().len(), 10);
        assert_eq!(storage.get_user(user.id).unwrap().unwrap().username, "alice");
        assert!(!storage.conn.is_poisoned());
    }

    #[test]
    fn test_purge_expired_sessions() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let user = seeded(&storage);
        let now = OffsetDateTime::now_utc();
        for (token, expires_at) in [
            ("stale", now - time::Duration::hours(1)),
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

        assert_eq!(storage.purge_expired_sessions(now).unwrap(), 1);
        assert!(storage.get_session("stale").unwrap().is_none());
        assert!(storage.get_session("live").unwrap().is_some());
        assert_eq!(storage.purge_expired_sessions(now).unwrap(), 0);
    }
}
