use moneytrack_core::{NewTransaction, RecordId, StorageBackend, Transaction, TransactionChanges};

use crate::{auth::CurrentUser, error::ApiError};

fn not_found() -> ApiError {
    ApiError::NotFound("Transaction not found".to_string())
}

pub fn create(storage: &dyn StorageBackend, user: &CurrentUser, txn: &NewTransaction) -> Result<Transaction, ApiError> {
    let created = storage.create_transaction(user.id, txn)?;
    tracing::info!(user_id = user.id, transaction_id = created.id, "Transaction recorded");
    Ok(created)
}

pub fn list(storage: &dyn StorageBackend, user: &CurrentUser) -> Result<Vec<Transaction>, ApiError> {
    Ok(storage.list_transactions(user.id)?)
}

pub fn get(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId) -> Result<Transaction, ApiError> {
    storage.get_transaction(user.id, id)?.ok_or_else(not_found)
}

pub fn update(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId, changes: &TransactionChanges) -> Result<Transaction, ApiError> {
    storage.update_transaction(user.id, id, changes)?.ok_or_else(not_found)
}

pub fn delete(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId) -> Result<(), ApiError> {
    if !storage.delete_transaction(user.id, id)? {
        return Err(not_found());
    }
    Ok(())
}
