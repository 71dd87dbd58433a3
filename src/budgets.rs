use moneytrack_core::{Budget, BudgetChanges, NewBudget, RecordId, StorageBackend};

use crate::{auth::CurrentUser, error::ApiError};

fn not_found() -> ApiError {
    ApiError::NotFound("Budget not found".to_string())
}

pub fn create(storage: &dyn StorageBackend, user: &CurrentUser, budget: &NewBudget) -> Result<Budget, ApiError> {
    let created = storage.create_budget(user.id, budget)?;
    tracing::info!(user_id = user.id, budget_id = created.id, period = %created.period, "Budget set");
    Ok(created)
}

pub fn list(storage: &dyn StorageBackend, user: &CurrentUser) -> Result<Vec<Budget>, ApiError> {
    Ok(storage.list_budgets(user.id, None)?)
}

pub fn get(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId) -> Result<Budget, ApiError> {
    storage.get_budget(user.id, id)?.ok_or_else(not_found)
}

pub fn update(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId, changes: &BudgetChanges) -> Result<Budget, ApiError> {
    storage.update_budget(user.id, id, changes)?.ok_or_else(not_found)
}

pub fn delete(storage: &dyn StorageBackend, user: &CurrentUser, id: RecordId) -> Result<(), ApiError> {
    if !storage.delete_budget(user.id, id)? {
        return Err(not_found());
    }
    Ok(())
}
