use moneytrack_core::{Category, NewCategory, StorageBackend, DEFAULT_CATEGORIES};

use crate::error::ApiError;

pub fn default_categories() -> Vec<NewCategory> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, kind, color)| NewCategory {
            name: name.to_string(),
            kind: *kind,
            color: color.to_string(),
        })
        .collect()
}

/// Seeds the default categories into an empty store. Returns how many were inserted.
pub fn seed_defaults(storage: &dyn StorageBackend) -> Result<usize, ApiError> {
    Ok(storage.seed_categories(&default_categories())?)
}

pub fn list(storage: &dyn StorageBackend) -> Result<Vec<Category>, ApiError> {
    Ok(storage.list_categories()?)
}
