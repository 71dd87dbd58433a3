use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use moneytrack_core::{NewUser, Session, StorageBackend, User};

use crate::{
    api::payload::{LoginPayload, RegisterPayload},
    auth::CurrentUser,
    config::AuthConfig,
    error::ApiError,
    password,
};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=80;
const MAX_EMAIL_LEN: usize = 120;

fn required(field: &str, value: Option<String>) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("Missing required field: {}", field)))
}

pub fn register(storage: &dyn StorageBackend, config: &AuthConfig, payload: RegisterPayload) -> Result<User, ApiError> {
    let username = required("username", payload.username)?;
    let email = required("email", payload.email)?.to_lowercase();
    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Validation("Missing required field: password".to_string()))?;

    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ApiError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_LEN.start(),
            USERNAME_LEN.end()
        )));
    }
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    if password.chars().count() < config.min_password_length {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            config.min_password_length
        )));
    }

    let user = storage.create_user(&NewUser {
        username,
        email,
        password_hash: password::hash_password(&password).map_err(|e| ApiError::Internal(e.to_string()))?,
    })?;
    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    Ok(user)
}

pub fn login(storage: &dyn StorageBackend, config: &AuthConfig, payload: LoginPayload, now: OffsetDateTime) -> Result<(Session, User), ApiError> {
    let rejected = || ApiError::Unauthorized("Invalid username or password".to_string());
    let username = required("username", payload.username)?;
    let password = payload.password.unwrap_or_default();

    let user = storage.find_user_by_username(&username)?.ok_or_else(rejected)?;
    if !password::verify_password(&password, &user.password_hash) {
        tracing::warn!(username = %username, "Failed login attempt");
        return Err(rejected());
    }

    let purged = storage.purge_expired_sessions(now)?;
    if purged > 0 {
        tracing::debug!(purged, "Expired sessions removed");
    }

    let expires_at = config
        .session_ttl_hours
        .checked_mul(3600)
        .map(Duration::seconds)
        .and_then(|ttl| now.checked_add(ttl))
        .ok_or_else(|| ApiError::Internal(format!("session lifetime out of range: {} hours", config.session_ttl_hours)))?;
    let session = Session {
        token: Uuid::new_v4().simple().to_string(),
        user_id: user.id,
        created_at: now,
        expires_at,
    };
    storage.create_session(&session)?;
    tracing::info!(user_id = user.id, "User logged in");
    Ok((session, user))
}

pub fn logout(storage: &dyn StorageBackend, user: &CurrentUser, token: &str) -> Result<(), ApiError> {
    storage.delete_session(token)?;
    tracing::info!(user_id = user.id, "User logged out");
    Ok(())
}

pub fn profile(storage: &dyn StorageBackend, user: &CurrentUser) -> Result<User, ApiError> {
    storage
        .get_user(user.id)?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Deletes the account along with every transaction, budget and session it owns.
pub fn delete_account(storage: &dyn StorageBackend, user: &CurrentUser) -> Result<(), ApiError> {
    if !storage.delete_user(user.id)? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    tracing::info!(user_id = user.id, "User deleted");
    Ok(())
}
