use axum::{
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::OffsetDateTime;

use moneytrack_core::RecordId;

use crate::{api::AppState, error::ApiError};

pub const SESSION_HEADER: &str = "X-Session-Token";

/// Authenticated caller identity, available to handlers via request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: RecordId,
    pub username: String,
}

/// Raw session token presented with the request.
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .or_else(|| headers.get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
}

fn resolve(state: &AppState, token: &str) -> Result<CurrentUser, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid or expired session".to_string());

    let session = state.storage.get_session(token)?.ok_or_else(invalid)?;
    if session.is_expired(OffsetDateTime::now_utc()) {
        state.storage.delete_session(token)?;
        tracing::debug!(user_id = session.user_id, "Expired session rejected");
        return Err(invalid());
    }

    let user = state.storage.get_user(session.user_id)?.ok_or_else(invalid)?;
    Ok(CurrentUser {
        id: user.id,
        username: user.username,
    })
}

pub async fn auth_middleware<B>(
    State(state): State<AppState>,
    mut req: Request<B>,
    next: Next<B>,
) -> Response {
    let token = match session_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            return ApiError::Unauthorized(format!(
                "Missing session. Provide {} header or Authorization: Bearer <token>",
                SESSION_HEADER
            ))
            .into_response();
        }
    };

    match resolve(&state, &token) {
        Ok(user) => {
            tracing::debug!(user_id = user.id, username = %user.username, "Authenticated request");
            req.extensions_mut().insert(user);
            req.extensions_mut().insert(SessionToken(token));
            next.run(req).await
        }
        Err(e) => {
            if matches!(e, ApiError::Unauthorized(_)) {
                tracing::warn!("Invalid session token presented");
            }
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(session_token(&headers), Some("abc"));

        headers.insert(SESSION_HEADER, HeaderValue::from_static("xyz"));
        assert_eq!(session_token(&headers), Some("xyz"));
    }

    #[test]
    fn test_blank_token_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(session_token(&headers), None);
    }
}
