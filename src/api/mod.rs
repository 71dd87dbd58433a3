use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use moneytrack_core::StorageBackend;

use crate::{auth::auth_middleware, config::AuthConfig, telemetry::track_metrics};

pub mod handlers;
pub mod payload;
pub mod views;

/// Everything a handler needs, built once at startup and injected via axum state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageBackend>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageBackend>, auth: AuthConfig) -> Self {
        Self {
            storage,
            auth: Arc::new(auth),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/categories", get(handlers::list_categories))
        .route(
            "/api/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/api/transactions/:id",
            get(handlers::get_transaction)
                .put(handlers::update_transaction)
                .delete(handlers::delete_transaction),
        )
        .route(
            "/api/budgets",
            get(handlers::list_budgets).post(handlers::create_budget),
        )
        .route(
            "/api/budgets/:id",
            get(handlers::get_budget)
                .put(handlers::update_budget)
                .delete(handlers::delete_budget),
        )
        .route("/api/stats/monthly-summary", get(handlers::monthly_summary))
        .route("/api/stats/spending-by-category", get(handlers::spending_by_category))
        .route("/api/stats/budget-progress", get(handlers::budget_progress))
        .route("/api/me", get(handlers::me).delete(handlers::delete_me))
        .route("/dashboard", get(handlers::dashboard))
        .route("/logout", post(handlers::logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .merge(protected)
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}
