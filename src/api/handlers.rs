use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use time::{Date, OffsetDateTime};

use moneytrack_core::{Period, RecordId};

use crate::{
    auth::{CurrentUser, SessionToken},
    budgets, categories,
    error::ApiError,
    stats, transactions, users,
};

use super::{
    payload::{BudgetPayload, LoginPayload, PeriodQuery, RegisterPayload, TransactionPayload},
    views::{
        BudgetProgressView, BudgetView, CategorySpendingView, CategoryView, DashboardView,
        LoginView, MessageView, MonthlySummaryView, TransactionView, UserView,
    },
    AppState,
};

type ApiResult<T> = Result<T, ApiError>;

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Non-numeric ids cannot name any row.
fn record_id(path: Result<Path<RecordId>, PathRejection>, what: &str) -> ApiResult<RecordId> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::NotFound(format!("{} not found", what)))
}

fn period(query: Result<Query<PeriodQuery>, QueryRejection>) -> ApiResult<Period> {
    let Query(query) = query?;
    stats::resolve_period(query.month()?, query.year()?, today())
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    let Json(payload) = payload?;
    let user = users::register(&*state.storage, &state.auth, payload)?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> ApiResult<Json<LoginView>> {
    let Json(payload) = payload?;
    let (session, user) = users::login(&*state.storage, &state.auth, payload, OffsetDateTime::now_utc())?;
    Ok(Json(LoginView::new(session, user)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> ApiResult<Json<MessageView>> {
    users::logout(&*state.storage, &user, &token)?;
    Ok(Json(MessageView::new("Logged out")))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(users::profile(&*state.storage, &user)?.into()))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<MessageView>> {
    users::delete_account(&*state.storage, &user)?;
    Ok(Json(MessageView::new("Account deleted")))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<DashboardView>> {
    Ok(Json(stats::dashboard(&*state.storage, &user, today())?.into()))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryView>>> {
    let categories = categories::list(&*state.storage)?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<TransactionView>>> {
    let listed = transactions::list(&*state.storage, &user)?;
    Ok(Json(listed.into_iter().map(Into::into).collect()))
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<TransactionPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TransactionView>)> {
    let Json(payload) = payload?;
    let created = transactions::create(&*state.storage, &user, &payload.into_new()?)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
) -> ApiResult<Json<TransactionView>> {
    let id = record_id(id, "Transaction")?;
    Ok(Json(transactions::get(&*state.storage, &user, id)?.into()))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
    payload: Result<Json<TransactionPayload>, JsonRejection>,
) -> ApiResult<Json<TransactionView>> {
    let id = record_id(id, "Transaction")?;
    let Json(payload) = payload?;
    let updated = transactions::update(&*state.storage, &user, id, &payload.into_changes()?)?;
    Ok(Json(updated.into()))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
) -> ApiResult<Json<MessageView>> {
    let id = record_id(id, "Transaction")?;
    transactions::delete(&*state.storage, &user, id)?;
    Ok(Json(MessageView::new("Transaction deleted successfully")))
}

pub async fn list_budgets(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<BudgetView>>> {
    let listed = budgets::list(&*state.storage, &user)?;
    Ok(Json(listed.into_iter().map(Into::into).collect()))
}

pub async fn create_budget(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<BudgetPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BudgetView>)> {
    let Json(payload) = payload?;
    let created = budgets::create(&*state.storage, &user, &payload.into_new()?)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

pub async fn get_budget(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
) -> ApiResult<Json<BudgetView>> {
    let id = record_id(id, "Budget")?;
    Ok(Json(budgets::get(&*state.storage, &user, id)?.into()))
}

pub async fn update_budget(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
    payload: Result<Json<BudgetPayload>, JsonRejection>,
) -> ApiResult<Json<BudgetView>> {
    let id = record_id(id, "Budget")?;
    let Json(payload) = payload?;
    let updated = budgets::update(&*state.storage, &user, id, &payload.into_changes()?)?;
    Ok(Json(updated.into()))
}

pub async fn delete_budget(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    id: Result<Path<RecordId>, PathRejection>,
) -> ApiResult<Json<MessageView>> {
    let id = record_id(id, "Budget")?;
    budgets::delete(&*state.storage, &user, id)?;
    Ok(Json(MessageView::new("Budget deleted successfully")))
}

pub async fn monthly_summary(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> ApiResult<Json<MonthlySummaryView>> {
    let period = period(query)?;
    Ok(Json(stats::monthly_summary(&*state.storage, &user, period)?.into()))
}

pub async fn spending_by_category(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<CategorySpendingView>>> {
    let period = period(query)?;
    let totals = stats::spending_by_category(&*state.storage, &user, period)?;
    Ok(Json(totals.into_iter().map(Into::into).collect()))
}

pub async fn budget_progress(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<BudgetProgressView>>> {
    let period = period(query)?;
    let progress = stats::budget_progress(&*state.storage, &user, period)?;
    Ok(Json(progress.into_iter().map(Into::into).collect()))
}
