//! Expense ledger handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension,
};

use crate::{parse_json, respond, ApiResult, AppState, Identity};
use expensa_core::models::{Expense, NewExpense};

/// POST /api/user/expense - Record a draft expense
pub async fn create_expense(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> ApiResult<Expense> {
    let user_id = identity.user_id()?;
    let req: NewExpense = parse_json(&body)?;

    let expense = state.ledger().create_expense(user_id, &req)?;

    // Audit log
    state.db.log_audit(
        &identity.audit_name(),
        "create",
        Some("expense"),
        Some(expense.id),
        Some(&format!("amount={}, category={}", expense.amount, expense.category)),
    )?;

    respond("Expense created successfully", expense)
}

/// GET /api/user/expense/:id - Get one of the caller's expenses
pub async fn get_expense(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Expense> {
    let user_id = identity.user_id()?;

    let expense = state.ledger().get_expense(user_id, id)?;

    state
        .db
        .log_audit(&identity.audit_name(), "get", Some("expense"), Some(id), None)?;

    respond("Expense found", expense)
}
