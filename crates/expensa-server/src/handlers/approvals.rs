//! Approval handlers for user approvers and admins

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension,
};
use serde::Deserialize;

use crate::{parse_json, respond, ApiResult, AppError, AppState, Identity};
use expensa_core::models::{DecisionAction, Report, ReportDetail};

/// Request body for an approve/reject decision
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    /// Approve: every expense on the report. Reject: the subset being rejected.
    #[serde(default)]
    pub expenses: Vec<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Load a report for review, checking a user approver's visibility
fn load_for_review(
    state: &AppState,
    identity: &Identity,
    id: i64,
) -> Result<ReportDetail, AppError> {
    let detail = state.aggregator().report_detail(id)?;
    if let Ok(user_id) = identity.user_id() {
        if !state.approvals().is_visible_to(user_id, &detail.report)? {
            return Err(AppError::forbidden("Not authorized to review this report"));
        }
    }
    Ok(detail)
}

fn decide(
    state: &AppState,
    identity: &Identity,
    id: i64,
    action: &str,
    body: &[u8],
) -> Result<Report, AppError> {
    let action: DecisionAction = action
        .parse()
        .map_err(|e: String| AppError::bad_request(&e))?;
    let req: DecisionRequest = if body.is_empty() {
        DecisionRequest::default()
    } else {
        parse_json(body)?
    };

    load_for_review(state, identity, id)?;
    let report = state.approvals().decide(
        id,
        action,
        &req.expenses,
        req.reason.as_deref(),
        identity.actor,
    )?;

    state.db.log_audit(
        &identity.audit_name(),
        action.as_str(),
        Some("report"),
        Some(id),
        Some(&format!(
            "report_id={}, status={}, expenses={}",
            report.report_id,
            report.status,
            req.expenses.len()
        )),
    )?;

    Ok(report)
}

/// GET /api/user/approval/:id - Fetch a report for decision (user approver)
pub async fn get_user_approval(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<ReportDetail> {
    identity.user_id()?;
    let detail = load_for_review(&state, &identity, id)?;

    state
        .db
        .log_audit(&identity.audit_name(), "review", Some("report"), Some(id), None)?;

    respond("Report found", detail)
}

/// PUT /api/user/approval/:id/:action - Approve or reject (user approver)
pub async fn decide_as_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((id, action)): Path<(i64, String)>,
    body: Bytes,
) -> ApiResult<Report> {
    identity.user_id()?;
    let report = decide(&state, &identity, id, &action, &body)?;
    respond(format!("Approval {} successfully", report.status), report)
}

/// GET /api/admin/approval/:id - Fetch a report for decision (admin)
pub async fn get_admin_approval(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<ReportDetail> {
    identity.admin_id()?;
    let detail = load_for_review(&state, &identity, id)?;

    state
        .db
        .log_audit(&identity.audit_name(), "review", Some("report"), Some(id), None)?;

    respond("Report found", detail)
}

/// PUT /api/admin/approval/:id/:action - Approve or reject (admin)
pub async fn decide_as_admin(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((id, action)): Path<(i64, String)>,
    body: Bytes,
) -> ApiResult<Report> {
    identity.admin_id()?;
    let report = decide(&state, &identity, id, &action, &body)?;
    respond(format!("Approval {} successfully", report.status), report)
}
