//! Reimbursement handlers
//!
//! Finance-role checks happen upstream; the role id, when present, lands in the audit log.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension,
};
use serde::Deserialize;

use crate::{parse_json, respond, ApiResult, AppError, AppState, Identity};
use expensa_core::models::{Report, ReportDetail};

/// Request body for reimbursement
#[derive(Debug, Default, Deserialize)]
pub struct ReimburseRequest {
    /// Finance note (payment reference)
    #[serde(default)]
    pub description_finance: Option<String>,
}

fn load_for_finance(state: &AppState, identity: &Identity, id: i64) -> Result<ReportDetail, AppError> {
    let detail = state.aggregator().report_detail(id)?;
    state.db.log_audit(
        &identity.audit_name(),
        "finance_view",
        Some("report"),
        Some(id),
        None,
    )?;
    Ok(detail)
}

fn reimburse(
    state: &AppState,
    identity: &Identity,
    id: i64,
    body: &[u8],
) -> Result<Report, AppError> {
    let req: ReimburseRequest = if body.is_empty() {
        ReimburseRequest::default()
    } else {
        parse_json(body)?
    };

    let report = state
        .approvals()
        .reimburse(id, identity.actor, req.description_finance.as_deref())?;

    state.db.log_audit(
        &identity.audit_name(),
        "reimburse",
        Some("report"),
        Some(id),
        Some(&format!("report_id={}", report.report_id)),
    )?;

    Ok(report)
}

/// GET /api/user/finance/:id - Fetch a report for reimbursement (finance user)
pub async fn get_finance_as_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<ReportDetail> {
    identity.user_id()?;
    respond("Report found", load_for_finance(&state, &identity, id)?)
}

/// GET /api/admin/finance/:id - Fetch a report for reimbursement (admin)
pub async fn get_finance_as_admin(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<ReportDetail> {
    identity.admin_id()?;
    respond("Report found", load_for_finance(&state, &identity, id)?)
}

/// PUT /api/user/reimburse/:id - Mark a report reimbursed (finance user)
pub async fn reimburse_as_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Report> {
    identity.user_id()?;
    respond("Reimbursed successfully", reimburse(&state, &identity, id, &body)?)
}

/// PUT /api/admin/reimburse/:id - Mark a report reimbursed (admin)
pub async fn reimburse_as_admin(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Report> {
    identity.admin_id()?;
    respond("Reimbursed successfully", reimburse(&state, &identity, id, &body)?)
}
