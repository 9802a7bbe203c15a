//! Directory lookups for admins

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension,
};
use serde::Deserialize;

use super::parse_status;
use crate::{respond, ApiResult, AppState, Identity};
use expensa_core::models::{Approvers, ReportSummary};

/// Query parameters for approver resolution
#[derive(Debug, Deserialize)]
pub struct ApproversQuery {
    pub tier: i64,
}

/// GET /api/admin/approvers?tier= - Who approves reports for a tier
pub async fn list_approvers(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ApproversQuery>,
) -> ApiResult<Approvers> {
    identity.admin_id()?;

    let approvers = state.approvals().get_approvers(params.tier)?;

    state.db.log_audit(
        &identity.audit_name(),
        "list",
        Some("approver"),
        None,
        Some(&format!("tier={}", params.tier)),
    )?;

    respond("Approvers found", approvers)
}

/// Query parameters for a user's reports
#[derive(Debug, Deserialize)]
pub struct UserReportsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// GET /api/admin/users/:id/reports - A user's submitted reports
pub async fn list_user_reports(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
    Query(params): Query<UserReportsQuery>,
) -> ApiResult<Vec<ReportSummary>> {
    identity.admin_id()?;
    let status = parse_status(params.status.as_deref())?;

    let reports = state.approvals().list_user_reports(user_id, status)?;

    state.db.log_audit(
        &identity.audit_name(),
        "list",
        Some("report"),
        None,
        Some(&format!("user={}, count={}", user_id, reports.len())),
    )?;

    respond("Reports found", reports)
}
