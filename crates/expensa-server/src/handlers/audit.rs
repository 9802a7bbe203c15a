//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension,
};
use serde::Deserialize;

use crate::{respond, ApiResult, AppState, Identity, MAX_PAGE_LIMIT};
use expensa_core::AuditEntry;

/// Query parameters for audit log
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

/// GET /api/admin/audit - List audit log entries
pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<AuditQuery>,
) -> ApiResult<Vec<AuditEntry>> {
    identity.admin_id()?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let entries = state.db.list_audit_log(limit)?;

    // Audit log - viewing the audit log itself
    state.db.log_audit(
        &identity.audit_name(),
        "list",
        Some("audit_log"),
        None,
        Some(&format!("limit={}", limit)),
    )?;

    respond("Audit log found", entries)
}
