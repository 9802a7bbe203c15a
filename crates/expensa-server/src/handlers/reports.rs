//! Report handlers: submission, detail, updates and the user listings

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    Extension,
};
use chrono::NaiveDate;
use serde::Deserialize;

use super::parse_status;
use crate::{parse_json, respond, ApiResult, AppError, AppState, Identity, MAX_PAGE_LIMIT};
use expensa_core::models::{
    ReportDetail, ReportMetadata, ReportUpdate, TierCategory, UpdateMode, WalletSummary,
};

/// Request body for submitting a report
#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub report_date: Option<NaiveDate>,
    #[serde(default)]
    pub event_id: Option<i64>,
    /// Save as a draft instead of submitting for approval
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub expenses: Vec<i64>,
}

/// POST /api/user/report - Submit a bundle of expenses as a report
pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> ApiResult<ReportDetail> {
    let user_id = identity.user_id()?;
    let req: SubmitReportRequest = parse_json(&body)?;

    let metadata = ReportMetadata {
        title: req.title,
        description: req.description,
        location: req.location,
        report_date: req.report_date,
        event_id: req.event_id,
        draft: req.draft,
    };
    let detail = state
        .aggregator()
        .submit_report(user_id, &req.expenses, &metadata)?;

    state.db.log_audit(
        &identity.audit_name(),
        "submit",
        Some("report"),
        Some(detail.report.id),
        Some(&format!(
            "report_id={}, expenses={}, total={}",
            detail.report.report_id, detail.expense_count, detail.total_amount
        )),
    )?;

    respond("Report created successfully..!", detail)
}

/// Query parameters for fetching a report
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// Treat the path id as an event id and return the caller's event report
    #[serde(default)]
    pub is_event: bool,
}

/// GET /api/user/report/:id - Get one of the caller's reports (or event report)
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Query(params): Query<ReportQuery>,
) -> ApiResult<ReportDetail> {
    let user_id = identity.user_id()?;
    let aggregator = state.aggregator();

    let detail = if params.is_event {
        aggregator.get_event_report(user_id, id)?
    } else {
        aggregator.get_report(user_id, id)?
    };

    state.db.log_audit(
        &identity.audit_name(),
        "get",
        Some("report"),
        Some(detail.report.id),
        params.is_event.then(|| format!("event={}", id)).as_deref(),
    )?;

    respond("Report found", detail)
}

/// Query parameters for updating a report
#[derive(Debug, Deserialize)]
pub struct UpdateQuery {
    /// `save` releases removed expenses to pending; anything else to draft
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// PUT /api/user/report/:id - Edit an open report
pub async fn update_report(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Query(params): Query<UpdateQuery>,
    body: Bytes,
) -> ApiResult<ReportDetail> {
    let user_id = identity.user_id()?;
    let update: ReportUpdate = parse_json(&body)?;
    let mode = match params.kind.as_deref() {
        Some("save") => UpdateMode::Save,
        _ => UpdateMode::Draft,
    };

    let detail = state.aggregator().update_report(user_id, id, &update, mode)?;

    state.db.log_audit(
        &identity.audit_name(),
        "update",
        Some("report"),
        Some(id),
        Some(&format!(
            "status={}, expenses={}",
            detail.report.status, detail.expense_count
        )),
    )?;

    respond("Report updated successfully", detail)
}

/// Query parameters for the user listing endpoint
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_page")]
    pub page_no: i64,
    #[serde(default)]
    pub status: Option<String>,
}

fn default_page() -> i64 {
    1
}

/// GET /api/user/list - Paged reports, expenses, notifications or approvals
pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<serde_json::Value> {
    let user_id = identity.user_id()?;
    let Query(params) = query.map_err(|e| AppError::bad_request(&e.body_text()))?;
    let page = params.page_no.clamp(1, MAX_PAGE_LIMIT);
    let status = parse_status(params.status.as_deref())?;

    let (message, data, count) = match params.kind.as_str() {
        "reports" => {
            let page = state.aggregator().list_reports(user_id, page, status)?;
            let count = page.items.len();
            ("Reports found", serde_json::to_value(page)?, count)
        }
        "expenses" => {
            let page = state.ledger().list_expenses(user_id, page)?;
            let count = page.items.len();
            ("Expenses found", serde_json::to_value(page)?, count)
        }
        "notifications" => {
            let page = state.aggregator().list_notifications(user_id, page)?;
            let count = page.items.len();
            ("Notifications found", serde_json::to_value(page)?, count)
        }
        "approvals" => {
            let page = state.approvals().list_approvals(user_id, page, status)?;
            let count = page.items.len();
            ("Approvals found", serde_json::to_value(page)?, count)
        }
        _ => return Err(AppError::not_found("Invalid type..!")),
    };

    // Audit log - read access
    state.db.log_audit(
        &identity.audit_name(),
        "list",
        Some(params.kind.as_str()),
        None,
        Some(&format!("page={}, count={}", page, count)),
    )?;

    respond(message, data)
}

/// GET /api/user/category - Enabled categories on the caller's tier
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<TierCategory>> {
    let user_id = identity.user_id()?;

    let categories = state.aggregator().enabled_categories(user_id)?;

    state.db.log_audit(
        &identity.audit_name(),
        "list",
        Some("category"),
        None,
        Some(&format!("count={}", categories.len())),
    )?;

    respond("Categories found", categories)
}

/// GET /api/user/wallet-used - Current-month spend against the tier cap
pub async fn wallet_used(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<WalletSummary> {
    let user_id = identity.user_id()?;

    let wallet = state.aggregator().wallet_summary(user_id)?;

    state
        .db
        .log_audit(&identity.audit_name(), "get", Some("wallet"), None, None)?;

    respond("Wallet details retrieved successfully", wallet)
}
