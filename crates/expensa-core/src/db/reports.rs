//! Report persistence: creation, membership, decisions and reimbursement
//!
//! Every multi-row write runs in a `BEGIN IMMEDIATE` transaction and guards its
//! state transition with a conditional `UPDATE`, so two writers racing on the
//! same report or expense cannot both succeed.

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use super::{parse_amount, parse_column, parse_date, parse_datetime, Database};
use crate::error::{Error, Result, StateConflict};
use crate::models::{
    ActorRef, DecisionAction, Expense, ExpenseStatus, NewReport, Report, ReportStatus,
};

const REPORT_COLUMNS: &str = "r.id, r.report_id, r.title, r.description, r.report_date, \
                              r.location, r.status, r.user_id, r.event_id, r.approver_kind, \
                              r.approver_id, r.reimburser_kind, r.reimburser_id, \
                              r.description_finance, r.created_at, r.updated_at";

/// Builder for report listing queries
#[derive(Debug, Default, Clone)]
pub struct ReportFilter {
    pub user_id: Option<i64>,
    pub status: Option<ReportStatus>,
    /// Hide `drafted` reports when no explicit status is given
    pub exclude_drafted: bool,
    /// Only reports whose owner's tier level is strictly below this
    pub owner_level_below: Option<i64>,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_id(mut self, id: i64) -> Self {
        self.user_id = Some(id);
        self
    }

    pub fn status(mut self, status: Option<ReportStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn exclude_drafted(mut self, value: bool) -> Self {
        self.exclude_drafted = value;
        self
    }

    pub fn owner_level_below(mut self, level: i64) -> Self {
        self.owner_level_below = Some(level);
        self
    }

    /// JOIN and WHERE clauses plus their parameters
    fn build(&self) -> (&'static str, String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(user_id) = self.user_id {
            conditions.push("r.user_id = ?");
            params.push(Box::new(user_id));
        }

        if let Some(status) = self.status {
            conditions.push("r.status = ?");
            params.push(Box::new(status.as_str()));
        } else if self.exclude_drafted {
            conditions.push("r.status != 'drafted'");
        }

        let join = if let Some(level) = self.owner_level_below {
            conditions.push("t.level < ?");
            params.push(Box::new(level));
            "JOIN users u ON u.id = r.user_id JOIN tiers t ON t.id = u.tier_id"
        } else {
            ""
        };

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (join, where_clause, params)
    }
}

fn actor_from(kind: Option<String>, id: Option<i64>) -> Option<ActorRef> {
    match (kind, id) {
        (Some(kind), Some(id)) => kind.parse().ok().map(|kind| ActorRef { kind, id }),
        _ => None,
    }
}

/// Split a report's members into (approved, rejected) for `action`
fn partition_decision(
    action: DecisionAction,
    members: &[i64],
    supplied: &[i64],
) -> Result<(ReportStatus, Vec<i64>, Vec<i64>)> {
    let member_set: HashSet<i64> = members.iter().copied().collect();
    let supplied: HashSet<i64> = supplied.iter().copied().collect();

    match action {
        DecisionAction::Approve => {
            if supplied != member_set {
                return Err(StateConflict::ExpenseSetMismatch.into());
            }
            Ok((ReportStatus::Approved, members.to_vec(), Vec::new()))
        }
        DecisionAction::Reject => {
            if !supplied.is_subset(&member_set) {
                return Err(StateConflict::ExpenseSetMismatch.into());
            }
            let (rejected, approved): (Vec<i64>, Vec<i64>) =
                members.iter().copied().partition(|id| supplied.contains(id));
            Ok((ReportStatus::Rejected, approved, rejected))
        }
    }
}

impl Database {
    /// Allocate the next human-readable report code (`Rep#001`, `Rep#002`, ...)
    ///
    /// Must run inside the transaction that inserts the report.
    fn next_report_code(conn: &Connection) -> Result<String> {
        let value: i64 = conn.query_row(
            r#"
            INSERT INTO counters (name, value) VALUES ('report', 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(format!("Rep#{:03}", value))
    }

    /// Persist a validated report and claim its expenses atomically
    ///
    /// Fails with `AlreadyMapped` (and writes nothing) if any expense was
    /// claimed by another report in the meantime.
    pub fn create_report(&self, report: &NewReport, expenses: &[Expense]) -> Result<Report> {
        let id = {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            Self::claim_expenses(&tx, expenses)?;
            let code = Self::next_report_code(&tx)?;

            tx.execute(
                r#"
                INSERT INTO reports (report_id, title, description, report_date, location,
                                     status, user_id, event_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    code,
                    report.title,
                    report.description,
                    report.report_date.format("%Y-%m-%d").to_string(),
                    report.location,
                    report.status.as_str(),
                    report.user_id,
                    report.event_id,
                ],
            )?;
            let id = tx.last_insert_rowid();
            Self::write_membership(&tx, id, &report.expense_ids)?;

            tx.commit()?;
            id
        };

        self.get_report(id)?
            .ok_or_else(|| Error::NotFound(format!("Report {} not found", id)))
    }

    pub fn get_report(&self, id: i64) -> Result<Option<Report>> {
        let conn = self.conn()?;
        Self::load_report(&conn, id)
    }

    /// The report a user holds for an event, if one was created
    pub fn find_event_report(&self, event_id: i64, user_id: i64) -> Result<Option<Report>> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM reports WHERE event_id = ? AND user_id = ? ORDER BY id LIMIT 1",
                params![event_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Self::load_report(&conn, id),
            None => Ok(None),
        }
    }

    /// List reports matching a filter, newest first
    pub fn list_reports(
        &self,
        filter: &ReportFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Report>> {
        let conn = self.conn()?;
        let (join, where_clause, mut params) = filter.build();
        let sql = format!(
            "SELECT r.id FROM reports r {} {} ORDER BY r.created_at DESC, r.id DESC LIMIT ? OFFSET ?",
            join, where_clause
        );
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let ids: Vec<i64> = conn
            .prepare(&sql)?
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(report) = Self::load_report(&conn, id)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    pub fn count_reports(&self, filter: &ReportFilter) -> Result<i64> {
        let conn = self.conn()?;
        let (join, where_clause, params) = filter.build();
        let sql = format!("SELECT COUNT(*) FROM reports r {} {}", join, where_clause);
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let count = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Title of an approved or reimbursed report already holding any of `expense_ids`
    pub fn find_committed_report_containing(&self, expense_ids: &[i64]) -> Result<Option<String>> {
        let conn = self.conn()?;
        Self::committed_report_title(&conn, expense_ids)
    }

    pub(crate) fn committed_report_title(
        conn: &Connection,
        expense_ids: &[i64],
    ) -> Result<Option<String>> {
        if expense_ids.is_empty() {
            return Ok(None);
        }
        let placeholders = vec!["?"; expense_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT r.title FROM reports r
            JOIN report_expenses re ON re.report_id = r.id
            WHERE re.expense_id IN ({})
              AND r.status IN ('approved', 'reimbursed')
            ORDER BY r.id
            LIMIT 1
            "#,
            placeholders
        );
        let title = conn
            .query_row(&sql, params_from_iter(expense_ids.iter()), |row| row.get(0))
            .optional()?;
        Ok(title)
    }

    /// Sum of expense amounts on a user's approved/reimbursed reports dated in `[start, end)`
    pub fn committed_total_for_user(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal> {
        let conn = self.conn()?;
        let amounts = conn
            .prepare(
                r#"
                SELECT e.amount FROM reports r
                JOIN report_expenses re ON re.report_id = r.id
                JOIN expenses e ON e.id = re.expense_id
                WHERE r.user_id = ?
                  AND r.status IN ('approved', 'reimbursed')
                  AND r.report_date >= ?
                  AND r.report_date < ?
                "#,
            )?
            .query_map(
                params![
                    user_id,
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                |row| parse_amount(row, 0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(amounts.into_iter().sum())
    }

    /// Persist an approve/reject decision on a pending report
    ///
    /// The report's membership is read under the write lock: approval needs
    /// `expense_ids` to match it as a set, rejection needs a subset. Rejected
    /// expenses become `rejected`, every other member `approved`.
    pub fn apply_decision(
        &self,
        report_id: i64,
        action: DecisionAction,
        expense_ids: &[i64],
        approver: ActorRef,
        reason: Option<&str>,
    ) -> Result<Report> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = Self::current_status(&tx, report_id)?;
            if current != ReportStatus::Pending {
                return Err(StateConflict::AlreadyDecided(current).into());
            }

            let members = Self::member_ids(&tx, report_id)?;
            let (outcome, approved, rejected) = partition_decision(action, &members, expense_ids)?;

            let updated = tx.execute(
                r#"
                UPDATE reports
                SET status = ?, approver_kind = ?, approver_id = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND status = 'pending'
                "#,
                params![outcome.as_str(), approver.kind.as_str(), approver.id, report_id],
            )?;
            if updated == 0 {
                let current = Self::current_status(&tx, report_id)?;
                return Err(StateConflict::AlreadyDecided(current).into());
            }

            Self::set_expense_status(&tx, &approved, ExpenseStatus::Approved)?;
            Self::set_expense_status(&tx, &rejected, ExpenseStatus::Rejected)?;
            if let Some(reason) = reason {
                Self::append_reason(&tx, report_id, reason)?;
            }

            tx.commit()?;
        }

        self.get_report(report_id)?
            .ok_or_else(|| Error::NotFound(format!("Report {} not found", report_id)))
    }

    /// Mark a report reimbursed if its current status is one of `allowed_from`
    ///
    /// Terminal reports fail with `AlreadyDecided`, anything else outside
    /// `allowed_from` with `NotApproved`. Expenses still `mapped` on the report
    /// become `approved`.
    pub fn apply_reimbursement(
        &self,
        report_id: i64,
        reimburser: ActorRef,
        note: Option<&str>,
        allowed_from: &[ReportStatus],
    ) -> Result<Report> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = Self::current_status(&tx, report_id)?;
            if current.is_terminal() {
                return Err(StateConflict::AlreadyDecided(current).into());
            }
            if !allowed_from.contains(&current) {
                return Err(StateConflict::NotApproved(current).into());
            }

            tx.execute(
                r#"
                UPDATE reports
                SET status = 'reimbursed', reimburser_kind = ?, reimburser_id = ?,
                    description_finance = ?, updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND status = ?
                "#,
                params![
                    reimburser.kind.as_str(),
                    reimburser.id,
                    note,
                    report_id,
                    current.as_str()
                ],
            )?;
            // Skipping approval still settles the report's expenses
            tx.execute(
                r#"
                UPDATE expenses SET status = 'approved'
                WHERE status = 'mapped'
                  AND id IN (SELECT expense_id FROM report_expenses WHERE report_id = ?)
                "#,
                params![report_id],
            )?;

            tx.commit()?;
        }

        self.get_report(report_id)?
            .ok_or_else(|| Error::NotFound(format!("Report {} not found", report_id)))
    }

    /// Rewrite an open report's metadata and membership
    ///
    /// `added` expenses are claimed, `removed` ids are released to `released`.
    /// Fails with `NotEditable` if the report is no longer drafted or pending.
    pub fn apply_report_update(
        &self,
        report: &Report,
        added: &[Expense],
        removed: &[i64],
        released: ExpenseStatus,
    ) -> Result<Report> {
        {
            let mut conn = self.conn()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let updated = tx.execute(
                r#"
                UPDATE reports
                SET title = ?, description = ?, location = ?, report_date = ?, status = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = ? AND status IN ('drafted', 'pending')
                "#,
                params![
                    report.title,
                    report.description,
                    report.location,
                    report.report_date.format("%Y-%m-%d").to_string(),
                    report.status.as_str(),
                    report.id,
                ],
            )?;
            if updated == 0 {
                let current = Self::current_status(&tx, report.id)?;
                return Err(StateConflict::NotEditable(current).into());
            }

            Self::claim_expenses(&tx, added)?;
            Self::set_expense_status(&tx, removed, released)?;

            tx.execute(
                "DELETE FROM report_expenses WHERE report_id = ?",
                params![report.id],
            )?;
            Self::write_membership(&tx, report.id, &report.expense_ids)?;

            tx.commit()?;
        }

        self.get_report(report.id)?
            .ok_or_else(|| Error::NotFound(format!("Report {} not found", report.id)))
    }

    fn member_ids(conn: &Connection, report_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT expense_id FROM report_expenses WHERE report_id = ? ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![report_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn current_status(conn: &Connection, report_id: i64) -> Result<ReportStatus> {
        conn.query_row(
            "SELECT status FROM reports WHERE id = ?",
            params![report_id],
            |row| parse_column(row, 0),
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("Report {} not found", report_id)))
    }

    fn write_membership(conn: &Connection, report_id: i64, expense_ids: &[i64]) -> Result<()> {
        let mut stmt = conn.prepare(
            "INSERT INTO report_expenses (report_id, expense_id, position) VALUES (?, ?, ?)",
        )?;
        for (position, expense_id) in expense_ids.iter().enumerate() {
            stmt.execute(params![report_id, expense_id, position as i64])?;
        }
        Ok(())
    }

    fn append_reason(conn: &Connection, report_id: i64, reason: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO report_reasons (report_id, reason) VALUES (?, ?)",
            params![report_id, reason],
        )?;
        Ok(())
    }

    fn load_report(conn: &Connection, id: i64) -> Result<Option<Report>> {
        let sql = format!("SELECT {} FROM reports r WHERE r.id = ?", REPORT_COLUMNS);
        let report = conn
            .query_row(&sql, params![id], |row| {
                let report_date: Option<String> = row.get(4)?;
                let created_at: String = row.get(14)?;
                let updated_at: String = row.get(15)?;
                Ok(Report {
                    id: row.get(0)?,
                    report_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    report_date: parse_date(report_date).unwrap_or_default(),
                    location: row.get(5)?,
                    expense_ids: Vec::new(),
                    status: parse_column(row, 6)?,
                    user_id: row.get(7)?,
                    event_id: row.get(8)?,
                    approver: actor_from(row.get(9)?, row.get(10)?),
                    reasons: Vec::new(),
                    reimburser: actor_from(row.get(11)?, row.get(12)?),
                    description_finance: row.get(13)?,
                    created_at: parse_datetime(&created_at),
                    updated_at: parse_datetime(&updated_at),
                })
            })
            .optional()?;

        let Some(mut report) = report else {
            return Ok(None);
        };

        report.expense_ids = conn
            .prepare("SELECT expense_id FROM report_expenses WHERE report_id = ? ORDER BY position")?
            .query_map(params![report.id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        report.reasons = conn
            .prepare("SELECT reason FROM report_reasons WHERE report_id = ? ORDER BY id")?
            .query_map(params![report.id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(report))
    }
}
