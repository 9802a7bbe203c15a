//! Expense ledger rows

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{parse_amount, parse_column, parse_date, parse_datetime, Database};
use crate::error::{PolicyViolation, Result};
use crate::models::{Expense, ExpenseStatus, NewExpense};

const EXPENSE_COLUMNS: &str = "id, user_id, title, amount, category, date, location, \
                               description, image, status, created_at";

impl Database {
    /// Insert a new expense in `draft`
    pub fn create_expense(&self, user_id: i64, expense: &NewExpense) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO expenses (user_id, title, amount, category, date, location,
                                  description, image, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'draft')
            "#,
            params![
                user_id,
                expense.title,
                expense.amount.normalize().to_string(),
                expense.category,
                expense.date.map(|d| d.format("%Y-%m-%d").to_string()),
                expense.location,
                expense.description,
                expense.image,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        let expense = conn
            .query_row(&sql, params![id], Self::row_to_expense)
            .optional()?;
        Ok(expense)
    }

    /// Fetch expenses by id, preserving the order of `ids`. Missing ids are skipped.
    pub fn get_expenses(&self, ids: &[i64]) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        Self::load_expenses(&conn, ids)
    }

    pub(crate) fn load_expenses(conn: &Connection, ids: &[i64]) -> Result<Vec<Expense>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM expenses WHERE id IN ({})",
            EXPENSE_COLUMNS, placeholders
        );
        let mut found = conn
            .prepare(&sql)?
            .query_map(params_from_iter(ids.iter()), Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut ordered = Vec::with_capacity(found.len());
        for id in ids {
            if let Some(pos) = found.iter().position(|e| e.id == *id) {
                ordered.push(found.swap_remove(pos));
            }
        }
        Ok(ordered)
    }

    /// List a user's expenses, newest first
    pub fn list_expenses_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM expenses WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            EXPENSE_COLUMNS
        );
        let expenses = conn
            .prepare(&sql)?
            .query_map(params![user_id, limit, offset], Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    pub fn count_expenses_for_user(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM expenses WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// A user's `mapped` and `approved` expenses dated within `[start, end)`
    ///
    /// Undated expenses fall back to their creation day.
    pub fn list_wallet_expenses(
        &self,
        user_id: i64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM expenses
            WHERE user_id = ?
              AND status IN ('mapped', 'approved')
              AND COALESCE(date, date(created_at)) >= ?
              AND COALESCE(date, date(created_at)) < ?
            ORDER BY COALESCE(date, date(created_at)), id
            "#,
            EXPENSE_COLUMNS
        );
        let expenses = conn
            .prepare(&sql)?
            .query_map(
                params![
                    user_id,
                    start.format("%Y-%m-%d").to_string(),
                    end.format("%Y-%m-%d").to_string()
                ],
                Self::row_to_expense,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    /// Set one status on many expenses in a single transaction
    ///
    /// Returns the number of rows written.
    pub fn update_many_status(&self, ids: &[i64], status: ExpenseStatus) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let updated = Self::set_expense_status(&tx, ids, status)?;
        tx.commit()?;
        Ok(updated)
    }

    pub(crate) fn set_expense_status(
        conn: &Connection,
        ids: &[i64],
        status: ExpenseStatus,
    ) -> Result<usize> {
        let mut stmt = conn.prepare("UPDATE expenses SET status = ? WHERE id = ?")?;
        let mut updated = 0;
        for id in ids {
            updated += stmt.execute(params![status.as_str(), id])?;
        }
        Ok(updated)
    }

    /// Claim expenses for a report with one conditional write each
    ///
    /// An expense that is already `mapped` writes zero rows and fails the
    /// whole claim with `AlreadyMapped`; the caller's transaction rolls back.
    /// Mark `expenses` mapped, refusing any that are mapped already or sit on
    /// an approved or reimbursed report
    pub(crate) fn claim_expenses(conn: &Connection, expenses: &[Expense]) -> Result<()> {
        let mut stmt = conn.prepare(
            r#"
            UPDATE expenses SET status = 'mapped'
            WHERE id = ?1 AND status != 'mapped'
              AND NOT EXISTS (
                SELECT 1 FROM report_expenses re
                JOIN reports r ON r.id = re.report_id
                WHERE re.expense_id = ?1 AND r.status IN ('approved', 'reimbursed')
              )
            "#,
        )?;
        for expense in expenses {
            if stmt.execute(params![expense.id])? == 0 {
                if let Some(title) = Self::committed_report_title(conn, &[expense.id])? {
                    return Err(PolicyViolation::CrossReportConflict(title).into());
                }
                return Err(PolicyViolation::AlreadyMapped(expense.title.clone()).into());
            }
        }
        Ok(())
    }

    fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let created_at: String = row.get(10)?;
        Ok(Expense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            amount: parse_amount(row, 3)?,
            category: row.get(4)?,
            date: parse_date(row.get(5)?),
            location: row.get(6)?,
            description: row.get(7)?,
            image: row.get(8)?,
            status: parse_column(row, 9)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
