//! Report aggregator
//!
//! Turns a bundle of draft expenses into a persisted report, keeps report
//! membership in sync on updates, and serves the read side of reports.
//!
//! Membership changes claim expenses with a conditional write inside the same
//! transaction that persists the report, so an expense can never end up
//! `mapped` on two open reports.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::config::PolicyConfig;
use crate::db::{Database, ReportFilter};
use crate::error::{Error, Result, StateConflict};
use crate::models::{
    Expense, ExpenseStatus, NewReport, Notification, Page, Report, ReportDetail, ReportMetadata,
    ReportStatus, ReportSummary, ReportUpdate, TierCategory, UpdateMode, User, WalletSummary,
};
use crate::notify::{self, NotificationSink};
use crate::policy::{enabled_categories, BudgetPolicy};

/// Drop repeated ids, keeping first occurrence order
pub(crate) fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Listing row for a report, with its computed total
pub(crate) fn summarize(db: &Database, report: Report) -> Result<ReportSummary> {
    let expenses = db.get_expenses(&report.expense_ids)?;
    Ok(ReportSummary {
        id: report.id,
        report_id: report.report_id,
        title: report.title,
        status: report.status,
        user_id: report.user_id,
        total_amount: expenses.iter().map(|e| e.amount).sum::<Decimal>(),
        expense_count: expenses.len(),
        report_date: report.report_date,
    })
}

pub struct ReportAggregator<'a> {
    db: &'a Database,
    notifier: &'a dyn NotificationSink,
    config: &'a PolicyConfig,
    today: NaiveDate,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(
        db: &'a Database,
        notifier: &'a dyn NotificationSink,
        config: &'a PolicyConfig,
    ) -> Self {
        Self {
            db,
            notifier,
            config,
            today: Utc::now().date_naive(),
        }
    }

    /// Pin "today" (default report date and the monthly budget window)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    fn policy(&self) -> BudgetPolicy<'a> {
        BudgetPolicy::new(self.db, self.config)
    }

    fn user(&self, id: i64) -> Result<User> {
        self.db
            .get_user(id)?
            .ok_or_else(|| Error::NotFound(format!("User {} not found", id)))
    }

    /// Load expenses by id, requiring every one to exist and belong to `owner`
    fn owned_expenses(&self, owner: i64, ids: &[i64]) -> Result<Vec<Expense>> {
        let expenses = self.db.get_expenses(ids)?;
        for id in ids {
            match expenses.iter().find(|e| e.id == *id) {
                Some(expense) if expense.user_id == owner => {}
                _ => return Err(Error::Validation(format!("Expense {} not found", id))),
            }
        }
        Ok(expenses)
    }

    fn detail(&self, report: Report) -> Result<ReportDetail> {
        let expenses = self.db.get_expenses(&report.expense_ids)?;
        Ok(ReportDetail::new(report, expenses))
    }

    /// Validate a bundle against the owner's tier and persist it as a report
    ///
    /// On success the expenses are `mapped`, the report is `pending` (or
    /// `drafted` when `metadata.draft` is set) and the owner is notified.
    pub fn submit_report(
        &self,
        owner: i64,
        expense_ids: &[i64],
        metadata: &ReportMetadata,
    ) -> Result<ReportDetail> {
        if expense_ids.is_empty() {
            return Err(Error::Validation("Expenses are required".into()));
        }
        if metadata.title.trim().is_empty() {
            return Err(Error::Validation("Title is required".into()));
        }

        let user = self.user(owner)?;
        let ids = dedup_ids(expense_ids);
        let expenses = self.owned_expenses(owner, &ids)?;

        let bypass_budget = match metadata.event_id {
            Some(event_id) => self
                .db
                .get_event(event_id)?
                .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))?
                .is_admin_event(),
            None => false,
        };

        self.policy()
            .check(&user, &expenses, bypass_budget, self.today)?;

        let new_report = NewReport {
            title: metadata.title.trim().to_string(),
            description: metadata.description.clone(),
            report_date: metadata.report_date.unwrap_or(self.today),
            location: metadata.location.clone(),
            expense_ids: ids,
            status: if metadata.draft {
                ReportStatus::Drafted
            } else {
                ReportStatus::Pending
            },
            user_id: owner,
            event_id: metadata.event_id,
        };
        let report = self.db.create_report(&new_report, &expenses)?;

        info!(
            report = %report.report_id,
            user = owner,
            status = %report.status,
            expenses = report.expense_ids.len(),
            "Report submitted"
        );
        notify::emit(self.notifier, &report);

        self.detail(report)
    }

    /// Fetch one of the owner's reports with its expenses and total
    pub fn get_report(&self, owner: i64, id: i64) -> Result<ReportDetail> {
        match self.db.get_report(id)? {
            Some(report) if report.user_id == owner => self.detail(report),
            _ => Err(Error::NotFound(format!("Report {} not found", id))),
        }
    }

    /// Fetch any report with its expenses and total (reviewer view)
    pub fn report_detail(&self, id: i64) -> Result<ReportDetail> {
        let report = self
            .db
            .get_report(id)?
            .ok_or_else(|| Error::NotFound(format!("Report {} not found", id)))?;
        self.detail(report)
    }

    /// The owner's report for an event, created empty and `drafted` on first read
    pub fn get_event_report(&self, owner: i64, event_id: i64) -> Result<ReportDetail> {
        let event = self
            .db
            .get_event(event_id)?
            .ok_or_else(|| Error::NotFound(format!("Event {} not found", event_id)))?;
        if !event.has_participant(owner) {
            return Err(Error::Unauthorized(format!(
                "User {} is not part of event {}",
                owner, event_id
            )));
        }

        if let Some(report) = self.db.find_event_report(event_id, owner)? {
            return self.detail(report);
        }

        let new_report = NewReport {
            title: event.event_name.clone(),
            description: event.description.clone(),
            report_date: self.today,
            location: event.location.clone(),
            expense_ids: Vec::new(),
            status: ReportStatus::Drafted,
            user_id: owner,
            event_id: Some(event_id),
        };
        let report = self.db.create_report(&new_report, &[])?;
        info!(report = %report.report_id, event = event_id, user = owner, "Event report drafted");

        self.detail(report)
    }

    /// Edit an open report
    ///
    /// The new expense set is diffed against the current one: added expenses
    /// are claimed, removed ones are released to `pending` on an explicit save
    /// and to `draft` otherwise. When the result is `pending`, the full set is
    /// re-validated against the owner's tier.
    pub fn update_report(
        &self,
        owner: i64,
        id: i64,
        update: &ReportUpdate,
        mode: UpdateMode,
    ) -> Result<ReportDetail> {
        let current = match self.db.get_report(id)? {
            Some(report) if report.user_id == owner => report,
            _ => return Err(Error::NotFound(format!("Report {} not found", id))),
        };
        if !current.status.is_open() {
            return Err(StateConflict::NotEditable(current.status).into());
        }

        let status = match update.status {
            None => current.status,
            Some(next) if next == current.status => next,
            Some(ReportStatus::Pending) if current.status == ReportStatus::Drafted => {
                ReportStatus::Pending
            }
            Some(next) => {
                return Err(Error::Validation(format!(
                    "Cannot change report status from {} to {}",
                    current.status, next
                )))
            }
        };

        let new_ids = match &update.expense_ids {
            Some(ids) => dedup_ids(ids),
            None => current.expense_ids.clone(),
        };
        if status == ReportStatus::Pending && new_ids.is_empty() {
            return Err(Error::Validation("Expenses are required".into()));
        }

        let old: HashSet<i64> = current.expense_ids.iter().copied().collect();
        let new: HashSet<i64> = new_ids.iter().copied().collect();
        let added_ids: Vec<i64> = new_ids.iter().copied().filter(|id| !old.contains(id)).collect();
        let removed: Vec<i64> = current
            .expense_ids
            .iter()
            .copied()
            .filter(|id| !new.contains(id))
            .collect();

        let members = self.owned_expenses(owner, &new_ids)?;
        let added: Vec<Expense> = members
            .iter()
            .filter(|e| added_ids.contains(&e.id))
            .cloned()
            .collect();

        if status == ReportStatus::Pending && (!added.is_empty() || status != current.status) {
            // Existing members are mapped by this very report
            let candidates: Vec<Expense> = members
                .into_iter()
                .map(|mut e| {
                    if old.contains(&e.id) {
                        e.status = ExpenseStatus::Draft;
                    }
                    e
                })
                .collect();
            let bypass_budget = match current.event_id {
                Some(event_id) => self
                    .db
                    .get_event(event_id)?
                    .map(|e| e.is_admin_event())
                    .unwrap_or(false),
                None => false,
            };
            let user = self.user(owner)?;
            self.policy()
                .check(&user, &candidates, bypass_budget, self.today)?;
        }

        let mut next = current.clone();
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                return Err(Error::Validation("Title is required".into()));
            }
            next.title = title.trim().to_string();
        }
        if update.description.is_some() {
            next.description = update.description.clone();
        }
        if update.location.is_some() {
            next.location = update.location.clone();
        }
        if let Some(date) = update.report_date {
            next.report_date = date;
        }
        next.expense_ids = new_ids;
        next.status = status;

        let report = self
            .db
            .apply_report_update(&next, &added, &removed, mode.released_status())?;

        info!(
            report = %report.report_id,
            added = added.len(),
            removed = removed.len(),
            status = %report.status,
            "Report updated"
        );
        if report.status != current.status {
            notify::emit(self.notifier, &report);
        }

        self.detail(report)
    }

    /// A page of the owner's reports, newest first
    pub fn list_reports(
        &self,
        owner: i64,
        page: i64,
        status: Option<ReportStatus>,
    ) -> Result<Page<ReportSummary>> {
        let filter = ReportFilter::new().user_id(owner).status(status);
        let (limit, offset) = self.config.page_window(page);
        let items = self
            .db
            .list_reports(&filter, limit, offset)?
            .into_iter()
            .map(|r| summarize(self.db, r))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            page: page.max(1),
            total: self.db.count_reports(&filter)?,
        })
    }

    /// A page of the owner's notifications, newest first
    pub fn list_notifications(&self, owner: i64, page: i64) -> Result<Page<Notification>> {
        let (limit, offset) = self.config.page_window(page);
        Ok(Page {
            items: self.db.list_notifications(owner, limit, offset)?,
            page: page.max(1),
            total: self.db.count_notifications(owner)?,
        })
    }

    /// Enabled categories on the owner's tier
    pub fn enabled_categories(&self, owner: i64) -> Result<Vec<TierCategory>> {
        let user = self.user(owner)?;
        let tier = self.policy().tier_for(&user)?;
        Ok(enabled_categories(&tier))
    }

    /// Current-month spend against the owner's tier cap
    pub fn wallet_summary(&self, owner: i64) -> Result<WalletSummary> {
        let user = self.user(owner)?;
        self.policy().wallet_summary(&user, self.today)
    }
}
