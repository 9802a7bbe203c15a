//! Tier/budget policy
//!
//! Answers "may this user submit this bundle of expenses right now?".
//! Checks run in a fixed order and the first failure wins:
//! - already mapped (per expense, in submission order)
//! - per category, in first-seen order: not found, disabled, cap exceeded
//! - cross-report conflict with an approved or reimbursed report
//! - monthly cap on committed spend
//!
//! Submissions tied to an admin-created event only get the already-mapped check.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::PolicyConfig;
use crate::db::Database;
use crate::error::{Error, PolicyViolation, Result};
use crate::models::{Expense, ExpenseStatus, Tier, TierCategory, User, WalletSummary};

/// Everything the policy needs to judge one submission
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub tier: &'a Tier,
    pub expenses: &'a [Expense],
    /// Title of an approved/reimbursed report already holding one of the expenses
    pub conflicting_report: Option<&'a str>,
    /// The user's committed spend in the current calendar month
    pub committed_total: Decimal,
    /// Admin-event submissions skip budget checks
    pub bypass_budget: bool,
}

/// Judge a submission against its tier
pub fn validate_submission(
    submission: &Submission<'_>,
    config: &PolicyConfig,
) -> std::result::Result<(), PolicyViolation> {
    ensure_unmapped(submission.expenses)?;

    if submission.bypass_budget {
        return Ok(());
    }

    for (category, attempted) in category_totals(submission.expenses) {
        let rule = submission
            .tier
            .category(&category)
            .ok_or_else(|| PolicyViolation::CategoryNotFound(category.clone()))?;
        if !rule.enabled {
            return Err(PolicyViolation::CategoryDisabled(category));
        }
        if attempted > rule.max_amount {
            return Err(PolicyViolation::CategoryCapExceeded {
                category,
                attempted,
                cap: rule.max_amount,
            });
        }
    }

    if let Some(title) = submission.conflicting_report {
        return Err(PolicyViolation::CrossReportConflict(title.to_string()));
    }

    let mut period_total = submission.committed_total;
    if config.period_cap_includes_submission {
        period_total += submission.expenses.iter().map(|e| e.amount).sum::<Decimal>();
    }
    if period_total > submission.tier.total_amount {
        return Err(PolicyViolation::PeriodCapExceeded(
            submission.tier.total_amount,
        ));
    }

    Ok(())
}

/// Fail on the first expense already claimed by a report
pub fn ensure_unmapped(expenses: &[Expense]) -> std::result::Result<(), PolicyViolation> {
    match expenses.iter().find(|e| e.status == ExpenseStatus::Mapped) {
        Some(mapped) => Err(PolicyViolation::AlreadyMapped(mapped.title.clone())),
        None => Ok(()),
    }
}

/// Sum amounts per lowercase category, keeping first-seen order
pub fn category_totals(expenses: &[Expense]) -> Vec<(String, Decimal)> {
    let mut totals: Vec<(String, Decimal)> = Vec::new();
    for expense in expenses {
        let key = expense.category.trim().to_lowercase();
        match totals.iter_mut().find(|(k, _)| *k == key) {
            Some((_, sum)) => *sum += expense.amount,
            None => totals.push((key, expense.amount)),
        }
    }
    totals
}

/// Calendar month containing `day` as a half-open `[start, end)` range
pub fn month_window(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day.with_day(1).unwrap_or(day);
    let end = start
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (start, end)
}

/// Enabled categories of a tier, titles capitalised for display
pub fn enabled_categories(tier: &Tier) -> Vec<TierCategory> {
    tier.categories
        .iter()
        .filter(|c| c.enabled)
        .map(|c| TierCategory {
            title: c.display_title(),
            max_amount: c.max_amount,
            enabled: c.enabled,
        })
        .collect()
}

/// Database-backed policy checks for a user
pub struct BudgetPolicy<'a> {
    db: &'a Database,
    config: &'a PolicyConfig,
}

impl<'a> BudgetPolicy<'a> {
    pub fn new(db: &'a Database, config: &'a PolicyConfig) -> Self {
        Self { db, config }
    }

    /// The tier a user inherits their budget from
    pub fn tier_for(&self, user: &User) -> Result<Tier> {
        let tier_id = user
            .tier_id
            .ok_or_else(|| Error::NotFound(format!("User {} has no tier assigned", user.id)))?;
        self.db
            .get_tier(tier_id)?
            .ok_or_else(|| Error::NotFound(format!("Tier {} not found", tier_id)))
    }

    /// Gather committed state and run `validate_submission`
    ///
    /// The tier is only resolved when budget checks apply.
    pub fn check(
        &self,
        user: &User,
        expenses: &[Expense],
        bypass_budget: bool,
        today: NaiveDate,
    ) -> Result<()> {
        ensure_unmapped(expenses)?;
        if bypass_budget {
            debug!(user = user.id, "Admin event submission, budget checks skipped");
            return Ok(());
        }

        let tier = self.tier_for(user)?;
        let ids: Vec<i64> = expenses.iter().map(|e| e.id).collect();
        let (start, end) = month_window(today);
        let conflicting_report = self.db.find_committed_report_containing(&ids)?;
        let committed_total = self.db.committed_total_for_user(user.id, start, end)?;

        debug!(
            user = user.id,
            tier = %tier.title,
            expenses = expenses.len(),
            %committed_total,
            "Checking submission against tier"
        );

        let submission = Submission {
            tier: &tier,
            expenses,
            conflicting_report: conflicting_report.as_deref(),
            committed_total,
            bypass_budget,
        };
        validate_submission(&submission, self.config)?;
        Ok(())
    }

    /// Current-month spend of `mapped` and `approved` expenses against the tier cap
    pub fn wallet_summary(&self, user: &User, today: NaiveDate) -> Result<WalletSummary> {
        let tier = self.tier_for(user)?;
        let (start, end) = month_window(today);
        let expenses = self.db.list_wallet_expenses(user.id, start, end)?;
        let total_expenses = expenses.iter().map(|e| e.amount).sum();

        Ok(WalletSummary {
            total_amount: tier.total_amount,
            total_expenses,
            expenses,
            categories: tier.categories,
        })
    }
}
