//! Expense ledger
//!
//! Individual spend records. The ledger enforces only field validity; status
//! changes come from the report aggregator and the approval engine through
//! `update_many_status`.

use rust_decimal::Decimal;
use tracing::info;

use crate::config::PolicyConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Expense, ExpenseStatus, NewExpense, Page};

pub struct ExpenseLedger<'a> {
    db: &'a Database,
    config: &'a PolicyConfig,
}

impl<'a> ExpenseLedger<'a> {
    pub fn new(db: &'a Database, config: &'a PolicyConfig) -> Self {
        Self { db, config }
    }

    /// Record a new `draft` expense for `owner`
    pub fn create_expense(&self, owner: i64, expense: &NewExpense) -> Result<Expense> {
        if expense.title.trim().is_empty() {
            return Err(Error::Validation("Title is required".into()));
        }
        if expense.category.trim().is_empty() {
            return Err(Error::Validation("Category is required".into()));
        }
        if expense.amount <= Decimal::ZERO {
            return Err(Error::Validation("Amount must be greater than zero".into()));
        }
        if self.db.get_user(owner)?.is_none() {
            return Err(Error::NotFound(format!("User {} not found", owner)));
        }

        let id = self.db.create_expense(owner, expense)?;
        info!(expense = id, user = owner, amount = %expense.amount, "Expense recorded");
        self.db
            .get_expense(id)?
            .ok_or_else(|| Error::NotFound(format!("Expense {} not found", id)))
    }

    /// Fetch an expense owned by `owner`
    pub fn get_expense(&self, owner: i64, id: i64) -> Result<Expense> {
        match self.db.get_expense(id)? {
            Some(expense) if expense.user_id == owner => Ok(expense),
            _ => Err(Error::NotFound(format!("Expense {} not found", id))),
        }
    }

    /// A page of the owner's expenses, newest first
    pub fn list_expenses(&self, owner: i64, page: i64) -> Result<Page<Expense>> {
        let (limit, offset) = self.config.page_window(page);
        Ok(Page {
            items: self.db.list_expenses_for_user(owner, limit, offset)?,
            page: page.max(1),
            total: self.db.count_expenses_for_user(owner)?,
        })
    }

    /// Bulk status write, atomic per call
    pub fn update_many_status(&self, ids: &[i64], status: ExpenseStatus) -> Result<usize> {
        self.db.update_many_status(ids, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{new_expense, Fixture};

    #[test]
    fn test_create_expense_starts_draft() {
        let fx = Fixture::new();
        let config = PolicyConfig::default();
        let ledger = ExpenseLedger::new(&fx.db, &config);

        let expense = ledger
            .create_expense(fx.submitter, &new_expense("Lunch", "food", "42.50"))
            .unwrap();

        assert_eq!(expense.status, ExpenseStatus::Draft);
        assert_eq!(expense.amount, "42.50".parse::<Decimal>().unwrap());
        assert_eq!(expense.user_id, fx.submitter);
    }

    #[test]
    fn test_create_expense_validation() {
        let fx = Fixture::new();
        let config = PolicyConfig::default();
        let ledger = ExpenseLedger::new(&fx.db, &config);

        let zero = new_expense("Lunch", "food", "0");
        assert!(matches!(
            ledger.create_expense(fx.submitter, &zero),
            Err(Error::Validation(_))
        ));

        let untitled = new_expense("  ", "food", "10");
        assert!(matches!(
            ledger.create_expense(fx.submitter, &untitled),
            Err(Error::Validation(_))
        ));

        let valid = new_expense("Lunch", "food", "10");
        assert!(matches!(
            ledger.create_expense(9999, &valid),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_get_expense_is_owner_scoped() {
        let fx = Fixture::new();
        let config = PolicyConfig::default();
        let ledger = ExpenseLedger::new(&fx.db, &config);
        let expense = fx.expense(fx.submitter, "Lunch", "food", "10");

        assert!(ledger.get_expense(fx.submitter, expense.id).is_ok());
        assert!(matches!(
            ledger.get_expense(fx.approver, expense.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_expenses_paginates() {
        let fx = Fixture::new();
        let config = PolicyConfig {
            page_size: 2,
            ..Default::default()
        };
        let ledger = ExpenseLedger::new(&fx.db, &config);
        for i in 0..5 {
            fx.expense(fx.submitter, &format!("Item {}", i), "food", "1");
        }

        let first = ledger.list_expenses(fx.submitter, 1).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 5);
        assert_eq!(first.items[0].title, "Item 4");

        let last = ledger.list_expenses(fx.submitter, 3).unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].title, "Item 0");
    }
}
