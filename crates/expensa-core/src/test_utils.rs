//! Test utilities for expensa-core
//!
//! A small seeded directory (two tiers, a submitter, an approver one level up,
//! an admin) plus a notification sink that records what it receives.

use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    ActorRef, Expense, NewAdmin, NewEvent, NewExpense, NewNotification, NewTier, NewUser, Report,
    ReportStatus, TierCategory, UserType,
};
use crate::notify::NotificationSink;

fn amount(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Build a `NewExpense` with just the fields the workflow cares about
pub fn new_expense(title: &str, category: &str, value: &str) -> NewExpense {
    NewExpense {
        title: title.to_string(),
        amount: amount(value),
        category: category.to_string(),
        date: None,
        location: None,
        description: None,
        image: None,
    }
}

/// A detached pending report, for tests that never touch the database
pub fn sample_report(id: i64, user_id: i64) -> Report {
    Report {
        id,
        report_id: format!("Rep#{:03}", id),
        title: "Sample".into(),
        description: None,
        report_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        location: None,
        expense_ids: vec![],
        status: ReportStatus::Pending,
        user_id,
        event_id: None,
        approver: None,
        reasons: vec![],
        reimburser: None,
        description_finance: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Seeded directory on a fresh database
///
/// - `associate_tier` (level 2): food 500, travel 2000, gifts 100 (disabled)
/// - `manager_tier` (level 3): food 1000, travel 5000
/// - `submitter` on the associate tier, `approver` (approver-type) on the manager tier
/// - `admin`
pub struct Fixture {
    pub db: Database,
    pub associate_tier: i64,
    pub manager_tier: i64,
    pub submitter: i64,
    pub approver: i64,
    pub admin: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::in_memory().unwrap();

        let associate_tier = db
            .create_tier(&NewTier::new(
                "Associate",
                2,
                vec![
                    TierCategory::new("food", amount("500"), true),
                    TierCategory::new("travel", amount("2000"), true),
                    TierCategory::new("gifts", amount("100"), false),
                ],
            ))
            .unwrap();
        let manager_tier = db
            .create_tier(&NewTier::new(
                "Manager",
                3,
                vec![
                    TierCategory::new("food", amount("1000"), true),
                    TierCategory::new("travel", amount("5000"), true),
                ],
            ))
            .unwrap();

        let approver = db
            .create_user(&NewUser {
                name: "Morgan Approver".into(),
                employee_id: Some("E-002".into()),
                user_type: UserType::Approver,
                tier_id: Some(manager_tier),
                ..Default::default()
            })
            .unwrap();
        let submitter = db
            .create_user(&NewUser {
                name: "Sam Submitter".into(),
                employee_id: Some("E-001".into()),
                user_type: UserType::Submitter,
                tier_id: Some(associate_tier),
                approver_id: Some(approver),
                ..Default::default()
            })
            .unwrap();
        let admin = db
            .create_admin(&NewAdmin {
                name: "Finance Admin".into(),
                ..Default::default()
            })
            .unwrap();

        Self {
            db,
            associate_tier,
            manager_tier,
            submitter,
            approver,
            admin,
        }
    }

    /// Insert a draft expense and return it
    pub fn expense(&self, owner: i64, title: &str, category: &str, value: &str) -> Expense {
        let id = self
            .db
            .create_expense(owner, &new_expense(title, category, value))
            .unwrap();
        self.db.get_expense(id).unwrap().unwrap()
    }

    /// Create an event with the given creator and staff
    pub fn event(&self, creator: ActorRef, staff: Vec<i64>) -> i64 {
        self.db
            .create_event(&NewEvent {
                event_name: "Annual Offsite".into(),
                description: Some("Team offsite in Goa".into()),
                location: Some("Goa".into()),
                start_date: None,
                end_date: None,
                creator,
                staff,
            })
            .unwrap()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification sink that keeps everything in memory
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<NewNotification>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &NewNotification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
