//! Integration tests for expensa-core
//!
//! These tests exercise the full seed → expense → report → decision → reimbursement
//! workflow against a real database, with the database itself as notification sink.

use chrono::NaiveDate;
use expensa_core::{
    db::Database,
    error::{Error, PolicyViolation, StateConflict},
    models::{
        ActorRef, Approvers, DecisionAction, ExpenseStatus, NewExpense, ReportMetadata,
        ReportStatus, ReportUpdate, UpdateMode,
    },
    ApprovalEngine, DirectorySeed, ExpenseLedger, PolicyConfig, ReportAggregator,
};
use rust_decimal::Decimal;

/// Three tiers, one approver on each of the upper two, and a finance admin.
/// Level 4 has no approvers, so level-3 reports fall back to admins.
fn org_toml() -> &'static str {
    r#"
[[tiers]]
title = "Associate"
level = 2
categories = [
  { title = "food", max_amount = "500" },
  { title = "travel", max_amount = "2000" },
]

[[tiers]]
title = "Manager"
level = 3
categories = [
  { title = "food", max_amount = "1000" },
  { title = "travel", max_amount = "5000" },
]

[[tiers]]
title = "Director"
level = 4
categories = [{ title = "travel", max_amount = "10000" }]

[[admins]]
name = "Finance Desk"
email = "finance@example.com"

[[users]]
name = "Morgan"
employee_id = "E-002"
user_type = "approver"
tier = "Manager"

[[users]]
name = "Sam"
employee_id = "E-001"
tier = "Associate"
approver = "E-002"

[[events]]
event_name = "Sales Kickoff"
location = "Mumbai"
created_by_admin = "finance@example.com"
staff = ["E-001"]
"#
}

struct Org {
    db: Database,
    config: PolicyConfig,
    sam: i64,
    morgan: i64,
    finance: i64,
}

fn org() -> Org {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    DirectorySeed::parse(org_toml())
        .expect("Failed to parse seed")
        .apply(&db)
        .expect("Failed to apply seed");

    let users = db.list_users().unwrap();
    let id_of = |name: &str| users.iter().find(|u| u.name == name).unwrap().id;
    let sam = id_of("Sam");
    let morgan = id_of("Morgan");
    let finance = db.list_active_admins().unwrap()[0].id;

    Org {
        db,
        config: PolicyConfig::default(),
        sam,
        morgan,
        finance,
    }
}

fn expense(title: &str, category: &str, amount: &str) -> NewExpense {
    NewExpense {
        title: title.into(),
        amount: amount.parse().unwrap(),
        category: category.into(),
        date: None,
        location: None,
        description: None,
        image: None,
    }
}

fn metadata(title: &str) -> ReportMetadata {
    ReportMetadata {
        title: title.into(),
        ..Default::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
}

// =============================================================================
// Full Workflow
// =============================================================================

#[test]
fn test_full_reimbursement_workflow() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());
    let engine = ApprovalEngine::new(&org.db, &org.db, &org.config);

    let lunch = ledger
        .create_expense(org.sam, &expense("Client lunch", "Food", "320.50"))
        .unwrap();
    let cab = ledger
        .create_expense(org.sam, &expense("Airport cab", "travel", "900"))
        .unwrap();

    // Submit
    let detail = aggregator
        .submit_report(org.sam, &[lunch.id, cab.id], &metadata("May travel"))
        .unwrap();
    assert_eq!(detail.report.report_id, "Rep#001");
    assert_eq!(detail.report.status, ReportStatus::Pending);
    assert_eq!(detail.total_amount, "1220.50".parse::<Decimal>().unwrap());
    assert_eq!(detail.expense_count, 2);

    // Round trip through the owner's view
    let fetched = aggregator.get_report(org.sam, detail.report.id).unwrap();
    assert_eq!(fetched.report.expense_ids, vec![lunch.id, cab.id]);
    assert_eq!(fetched.total_amount, detail.total_amount);

    // Morgan sits one level up and can see it
    assert!(engine.is_visible_to(org.morgan, &fetched.report).unwrap());
    let queue = engine.list_approvals(org.morgan, 1, None).unwrap();
    assert_eq!(queue.total, 1);
    assert_eq!(queue.items[0].report_id, "Rep#001");

    // Approve, then reimburse
    let approved = engine
        .decide(
            detail.report.id,
            DecisionAction::Approve,
            &[cab.id, lunch.id],
            None,
            ActorRef::user(org.morgan),
        )
        .unwrap();
    assert_eq!(approved.status, ReportStatus::Approved);
    assert_eq!(approved.approver, Some(ActorRef::user(org.morgan)));
    for id in [lunch.id, cab.id] {
        assert_eq!(
            org.db.get_expense(id).unwrap().unwrap().status,
            ExpenseStatus::Approved
        );
    }

    let paid = engine
        .reimburse(detail.report.id, ActorRef::admin(org.finance), Some("NEFT 4471"))
        .unwrap();
    assert_eq!(paid.status, ReportStatus::Reimbursed);
    assert_eq!(paid.reimburser, Some(ActorRef::admin(org.finance)));
    assert_eq!(paid.description_finance.as_deref(), Some("NEFT 4471"));

    // Every status change reached the owner's notification list
    let statuses: Vec<ReportStatus> = aggregator
        .list_notifications(org.sam, 1)
        .unwrap()
        .items
        .into_iter()
        .map(|n| n.status)
        .collect();
    assert_eq!(statuses.len(), 3);
    assert!(statuses.contains(&ReportStatus::Pending));
    assert!(statuses.contains(&ReportStatus::Approved));
    assert!(statuses.contains(&ReportStatus::Reimbursed));

    // Terminal means terminal
    let err = engine
        .reimburse(detail.report.id, ActorRef::admin(org.finance), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Conflict(StateConflict::AlreadyDecided(ReportStatus::Reimbursed))
    ));
}

#[test]
fn test_partial_rejection_workflow() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());
    let engine = ApprovalEngine::new(&org.db, &org.db, &org.config);

    let ok = ledger
        .create_expense(org.sam, &expense("Train", "travel", "400"))
        .unwrap();
    let personal = ledger
        .create_expense(org.sam, &expense("Souvenir dinner", "food", "120"))
        .unwrap();
    let report = aggregator
        .submit_report(org.sam, &[ok.id, personal.id], &metadata("Trip"))
        .unwrap()
        .report;

    let rejected = engine
        .decide(
            report.id,
            DecisionAction::Reject,
            &[personal.id],
            Some("Dinner was personal"),
            ActorRef::user(org.morgan),
        )
        .unwrap();
    assert_eq!(rejected.status, ReportStatus::Rejected);
    assert_eq!(rejected.reasons, vec!["Dinner was personal".to_string()]);
    assert_eq!(
        org.db.get_expense(ok.id).unwrap().unwrap().status,
        ExpenseStatus::Approved
    );
    assert_eq!(
        org.db.get_expense(personal.id).unwrap().unwrap().status,
        ExpenseStatus::Rejected
    );

    // A rejected report cannot be reimbursed
    assert!(engine
        .reimburse(report.id, ActorRef::admin(org.finance), None)
        .is_err());
}

// =============================================================================
// Policy Integration Tests
// =============================================================================

#[test]
fn test_category_cap_blocks_submission() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());

    let a = ledger
        .create_expense(org.sam, &expense("Lunch", "food", "300"))
        .unwrap();
    let b = ledger
        .create_expense(org.sam, &expense("Dinner", "food", "250"))
        .unwrap();

    let err = aggregator
        .submit_report(org.sam, &[a.id, b.id], &metadata("Meals"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Policy(PolicyViolation::CategoryCapExceeded { ref category, .. }) if category == "food"
    ));

    // Nothing was claimed
    assert_eq!(
        org.db.get_expense(a.id).unwrap().unwrap().status,
        ExpenseStatus::Draft
    );
}

#[test]
fn test_unknown_category_blocks_submission() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());

    let gift = ledger
        .create_expense(org.sam, &expense("Flowers", "gifts", "40"))
        .unwrap();
    let err = aggregator
        .submit_report(org.sam, &[gift.id], &metadata("Gifts"))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Policy(PolicyViolation::CategoryNotFound(_))
    ));
}

#[test]
fn test_admin_event_report_skips_budget() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());

    // Reading the event report creates the draft
    let event_report = aggregator.get_event_report(org.sam, 1).unwrap();
    assert_eq!(event_report.report.status, ReportStatus::Drafted);
    assert_eq!(event_report.report.title, "Sales Kickoff");
    assert_eq!(event_report.expense_count, 0);

    // Morgan is not on the event staff
    assert!(matches!(
        aggregator.get_event_report(org.morgan, 1),
        Err(Error::Unauthorized(_))
    ));

    // Over the food cap, but admin events bypass budget checks
    let banquet = ledger
        .create_expense(org.sam, &expense("Banquet", "food", "5000"))
        .unwrap();
    let update = ReportUpdate {
        expense_ids: Some(vec![banquet.id]),
        status: Some(ReportStatus::Pending),
        ..Default::default()
    };
    let submitted = aggregator
        .update_report(org.sam, event_report.report.id, &update, UpdateMode::Save)
        .unwrap();
    assert_eq!(submitted.report.status, ReportStatus::Pending);
    assert_eq!(submitted.total_amount, "5000".parse::<Decimal>().unwrap());

    // Second read returns the same report
    let again = aggregator.get_event_report(org.sam, 1).unwrap();
    assert_eq!(again.report.id, event_report.report.id);
}

// =============================================================================
// Approver Resolution
// =============================================================================

#[test]
fn test_approver_resolution_by_level() {
    let org = org();
    let engine = ApprovalEngine::new(&org.db, &org.db, &org.config);

    let associate = org.db.get_tier_by_level(2).unwrap().unwrap();
    match engine.get_approvers(associate.id).unwrap() {
        Approvers::Users(users) => {
            assert_eq!(users.len(), 1);
            assert_eq!(users[0].id, org.morgan);
        }
        other => panic!("expected user approvers, got {:?}", other),
    }

    // Level 4 has no approver-type users, so level 3 falls back to admins
    let manager = org.db.get_tier_by_level(3).unwrap().unwrap();
    match engine.get_approvers(manager.id).unwrap() {
        Approvers::Admins(admins) => {
            assert_eq!(admins.len(), 1);
            assert_eq!(admins[0].id, org.finance);
        }
        other => panic!("expected admin approvers, got {:?}", other),
    }
}

#[test]
fn test_approver_cannot_see_peer_reports() {
    let org = org();
    let ledger = ExpenseLedger::new(&org.db, &org.config);
    let aggregator = ReportAggregator::new(&org.db, &org.db, &org.config).with_today(today());
    let engine = ApprovalEngine::new(&org.db, &org.db, &org.config);

    let own = ledger
        .create_expense(org.morgan, &expense("Hotel", "travel", "3000"))
        .unwrap();
    let report = aggregator
        .submit_report(org.morgan, &[own.id], &metadata("Conference"))
        .unwrap()
        .report;

    assert!(!engine.is_visible_to(org.morgan, &report).unwrap());
    assert_eq!(engine.list_approvals(org.morgan, 1, None).unwrap().total, 0);

    // Sam is not an approver at all
    assert!(matches!(
        engine.list_approvals(org.sam, 1, None),
        Err(Error::Unauthorized(_))
    ));
}
