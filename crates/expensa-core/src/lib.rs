//! Expensa Core Library
//!
//! Shared functionality for the Expensa expense-reimbursement workflow:
//! - Database access and migrations
//! - Expense ledger
//! - Tier/budget policy checks
//! - Report aggregation (submission, updates, event reports)
//! - Approval state machine (decisions, reimbursement, approver resolution)
//! - Notification sink
//! - Policy configuration and directory seeding

pub mod aggregator;
pub mod approval;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod policy;
pub mod seed;

/// Seeded directory fixtures and a recording notification sink
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregator::ReportAggregator;
pub use approval::ApprovalEngine;
pub use config::PolicyConfig;
pub use db::{AuditEntry, Database, ReportFilter};
pub use error::{Error, PolicyViolation, Result, StateConflict};
pub use ledger::ExpenseLedger;
pub use notify::NotificationSink;
pub use policy::BudgetPolicy;
pub use seed::{DirectorySeed, SeedStats};
