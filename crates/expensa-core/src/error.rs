//! Error types for Expensa

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::ReportStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Budget policy breach; the message is shown to the caller verbatim
    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error("{0}")]
    NotFound(String),

    /// Report not in the state the operation requires
    #[error(transparent)]
    Conflict(#[from] StateConflict),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a proposed expense bundle cannot be submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Category {0} is disabled.")]
    CategoryDisabled(String),

    #[error("Category {0} not found.")]
    CategoryNotFound(String),

    #[error("Total amount for category {category} ({attempted}) exceeds the maximum allowed ({cap}).")]
    CategoryCapExceeded {
        category: String,
        attempted: Decimal,
        cap: Decimal,
    },

    #[error("Expense with title {0} is already mapped.")]
    AlreadyMapped(String),

    #[error("{0} already includes some of the expenses you mapped.")]
    CrossReportConflict(String),

    #[error("The total amount of existing reports this month exceeds your tier limit of {0}.")]
    PeriodCapExceeded(Decimal),
}

/// Workflow transitions refused because of the report's current state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateConflict {
    #[error("Approval has already been done (report is {0})")]
    AlreadyDecided(ReportStatus),

    #[error("Expenses do not match")]
    ExpenseSetMismatch,

    #[error("Report is {0} and can no longer be edited")]
    NotEditable(ReportStatus),

    #[error("Report is {0}; only approved reports can be reimbursed")]
    NotApproved(ReportStatus),
}
