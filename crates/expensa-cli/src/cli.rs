//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Expensa - Expense reimbursement workflow
#[derive(Parser)]
#[command(name = "expensa")]
#[command(about = "Self-hosted expense reimbursement workflow", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "expensa.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set EXPENSA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Policy config file (defaults to <data dir>/expensa/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Load tiers, admins, users and events from a TOML file
    Seed {
        /// Seed file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable API key authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires a gateway API key (EXPENSA_API_KEYS).
        #[arg(long)]
        no_auth: bool,
    },

    /// Show database status (encryption, size, counts)
    Status,

    /// Manage a user's expenses
    Expenses {
        #[command(subcommand)]
        action: ExpensesAction,
    },

    /// Manage a user's reports
    Reports {
        #[command(subcommand)]
        action: ReportsAction,
    },

    /// Show a user's current-month spend against their tier
    Wallet {
        /// User id
        #[arg(short, long)]
        user: i64,
    },

    /// List reports awaiting a user approver
    Approvals {
        /// Approver's user id
        #[arg(short, long)]
        approver: i64,

        /// Page number
        #[arg(long, default_value = "1")]
        page: i64,

        /// Filter by status (pending, approved, rejected, reimbursed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Approve or reject a pending report
    Decide {
        /// Report id
        report: i64,

        /// approve or reject
        action: String,

        /// Expense ids: all of them to approve, the rejected subset to reject
        #[arg(short, long, value_delimiter = ',')]
        expenses: Vec<i64>,

        /// Reason recorded on the report
        #[arg(short, long)]
        reason: Option<String>,

        /// Decide as this admin
        #[arg(long, conflicts_with = "user", required_unless_present = "user")]
        admin: Option<i64>,

        /// Decide as this user approver
        #[arg(long)]
        user: Option<i64>,
    },

    /// Mark an approved report reimbursed
    Reimburse {
        /// Report id
        report: i64,

        /// Finance note (payment reference)
        #[arg(short, long)]
        note: Option<String>,

        /// Reimburse as this admin
        #[arg(long, conflicts_with = "user", required_unless_present = "user")]
        admin: Option<i64>,

        /// Reimburse as this finance user
        #[arg(long)]
        user: Option<i64>,
    },

    /// Show who approves reports for a tier
    Approvers {
        /// Tier id
        #[arg(short, long)]
        tier: i64,
    },

    /// Show recent audit log entries
    Audit {
        /// Number of entries
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum ExpensesAction {
    /// List a user's expenses
    List {
        /// User id
        #[arg(short, long)]
        user: i64,

        /// Page number
        #[arg(long, default_value = "1")]
        page: i64,
    },

    /// Record a draft expense
    Add {
        /// Owner's user id
        #[arg(short, long)]
        user: i64,

        /// Expense title
        #[arg(short, long)]
        title: String,

        /// Amount (e.g., 320.50)
        #[arg(short, long)]
        amount: String,

        /// Category (must exist on the user's tier to be submitted)
        #[arg(short, long)]
        category: String,

        /// Expense date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Where the expense happened
        #[arg(long)]
        location: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ReportsAction {
    /// List a user's reports
    List {
        /// User id
        #[arg(short, long)]
        user: i64,

        /// Page number
        #[arg(long, default_value = "1")]
        page: i64,

        /// Filter by status (drafted, pending, approved, rejected, reimbursed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Submit expenses as a report
    Submit {
        /// Owner's user id
        #[arg(short, long)]
        user: i64,

        /// Report title
        #[arg(short, long)]
        title: String,

        /// Expense ids (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        expenses: Vec<i64>,

        /// Report date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Event the report belongs to
        #[arg(long)]
        event: Option<i64>,

        /// Save as a draft instead of submitting for approval
        #[arg(long)]
        draft: bool,
    },

    /// Show one report with its expenses
    Show {
        /// Owner's user id
        #[arg(short, long)]
        user: i64,

        /// Report id
        id: i64,
    },
}
