//! Expensa CLI - Expense reimbursement workflow
//!
//! Usage:
//!   expensa init                       Initialize database
//!   expensa seed --file org.toml       Load tiers, users, admins and events
//!   expensa reports submit ...         Submit expenses for approval
//!   expensa decide 3 approve ...       Approve or reject a report
//!   expensa serve --port 3000          Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let policy = commands::load_policy(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Seed { file } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_seed(&db, &file)
        }
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt, policy).await,
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Expenses { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                ExpensesAction::List { user, page } => {
                    commands::cmd_expenses_list(&db, &policy, user, page)
                }
                ExpensesAction::Add {
                    user,
                    title,
                    amount,
                    category,
                    date,
                    location,
                    description,
                } => commands::cmd_expenses_add(
                    &db,
                    &policy,
                    user,
                    commands::NewExpenseArgs {
                        title: &title,
                        amount: &amount,
                        category: &category,
                        date: date.as_deref(),
                        location: location.as_deref(),
                        description: description.as_deref(),
                    },
                )
                .map(|_| ()),
            }
        }
        Commands::Reports { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                ReportsAction::List { user, page, status } => {
                    commands::cmd_reports_list(&db, &policy, user, page, status.as_deref())
                }
                ReportsAction::Submit {
                    user,
                    title,
                    expenses,
                    date,
                    event,
                    draft,
                } => commands::cmd_reports_submit(
                    &db,
                    &policy,
                    user,
                    &title,
                    &expenses,
                    date.as_deref(),
                    event,
                    draft,
                )
                .map(|_| ()),
                ReportsAction::Show { user, id } => {
                    commands::cmd_reports_show(&db, &policy, user, id)
                }
            }
        }
        Commands::Wallet { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_wallet(&db, &policy, user)
        }
        Commands::Approvals {
            approver,
            page,
            status,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_approvals_list(&db, &policy, approver, page, status.as_deref())
        }
        Commands::Decide {
            report,
            action,
            expenses,
            reason,
            admin,
            user,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let actor = commands::resolve_actor(admin, user)?;
            commands::cmd_decide(
                &db,
                &policy,
                report,
                &action,
                &expenses,
                reason.as_deref(),
                actor,
            )
        }
        Commands::Reimburse {
            report,
            note,
            admin,
            user,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let actor = commands::resolve_actor(admin, user)?;
            commands::cmd_reimburse(&db, &policy, report, note.as_deref(), actor)
        }
        Commands::Approvers { tier } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_approvers(&db, &policy, tier)
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit)
        }
    }
}
