//! Review command implementations (approvals, decisions, reimbursement)

use anyhow::Result;
use expensa_core::db::Database;
use expensa_core::models::{ActorKind, ActorRef, Approvers, DecisionAction};
use expensa_core::{ApprovalEngine, PolicyConfig};

use super::reports::parse_status;
use super::truncate;

pub fn cmd_approvals_list(
    db: &Database,
    policy: &PolicyConfig,
    approver: i64,
    page: i64,
    status: Option<&str>,
) -> Result<()> {
    let status = parse_status(status)?;
    let listing = ApprovalEngine::new(db, db, policy).list_approvals(approver, page, status)?;

    if listing.items.is_empty() {
        println!("Nothing to review.");
        return Ok(());
    }

    println!();
    println!(
        "🗂  Reports for approver {} (page {}, {} total)",
        approver, listing.page, listing.total
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for summary in listing.items {
        println!(
            "   [{}] {:<8} │ user {:<4} │ {:<10} │ {:>10} │ {}",
            summary.id,
            summary.report_id,
            summary.user_id,
            summary.status.as_str(),
            summary.total_amount,
            truncate(&summary.title, 30)
        );
    }

    Ok(())
}

pub fn cmd_decide(
    db: &Database,
    policy: &PolicyConfig,
    report_id: i64,
    action: &str,
    expenses: &[i64],
    reason: Option<&str>,
    actor: ActorRef,
) -> Result<()> {
    let action: DecisionAction = action.parse().map_err(anyhow::Error::msg)?;
    let engine = ApprovalEngine::new(db, db, policy);

    if actor.kind == ActorKind::User {
        let report = db
            .get_report(report_id)?
            .ok_or_else(|| anyhow::anyhow!("Report {} not found", report_id))?;
        if !engine.is_visible_to(actor.id, &report)? {
            anyhow::bail!("User {} cannot review report {}", actor.id, report.report_id);
        }
    }

    let report = engine.decide(report_id, action, expenses, reason, actor)?;

    db.log_audit(
        &format!("cli:{}", actor),
        action.as_str(),
        Some("report"),
        Some(report_id),
        Some(&format!("report_id={}", report.report_id)),
    )?;

    println!("✅ {} is now {}", report.report_id, report.status.as_str());
    Ok(())
}

pub fn cmd_reimburse(
    db: &Database,
    policy: &PolicyConfig,
    report_id: i64,
    note: Option<&str>,
    actor: ActorRef,
) -> Result<()> {
    let report = ApprovalEngine::new(db, db, policy).reimburse(report_id, actor, note)?;

    db.log_audit(
        &format!("cli:{}", actor),
        "reimburse",
        Some("report"),
        Some(report_id),
        Some(&format!("report_id={}", report.report_id)),
    )?;

    println!("💸 {} reimbursed", report.report_id);
    Ok(())
}

pub fn cmd_approvers(db: &Database, policy: &PolicyConfig, tier: i64) -> Result<()> {
    let approvers = ApprovalEngine::new(db, db, policy).get_approvers(tier)?;

    println!();
    match approvers {
        Approvers::Users(users) => {
            println!("👥 Approvers for tier {} (users)", tier);
            println!("   ─────────────────────────────────────────────────────────────");
            for user in users {
                println!(
                    "   [{}] {} │ {}",
                    user.id,
                    truncate(&user.name, 30),
                    user.email.as_deref().unwrap_or("-")
                );
            }
        }
        Approvers::Admins(admins) => {
            println!("🛡  Approvers for tier {} (admin fallback)", tier);
            println!("   ─────────────────────────────────────────────────────────────");
            for admin in admins {
                println!(
                    "   [{}] {} │ {}",
                    admin.id,
                    truncate(&admin.name, 30),
                    admin.email.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
