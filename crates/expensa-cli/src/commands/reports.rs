//! Report command implementations

use anyhow::Result;
use expensa_core::db::Database;
use expensa_core::models::{ReportDetail, ReportMetadata, ReportStatus};
use expensa_core::{PolicyConfig, ReportAggregator};

use super::expenses::parse_date;
use super::truncate;

pub(crate) fn parse_status(value: Option<&str>) -> Result<Option<ReportStatus>> {
    value
        .map(|s| s.parse::<ReportStatus>().map_err(anyhow::Error::msg))
        .transpose()
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_reports_submit(
    db: &Database,
    policy: &PolicyConfig,
    user: i64,
    title: &str,
    expenses: &[i64],
    date: Option<&str>,
    event: Option<i64>,
    draft: bool,
) -> Result<i64> {
    let metadata = ReportMetadata {
        title: title.to_string(),
        report_date: date.map(parse_date).transpose()?,
        event_id: event,
        draft,
        ..Default::default()
    };

    let detail = ReportAggregator::new(db, db, policy).submit_report(user, expenses, &metadata)?;

    db.log_audit(
        &format!("cli:user:{}", user),
        "create",
        Some("report"),
        Some(detail.report.id),
        Some(&format!(
            "report_id={} expenses={}",
            detail.report.report_id, detail.expense_count
        )),
    )?;

    println!(
        "✅ {} {} ({} expenses, total {})",
        detail.report.report_id,
        detail.report.status.as_str(),
        detail.expense_count,
        detail.total_amount
    );

    Ok(detail.report.id)
}

pub fn cmd_reports_list(
    db: &Database,
    policy: &PolicyConfig,
    user: i64,
    page: i64,
    status: Option<&str>,
) -> Result<()> {
    let status = parse_status(status)?;
    let listing = ReportAggregator::new(db, db, policy).list_reports(user, page, status)?;

    if listing.items.is_empty() {
        println!("No reports found.");
        return Ok(());
    }

    println!();
    println!(
        "📁 Reports for user {} (page {}, {} total)",
        user, listing.page, listing.total
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for summary in listing.items {
        println!(
            "   [{}] {:<8} │ {} │ {:<10} │ {:>10} │ {}",
            summary.id,
            summary.report_id,
            summary.report_date,
            summary.status.as_str(),
            summary.total_amount,
            truncate(&summary.title, 30)
        );
    }

    Ok(())
}

pub fn cmd_reports_show(db: &Database, policy: &PolicyConfig, user: i64, id: i64) -> Result<()> {
    let detail = ReportAggregator::new(db, db, policy).get_report(user, id)?;
    print_detail(&detail);
    Ok(())
}

pub(crate) fn print_detail(detail: &ReportDetail) {
    let report = &detail.report;

    println!();
    println!("📄 {} {}", report.report_id, report.title);
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Status: {}", report.status.as_str());
    println!("   Date: {}", report.report_date);
    if let Some(event) = report.event_id {
        println!("   Event: {}", event);
    }
    if let Some(approver) = report.approver {
        println!("   Decided by: {}", approver);
    }
    for reason in &report.reasons {
        println!("   Reason: {}", reason);
    }
    if let Some(reimburser) = report.reimburser {
        println!("   Reimbursed by: {}", reimburser);
    }
    if let Some(note) = &report.description_finance {
        println!("   Finance note: {}", note);
    }

    println!();
    for expense in &detail.expenses {
        println!(
            "   [{}] {:>10} │ {:<10} │ {:<8} │ {}",
            expense.id,
            expense.amount,
            truncate(&expense.category, 10),
            expense.status.as_str(),
            truncate(&expense.title, 35)
        );
    }
    println!();
    println!(
        "   Total: {} across {} expenses",
        detail.total_amount, detail.expense_count
    );
}

pub fn cmd_wallet(db: &Database, policy: &PolicyConfig, user: i64) -> Result<()> {
    let wallet = ReportAggregator::new(db, db, policy).wallet_summary(user)?;

    println!();
    println!("👛 Wallet for user {}", user);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Spent this month: {} of {}",
        wallet.total_expenses, wallet.total_amount
    );
    println!();

    for category in &wallet.categories {
        let spent: rust_decimal::Decimal = wallet
            .expenses
            .iter()
            .filter(|e| e.category.eq_ignore_ascii_case(&category.title))
            .map(|e| e.amount)
            .sum();
        println!(
            "   {:<12} │ {:>10} / {:>10}",
            truncate(&category.display_title(), 12),
            spent,
            category.max_amount
        );
    }

    Ok(())
}
