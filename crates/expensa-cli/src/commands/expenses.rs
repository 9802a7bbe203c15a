//! Expense command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use expensa_core::db::Database;
use expensa_core::models::NewExpense;
use expensa_core::{ExpenseLedger, PolicyConfig};
use rust_decimal::Decimal;

use super::truncate;

/// Raw `expenses add` arguments, parsed in `cmd_expenses_add`
pub struct NewExpenseArgs<'a> {
    pub title: &'a str,
    pub amount: &'a str,
    pub category: &'a str,
    pub date: Option<&'a str>,
    pub location: Option<&'a str>,
    pub description: Option<&'a str>,
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", value))
}

pub fn cmd_expenses_add(
    db: &Database,
    policy: &PolicyConfig,
    user: i64,
    args: NewExpenseArgs<'_>,
) -> Result<i64> {
    let amount: Decimal = args
        .amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount '{}'", args.amount))?;
    let date = args.date.map(parse_date).transpose()?;

    let expense = ExpenseLedger::new(db, policy).create_expense(
        user,
        &NewExpense {
            title: args.title.to_string(),
            amount,
            category: args.category.to_string(),
            date,
            location: args.location.map(String::from),
            description: args.description.map(String::from),
            image: None,
        },
    )?;

    db.log_audit(
        &format!("cli:user:{}", user),
        "create",
        Some("expense"),
        Some(expense.id),
        Some(&format!("amount={} category={}", expense.amount, expense.category)),
    )?;

    println!(
        "✅ Recorded expense [{}] {} ({} {})",
        expense.id, expense.title, expense.amount, expense.category
    );

    Ok(expense.id)
}

pub fn cmd_expenses_list(db: &Database, policy: &PolicyConfig, user: i64, page: i64) -> Result<()> {
    let listing = ExpenseLedger::new(db, policy).list_expenses(user, page)?;

    if listing.items.is_empty() {
        println!("No expenses found. Record one with:");
        println!(
            "  expensa expenses add --user {} --title Lunch --amount 120 --category food",
            user
        );
        return Ok(());
    }

    println!();
    println!(
        "🧾 Expenses for user {} (page {}, {} total)",
        user, listing.page, listing.total
    );
    println!("   ─────────────────────────────────────────────────────────────");

    for expense in listing.items {
        let date = expense
            .date
            .unwrap_or_else(|| expense.created_at.date_naive());
        println!(
            "   [{}] {} │ {:>10} │ {:<10} │ {:<8} │ {}",
            expense.id,
            date,
            expense.amount,
            truncate(&expense.category, 10),
            expense.status.as_str(),
            truncate(&expense.title, 35)
        );
    }

    Ok(())
}
