//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init, seed, status, audit) and shared utilities (open_db)
//! - `expenses` - Expense commands (add, list)
//! - `reports` - Report commands (submit, list, show, wallet)
//! - `approvals` - Review commands (approvals, decide, reimburse, approvers)
//! - `serve` - Web server command

pub mod approvals;
pub mod core;
pub mod expenses;
pub mod reports;
pub mod serve;

// Re-export command functions for main.rs
pub use approvals::*;
pub use core::*;
pub use expenses::*;
pub use reports::*;
pub use serve::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
