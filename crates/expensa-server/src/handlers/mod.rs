//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod approvals;
pub mod audit;
pub mod directory;
pub mod expenses;
pub mod finance;
pub mod reports;

// Re-export all handlers for use in router
pub use approvals::*;
pub use audit::*;
pub use directory::*;
pub use expenses::*;
pub use finance::*;
pub use reports::*;

use expensa_core::models::ReportStatus;

use crate::AppError;

/// Parse an optional `?status=` filter
pub(crate) fn parse_status(status: Option<&str>) -> Result<Option<ReportStatus>, AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e: String| AppError::bad_request(&e)),
        None => Ok(None),
    }
}
