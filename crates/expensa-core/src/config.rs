//! Workflow policy configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [policy]
//! period_cap_includes_submission = false
//! reimburse_requires_approval = true
//! page_size = 10
//! ```
//!
//! Lookup order: explicit path, then `<data dir>/expensa/config.toml`, then defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::ReportStatus;

/// Tunable workflow rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Add the in-flight submission to committed spend before comparing
    /// against the tier's monthly cap
    pub period_cap_includes_submission: bool,
    /// Only `approved` reports may be reimbursed; when off, finance may
    /// reimburse any non-terminal report
    pub reimburse_requires_approval: bool,
    /// Rows per listing page
    pub page_size: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            period_cap_includes_submission: false,
            reimburse_requires_approval: true,
            page_size: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    policy: Option<PolicyConfig>,
}

impl PolicyConfig {
    /// Load from an explicit file, the default location, or fall back to defaults
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                debug!("No policy config found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading policy config");
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        let config = raw.policy.unwrap_or_default();
        if config.page_size < 1 {
            return Err(Error::InvalidData(format!(
                "page_size must be at least 1, got {}",
                config.page_size
            )));
        }
        Ok(config)
    }

    /// Report statuses finance may reimburse from
    pub fn reimbursable_statuses(&self) -> &'static [ReportStatus] {
        if self.reimburse_requires_approval {
            &[ReportStatus::Approved]
        } else {
            &[
                ReportStatus::Drafted,
                ReportStatus::Pending,
                ReportStatus::Approved,
            ]
        }
    }

    /// `(limit, offset)` for a 1-based page number
    pub fn page_window(&self, page: i64) -> (i64, i64) {
        let page = page.max(1);
        (self.page_size, (page - 1).saturating_mul(self.page_size))
    }
}

/// Default config location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("expensa").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PolicyConfig::default();
        assert!(!config.period_cap_includes_submission);
        assert!(config.reimburse_requires_approval);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_parse_partial_section_keeps_defaults() {
        let config = PolicyConfig::parse("[policy]\nperiod_cap_includes_submission = true\n")
            .unwrap();
        assert!(config.period_cap_includes_submission);
        assert!(config.reimburse_requires_approval);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(PolicyConfig::parse("").unwrap(), PolicyConfig::default());
    }

    #[test]
    fn test_parse_rejects_zero_page_size() {
        let err = PolicyConfig::parse("[policy]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = PolicyConfig::parse("[policy\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nreimburse_requires_approval = false\npage_size = 25").unwrap();

        let config = PolicyConfig::load(Some(file.path())).unwrap();
        assert!(!config.reimburse_requires_approval);
        assert_eq!(config.page_size, 25);
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = PolicyConfig::load(Some(Path::new("/nonexistent/expensa.toml"))).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_reimbursable_statuses() {
        let strict = PolicyConfig::default();
        assert_eq!(strict.reimbursable_statuses(), &[ReportStatus::Approved]);

        let lenient = PolicyConfig {
            reimburse_requires_approval: false,
            ..Default::default()
        };
        assert!(lenient.reimbursable_statuses().contains(&ReportStatus::Pending));
        assert!(!lenient.reimbursable_statuses().contains(&ReportStatus::Rejected));
    }

    #[test]
    fn test_page_window() {
        let config = PolicyConfig::default();
        assert_eq!(config.page_window(1), (10, 0));
        assert_eq!(config.page_window(3), (10, 20));
        assert_eq!(config.page_window(0), (10, 0));
        assert_eq!(config.page_window(i64::MAX), (10, i64::MAX));
    }
}
