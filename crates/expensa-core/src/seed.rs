//! Directory seeding from TOML
//!
//! The directory (tiers, admins, users, events) is owned by outside tooling.
//! This loader populates it for local setups and demos:
//!
//! ```toml
//! [[tiers]]
//! title = "Associate"
//! level = 2
//! categories = [
//!   { title = "food", max_amount = "500" },
//!   { title = "gifts", max_amount = "100", enabled = false },
//! ]
//!
//! [[admins]]
//! name = "Finance Desk"
//! email = "finance@example.com"
//!
//! [[users]]
//! name = "Morgan"
//! employee_id = "E-002"
//! user_type = "approver"
//! tier = "Manager"
//!
//! [[users]]
//! name = "Sam"
//! employee_id = "E-001"
//! tier = "Associate"
//! approver = "E-002"
//!
//! [[events]]
//! event_name = "Offsite"
//! created_by_admin = "finance@example.com"
//! staff = ["E-001"]
//! ```
//!
//! References resolve by tier title, employee id and admin email, against
//! both this file and rows already in the database.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{ActorRef, NewAdmin, NewEvent, NewTier, NewUser, TierCategory, UserType};

#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub tiers: Vec<TierSeed>,
    #[serde(default)]
    pub admins: Vec<NewAdmin>,
    #[serde(default)]
    pub users: Vec<UserSeed>,
    #[serde(default)]
    pub events: Vec<EventSeed>,
}

#[derive(Debug, Deserialize)]
pub struct TierSeed {
    pub title: String,
    pub level: i64,
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
}

#[derive(Debug, Deserialize)]
pub struct CategorySeed {
    pub title: String,
    pub max_amount: Decimal,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UserSeed {
    pub name: String,
    pub employee_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub user_type: UserType,
    /// Tier title
    pub tier: Option<String>,
    /// Approver's employee id
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventSeed {
    pub event_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Admin email; makes this an admin event
    #[serde(default)]
    pub created_by_admin: Option<String>,
    /// Employee id of the creating user
    #[serde(default)]
    pub created_by_user: Option<String>,
    /// Employee ids
    #[serde(default)]
    pub staff: Vec<String>,
}

/// Rows written by one seed run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedStats {
    pub tiers: usize,
    pub admins: usize,
    pub users: usize,
    pub events: usize,
}

impl DirectorySeed {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Write every entry, resolving references as it goes
    pub fn apply(&self, db: &Database) -> Result<SeedStats> {
        let mut stats = SeedStats::default();

        for tier in &self.tiers {
            let categories = tier
                .categories
                .iter()
                .map(|c| TierCategory::new(&c.title, c.max_amount, c.enabled))
                .collect();
            db.create_tier(&NewTier::new(&tier.title, tier.level, categories))?;
            stats.tiers += 1;
        }

        for admin in &self.admins {
            db.create_admin(admin)?;
            stats.admins += 1;
        }

        let tiers: HashMap<String, i64> = db
            .list_tiers()?
            .into_iter()
            .map(|t| (t.title, t.id))
            .collect();
        let admins: HashMap<String, i64> = db
            .list_active_admins()?
            .into_iter()
            .filter_map(|a| a.email.map(|email| (email, a.id)))
            .collect();
        let mut users: HashMap<String, i64> = db
            .list_users()?
            .into_iter()
            .filter_map(|u| u.employee_id.map(|emp| (emp, u.id)))
            .collect();

        for user in &self.users {
            let tier_id = match &user.tier {
                Some(title) => Some(lookup(&tiers, title, "tier")?),
                None => None,
            };
            let approver_id = match &user.approver {
                Some(emp) => Some(lookup(&users, emp, "approver")?),
                None => None,
            };
            let id = db.create_user(&NewUser {
                name: user.name.clone(),
                employee_id: Some(user.employee_id.clone()),
                email: user.email.clone(),
                mobile: user.mobile.clone(),
                designation: user.designation.clone(),
                user_type: user.user_type,
                tier_id,
                approver_id,
                location: user.location.clone(),
            })?;
            users.insert(user.employee_id.clone(), id);
            stats.users += 1;
        }

        for event in &self.events {
            let creator = match (&event.created_by_admin, &event.created_by_user) {
                (Some(email), None) => ActorRef::admin(lookup(&admins, email, "admin")?),
                (None, Some(emp)) => ActorRef::user(lookup(&users, emp, "user")?),
                _ => {
                    return Err(Error::InvalidData(format!(
                        "Event '{}' needs exactly one of created_by_admin or created_by_user",
                        event.event_name
                    )))
                }
            };
            let staff = event
                .staff
                .iter()
                .map(|emp| lookup(&users, emp, "staff member"))
                .collect::<Result<Vec<_>>>()?;
            db.create_event(&NewEvent {
                event_name: event.event_name.clone(),
                description: event.description.clone(),
                location: event.location.clone(),
                start_date: event.start_date,
                end_date: event.end_date,
                creator,
                staff,
            })?;
            stats.events += 1;
        }

        info!(
            tiers = stats.tiers,
            admins = stats.admins,
            users = stats.users,
            events = stats.events,
            "Directory seeded"
        );
        Ok(stats)
    }
}

fn lookup(map: &HashMap<String, i64>, key: &str, what: &str) -> Result<i64> {
    map.get(key)
        .copied()
        .ok_or_else(|| Error::InvalidData(format!("Unknown {} '{}'", what, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Approvers;

    const ORG: &str = r#"
[[tiers]]
title = "Associate"
level = 2
categories = [
  { title = "Food", max_amount = "500" },
  { title = "gifts", max_amount = "100", enabled = false },
]

[[tiers]]
title = "Manager"
level = 3
categories = [{ title = "food", max_amount = "1000" }]

[[admins]]
name = "Finance Desk"
email = "finance@example.com"

[[users]]
name = "Morgan"
employee_id = "E-002"
user_type = "approver"
tier = "Manager"

[[users]]
name = "Sam"
employee_id = "E-001"
tier = "Associate"
approver = "E-002"

[[events]]
event_name = "Offsite"
created_by_admin = "finance@example.com"
staff = ["E-001"]
"#;

    #[test]
    fn test_apply_seed() {
        let db = Database::in_memory().unwrap();
        let seed = DirectorySeed::parse(ORG).unwrap();

        let stats = seed.apply(&db).unwrap();
        assert_eq!(
            stats,
            SeedStats {
                tiers: 2,
                admins: 1,
                users: 2,
                events: 1
            }
        );

        let tiers = db.list_tiers().unwrap();
        let associate = &tiers[0];
        assert_eq!(associate.title, "Associate");
        assert_eq!(associate.total_amount, "600".parse::<Decimal>().unwrap());
        assert_eq!(associate.categories[0].title, "food");
        assert!(!associate.categories[1].enabled);

        let users = db.list_users().unwrap();
        let sam = users.iter().find(|u| u.name == "Sam").unwrap();
        let morgan = users.iter().find(|u| u.name == "Morgan").unwrap();
        assert_eq!(sam.approver_id, Some(morgan.id));
        assert_eq!(morgan.user_type, UserType::Approver);

        let event = db.get_event(1).unwrap().unwrap();
        assert!(event.is_admin_event());
        assert_eq!(event.staff, vec![sam.id]);
    }

    #[test]
    fn test_seeded_chain_resolves_approvers() {
        let db = Database::in_memory().unwrap();
        DirectorySeed::parse(ORG).unwrap().apply(&db).unwrap();
        let sink = crate::test_utils::RecordingSink::default();
        let config = crate::config::PolicyConfig::default();
        let engine = crate::approval::ApprovalEngine::new(&db, &sink, &config);

        let associate = db.get_tier_by_level(2).unwrap().unwrap();
        assert!(matches!(
            engine.get_approvers(associate.id).unwrap(),
            Approvers::Users(_)
        ));
    }

    #[test]
    fn test_unknown_reference() {
        let db = Database::in_memory().unwrap();
        let seed = DirectorySeed::parse(
            r#"
[[users]]
name = "Sam"
employee_id = "E-001"
tier = "Nope"
"#,
        )
        .unwrap();

        let err = seed.apply(&db).unwrap_err();
        assert!(matches!(err, Error::InvalidData(ref m) if m.contains("Nope")));
    }

    #[test]
    fn test_event_needs_one_creator() {
        let db = Database::in_memory().unwrap();
        let seed = DirectorySeed::parse(
            r#"
[[events]]
event_name = "Orphan"
"#,
        )
        .unwrap();

        assert!(matches!(seed.apply(&db), Err(Error::InvalidData(_))));
    }
}
