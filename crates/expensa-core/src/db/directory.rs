//! Directory read model: tiers, users, admins and events
//!
//! These rows are owned by external administration tooling. The inserts here
//! back directory seeding and tests; the workflow only reads them.

use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_amount, parse_column, parse_date, parse_datetime, Database};
use crate::error::Result;
use crate::models::{
    ActorRef, Admin, Event, NewAdmin, NewEvent, NewTier, NewUser, Tier, TierCategory, User,
};

const USER_COLUMNS: &str = "id, employee_id, name, email, mobile, designation, user_type, \
                            tier_id, approver_id, location, active, created_at";

impl Database {
    // ========== Tiers ==========

    /// Create a tier together with its ordered categories
    pub fn create_tier(&self, tier: &NewTier) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO tiers (title, total_amount, level) VALUES (?, ?, ?)",
            params![tier.title, tier.total_amount.to_string(), tier.level],
        )?;
        let tier_id = tx.last_insert_rowid();

        for (position, category) in tier.categories.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO tier_categories (tier_id, position, title, max_amount, enabled)
                VALUES (?, ?, ?, ?, ?)
                "#,
                params![
                    tier_id,
                    position as i64,
                    category.title,
                    category.max_amount.to_string(),
                    category.enabled
                ],
            )?;
        }

        tx.commit()?;
        Ok(tier_id)
    }

    pub fn get_tier(&self, id: i64) -> Result<Option<Tier>> {
        let conn = self.conn()?;
        Self::load_tier(&conn, "WHERE id = ?", id)
    }

    /// First tier at the given approval-chain level
    pub fn get_tier_by_level(&self, level: i64) -> Result<Option<Tier>> {
        let conn = self.conn()?;
        Self::load_tier(&conn, "WHERE level = ? ORDER BY id LIMIT 1", level)
    }

    pub fn list_tiers(&self) -> Result<Vec<Tier>> {
        let conn = self.conn()?;
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM tiers ORDER BY level, id")?
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tiers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tier) = Self::load_tier(&conn, "WHERE id = ?", id)? {
                tiers.push(tier);
            }
        }
        Ok(tiers)
    }

    fn load_tier(conn: &Connection, clause: &str, arg: i64) -> Result<Option<Tier>> {
        let sql = format!(
            "SELECT id, title, total_amount, level, created_at FROM tiers {}",
            clause
        );
        let tier = conn
            .query_row(&sql, params![arg], |row| {
                let created_at: String = row.get(4)?;
                Ok(Tier {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    total_amount: parse_amount(row, 2)?,
                    level: row.get(3)?,
                    categories: Vec::new(),
                    created_at: parse_datetime(&created_at),
                })
            })
            .optional()?;

        let Some(mut tier) = tier else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT title, max_amount, enabled
            FROM tier_categories
            WHERE tier_id = ?
            ORDER BY position
            "#,
        )?;
        tier.categories = stmt
            .query_map(params![tier.id], |row| {
                Ok(TierCategory {
                    title: row.get(0)?,
                    max_amount: parse_amount(row, 1)?,
                    enabled: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(tier))
    }

    // ========== Users ==========

    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO users (employee_id, name, email, mobile, designation, user_type,
                               tier_id, approver_id, location)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                user.employee_id,
                user.name,
                user.email,
                user.mobile,
                user.designation,
                user.user_type.as_str(),
                user.tier_id,
                user.approver_id,
                user.location,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = conn
            .query_row(&sql, params![id], Self::row_to_user)
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let users = conn
            .prepare(&sql)?
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Active approver-type users on a tier
    pub fn list_approvers_in_tier(&self, tier_id: i64) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM users WHERE tier_id = ? AND user_type = 'approver' AND active = 1 ORDER BY id",
            USER_COLUMNS
        );
        let users = conn
            .prepare(&sql)?
            .query_map(params![tier_id], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Active approver-type users on any tier at `level`
    pub fn list_approvers_at_level(&self, level: i64) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM users
            WHERE tier_id IN (SELECT id FROM tiers WHERE level = ?)
              AND user_type = 'approver' AND active = 1
            ORDER BY id
            "#,
            USER_COLUMNS
        );
        let users = conn
            .prepare(&sql)?
            .query_map(params![level], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let created_at: String = row.get(11)?;
        Ok(User {
            id: row.get(0)?,
            employee_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            mobile: row.get(4)?,
            designation: row.get(5)?,
            user_type: parse_column(row, 6)?,
            tier_id: row.get(7)?,
            approver_id: row.get(8)?,
            location: row.get(9)?,
            active: row.get(10)?,
            created_at: parse_datetime(&created_at),
        })
    }

    // ========== Admins ==========

    pub fn create_admin(&self, admin: &NewAdmin) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO admins (name, email, designation) VALUES (?, ?, ?)",
            params![admin.name, admin.email, admin.designation],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_admin(&self, id: i64) -> Result<Option<Admin>> {
        let conn = self.conn()?;
        let admin = conn
            .query_row(
                "SELECT id, name, email, designation, active, created_at FROM admins WHERE id = ?",
                params![id],
                Self::row_to_admin,
            )
            .optional()?;
        Ok(admin)
    }

    pub fn list_active_admins(&self) -> Result<Vec<Admin>> {
        let conn = self.conn()?;
        let admins = conn
            .prepare(
                "SELECT id, name, email, designation, active, created_at FROM admins WHERE active = 1 ORDER BY id",
            )?
            .query_map([], Self::row_to_admin)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(admins)
    }

    fn row_to_admin(row: &rusqlite::Row) -> rusqlite::Result<Admin> {
        let created_at: String = row.get(5)?;
        Ok(Admin {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            designation: row.get(3)?,
            active: row.get(4)?,
            created_at: parse_datetime(&created_at),
        })
    }

    // ========== Events ==========

    pub fn create_event(&self, event: &NewEvent) -> Result<i64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO events (event_name, description, location, start_date, end_date,
                                creator_kind, creator_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                event.event_name,
                event.description,
                event.location,
                event.start_date.map(|d| d.format("%Y-%m-%d").to_string()),
                event.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
                event.creator.kind.as_str(),
                event.creator.id,
            ],
        )?;
        let event_id = tx.last_insert_rowid();

        for user_id in &event.staff {
            tx.execute(
                "INSERT OR IGNORE INTO event_staff (event_id, user_id) VALUES (?, ?)",
                params![event_id, user_id],
            )?;
        }

        tx.commit()?;
        Ok(event_id)
    }

    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                r#"
                SELECT id, event_name, description, location, start_date, end_date, status,
                       creator_kind, creator_id, created_at
                FROM events WHERE id = ?
                "#,
                params![id],
                |row| {
                    let created_at: String = row.get(9)?;
                    Ok(Event {
                        id: row.get(0)?,
                        event_name: row.get(1)?,
                        description: row.get(2)?,
                        location: row.get(3)?,
                        start_date: parse_date(row.get(4)?),
                        end_date: parse_date(row.get(5)?),
                        status: parse_column(row, 6)?,
                        creator: ActorRef {
                            kind: parse_column(row, 7)?,
                            id: row.get(8)?,
                        },
                        staff: Vec::new(),
                        created_at: parse_datetime(&created_at),
                    })
                },
            )
            .optional()?;

        let Some(mut event) = event else {
            return Ok(None);
        };

        event.staff = conn
            .prepare("SELECT user_id FROM event_staff WHERE event_id = ? ORDER BY user_id")?
            .query_map(params![event.id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(event))
    }
}
