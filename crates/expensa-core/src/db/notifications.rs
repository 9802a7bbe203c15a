//! Notification persistence

use rusqlite::params;

use super::{parse_column, parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewNotification, Notification};
use crate::notify::NotificationSink;

impl Database {
    pub fn create_notification(&self, notification: &NewNotification) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (report_id, user_id, status) VALUES (?, ?, ?)",
            params![
                notification.report_id,
                notification.user_id,
                notification.status.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List a user's notifications, newest first
    pub fn list_notifications(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let notifications = conn
            .prepare(
                r#"
                SELECT id, report_id, user_id, status, is_read, created_at
                FROM notifications
                WHERE user_id = ?
                ORDER BY created_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )?
            .query_map(params![user_id, limit, offset], |row| {
                let created_at: String = row.get(5)?;
                Ok(Notification {
                    id: row.get(0)?,
                    report_id: row.get(1)?,
                    user_id: row.get(2)?,
                    status: parse_column(row, 3)?,
                    is_read: row.get(4)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    pub fn count_notifications(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl NotificationSink for Database {
    fn notify(&self, notification: &NewNotification) -> Result<()> {
        self.create_notification(notification)?;
        Ok(())
    }
}
