use adrule_common::types::Notification;
use chrono::Utc;
use rusqlite::params;

use super::{from_millis, to_millis, SqliteStore};
use crate::error::Result;
use crate::NotificationSink;

impl NotificationSink for SqliteStore {
    fn notify(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        metadata: &serde_json::Value,
    ) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata)?;
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO notifications (id, user_id, title, message, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                adrule_common::id::next_id(),
                user_id,
                title,
                message,
                metadata_json,
                to_millis(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

impl SqliteStore {
    /// Most recent notifications for a user, newest first.
    pub fn list_notifications(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, message, metadata, created_at FROM notifications
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, user_id, title, message, metadata, created_at)| {
                Ok(Notification {
                    id,
                    user_id,
                    title,
                    message,
                    metadata: serde_json::from_str(&metadata)?,
                    created_at: from_millis(created_at),
                })
            })
            .collect()
    }
}
