use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{to_millis, SqliteStore};
use crate::error::Result;
use crate::CredentialStore;

impl SqliteStore {
    /// Stores the bearer token used for a user's platform connection.
    pub fn set_access_token(&self, user_id: &str, platform: &str, token: &str) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO platform_credentials (user_id, platform, access_token, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                updated_at = excluded.updated_at",
            params![user_id, platform, token, to_millis(Utc::now())],
        )?;
        Ok(())
    }
}

impl CredentialStore for SqliteStore {
    fn access_token(&self, user_id: &str, platform: &str) -> Result<Option<String>> {
        let conn = self.lock_conn();
        let token = conn
            .query_row(
                "SELECT access_token FROM platform_credentials WHERE user_id = ?1 AND platform = ?2",
                params![user_id, platform],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(token)
    }
}
