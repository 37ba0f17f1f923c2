// SQLite-backed user profiles.
//
// Reputation and post count are stored as text, the way the rest of the
// site writes them; the admission policy coerces them.

use crate::core::queue::{ProfileError, ProfileStore};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

/// Columns callers may ask for by name.
const PROFILE_COLUMNS: [&str; 3] = ["username", "reputation", "postcount"];

pub struct SqliteProfileStore {
    pool: Pool<Sqlite>,
}

impl SqliteProfileStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                uid INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                reputation TEXT NOT NULL DEFAULT '0',
                postcount TEXT NOT NULL DEFAULT '0'
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create or overwrite a user row.
    pub async fn save_user(
        &self,
        uid: i64,
        username: &str,
        reputation: &str,
        postcount: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (uid, username, reputation, postcount)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                username = excluded.username,
                reputation = excluded.reputation,
                postcount = excluded.postcount
            "#,
        )
        .bind(uid)
        .bind(username)
        .bind(reputation)
        .bind(postcount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get_user_fields(
        &self,
        uid: i64,
        fields: &[&str],
    ) -> Result<HashMap<String, String>, ProfileError> {
        let row = sqlx::query("SELECT username, reputation, postcount FROM users WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ProfileError {
                uid,
                reason: e.to_string(),
            })?;

        let Some(row) = row else {
            return Ok(HashMap::new());
        };

        let mut values = HashMap::new();
        for field in fields.iter().filter(|f| PROFILE_COLUMNS.contains(*f)) {
            let value: String = row.get(*field);
            values.insert(field.to_string(), value);
        }
        Ok(values)
    }
}
