// SQLite-backed site settings: a plain key/value table of text.

use crate::core::queue::{SiteConfigStore, StorageError};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;

pub struct SqliteSiteConfigStore {
    pool: Pool<Sqlite>,
}

impl SqliteSiteConfigStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS site_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO site_config (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SiteConfigStore for SqliteSiteConfigStore {
    async fn load_settings(&self) -> Result<HashMap<String, String>, StorageError> {
        let rows = sqlx::query("SELECT key, value FROM site_config")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }
}
