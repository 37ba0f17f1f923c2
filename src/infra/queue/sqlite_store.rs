// SQLite-backed storage engine for the post queue.
//
// Tables:
// - ordered_sets: (set_name, member) -> score
// - records: (key, field) -> value
//
// Each trait call is one statement or one transaction over a single key, so
// it is atomic for that key. Calls are never combined.

use crate::core::queue::{QueueStore, RecordFields, StorageError};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteQueueStore {
    pool: Pool<Sqlite>,
}

fn storage_err(e: sqlx::Error) -> StorageError {
    StorageError(e.to_string())
}

impl SqliteQueueStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ordered_sets (
                set_name TEXT NOT NULL,
                member TEXT NOT NULL,
                score INTEGER NOT NULL,
                PRIMARY KEY (set_name, member)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ordered_sets_score
                ON ordered_sets(set_name, score, member);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, field)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn add_to_ordered_set(
        &self,
        set: &str,
        score: i64,
        member: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO ordered_sets (set_name, member, score)
            VALUES (?, ?, ?)
            ON CONFLICT(set_name, member) DO UPDATE SET
                score = excluded.score
            "#,
        )
        .bind(set)
        .bind(member)
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn remove_from_ordered_set(&self, set: &str, member: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM ordered_sets WHERE set_name = ? AND member = ?")
            .bind(set)
            .bind(member)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn range_ordered_set(
        &self,
        set: &str,
        start: usize,
        limit: usize,
    ) -> Result<Vec<(String, i64)>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT member, score
            FROM ordered_sets
            WHERE set_name = ?
            ORDER BY score ASC, member ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(set)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(start).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("member"), row.get::<i64, _>("score")))
            .collect())
    }

    async fn ordered_set_card(&self, set: &str) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM ordered_sets WHERE set_name = ?")
            .bind(set)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn set_record(&self, key: &str, fields: &RecordFields) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        for (field, value) in fields {
            sqlx::query(
                r#"
                INSERT INTO records (key, field, value)
                VALUES (?, ?, ?)
                ON CONFLICT(key, field) DO UPDATE SET
                    value = excluded.value
                "#,
            )
            .bind(key)
            .bind(field.as_str())
            .bind(value.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn get_record(&self, key: &str) -> Result<Option<RecordFields>, StorageError> {
        let rows = sqlx::query("SELECT field, value FROM records WHERE key = ?")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        if rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            rows.iter()
                .map(|row| (row.get::<String, _>("field"), row.get::<String, _>("value")))
                .collect(),
        ))
    }

    async fn delete_record(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}
